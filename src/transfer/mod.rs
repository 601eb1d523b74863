//! Transfer module for the FTP client
//!
//! Handles data channel negotiation, byte-accurate downloads and uploads,
//! listings, progress reporting and cancellation.

pub mod data_channel;
pub mod modes;
pub mod operations;
pub mod progress;
pub mod results;

// Re-export key types and functions
pub use data_channel::{DataChannel, Direction};
pub use modes::{TransferMode, TransferType};
pub use operations::{
    download, fetch_listing, list_raw, restart_at, retrieve, set_type, store, upload,
};
pub use progress::{Flow, IdleHandler, IdleStop, IdleWatch, ProgressCallback, ProgressTracker};
pub use results::{TransferReport, TransferRequest};
