//! Error handling
//!
//! Defines the client error type and the mapping from server replies to it.

pub mod handlers;
pub mod types;

pub use handlers::{Operation, classify_failure};
pub use types::*;
