//! RAX FTP Client
//!
//! An async FTP protocol client engine: control channel, PASV/EPSV/PORT data
//! connections, byte-accurate transfers with offsets, progress and
//! cancellation, and LIST parsing for UNIX and MS-DOS style servers.

pub mod auth;
pub mod config;
pub mod control;
pub mod error;
pub mod listing;
pub mod protocol;
pub mod session;
pub mod transfer;
pub mod utils;

pub use auth::Credentials;
pub use config::ClientConfig;
pub use control::{ConnectionOptions, ConnectionState, ControlChannel};
pub use error::{FtpClientError, Result, TimeoutKind};
pub use listing::{DirectoryEntry, EntryKind};
pub use session::{FtpSession, SessionOptions};
pub use transfer::{Flow, TransferMode, TransferReport, TransferRequest, TransferType};
pub use tokio_util::sync::CancellationToken;
