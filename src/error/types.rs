//! Error types
//!
//! Defines the error taxonomy returned by every engine operation.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::protocol::Response;

/// Which configured timeout expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// TCP connect or server greeting
    Connect,
    Idle,
    /// No reply to ABOR within the abort timeout
    Abort,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::Connect => write!(f, "connect"),
            TimeoutKind::Idle => write!(f, "idle"),
            TimeoutKind::Abort => write!(f, "abort"),
        }
    }
}

/// FTP client error
#[derive(Debug)]
pub enum FtpClientError {
    ConnectionRefused(String),
    HostUnreachable(String),
    ConnectionLost(io::Error),
    Timeout(TimeoutKind),
    AuthenticationFailed(Response),
    NotAuthenticated,
    PassiveModeUnsupported(Response),
    PortModeRefused(Response),
    DataConnectionTimeout(Duration),
    RangeNotSupported(Response),
    IncompleteTransfer { expected: u64, received: u64 },
    MalformedResponse(String),
    UnrecognizedListingFormat { lines: usize },
    PermissionDenied(Response),
    PathNotFound(Response),
    /// Transfer stopped by the caller; `transferred` bytes already moved are partial
    Cancelled { transferred: u64 },
    ZeroFileSize(String),
    UnexpectedResponse(Response),
    InvalidState(String),
    /// Argument that cannot be sent on the control line (CR or LF)
    InvalidArgument(String),
    Io(io::Error),
}

impl FtpClientError {
    /// The server reply that caused this error, if any
    pub fn server_response(&self) -> Option<&Response> {
        match self {
            FtpClientError::AuthenticationFailed(r)
            | FtpClientError::PassiveModeUnsupported(r)
            | FtpClientError::PortModeRefused(r)
            | FtpClientError::RangeNotSupported(r)
            | FtpClientError::PermissionDenied(r)
            | FtpClientError::PathNotFound(r)
            | FtpClientError::UnexpectedResponse(r) => Some(r),
            _ => None,
        }
    }

    /// Whether the error leaves the control channel unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FtpClientError::ConnectionLost(_)
                | FtpClientError::MalformedResponse(_)
                | FtpClientError::Timeout(_)
        )
    }
}

impl fmt::Display for FtpClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtpClientError::ConnectionRefused(msg) => write!(f, "Connection refused: {}", msg),
            FtpClientError::HostUnreachable(msg) => write!(f, "Host unreachable: {}", msg),
            FtpClientError::ConnectionLost(e) => write!(f, "Connection lost: {}", e),
            FtpClientError::Timeout(kind) => write!(f, "Timed out ({})", kind),
            FtpClientError::AuthenticationFailed(r) => write!(f, "Authentication failed: {}", r),
            FtpClientError::NotAuthenticated => write!(f, "Not logged in"),
            FtpClientError::PassiveModeUnsupported(r) => {
                write!(f, "Passive mode unsupported: {}", r)
            }
            FtpClientError::PortModeRefused(r) => write!(f, "PORT refused: {}", r),
            FtpClientError::DataConnectionTimeout(after) => {
                write!(f, "Server did not open the data connection within {:?}", after)
            }
            FtpClientError::RangeNotSupported(r) => write!(f, "REST not supported: {}", r),
            FtpClientError::IncompleteTransfer { expected, received } => write!(
                f,
                "Incomplete transfer: received {} of {} bytes",
                received, expected
            ),
            FtpClientError::MalformedResponse(line) => write!(f, "Malformed response: {}", line),
            FtpClientError::UnrecognizedListingFormat { lines } => {
                write!(f, "Unrecognized listing format ({} lines)", lines)
            }
            FtpClientError::PermissionDenied(r) => write!(f, "Permission denied: {}", r),
            FtpClientError::PathNotFound(r) => write!(f, "Path not found: {}", r),
            FtpClientError::Cancelled { transferred } => {
                write!(f, "Cancelled after {} bytes", transferred)
            }
            FtpClientError::ZeroFileSize(path) => write!(f, "Zero-byte file written: {}", path),
            FtpClientError::UnexpectedResponse(r) => write!(f, "Unexpected response: {}", r),
            FtpClientError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            FtpClientError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            FtpClientError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FtpClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FtpClientError::ConnectionLost(e) | FtpClientError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Local I/O errors (sinks, sources, files) convert to `Io`; socket errors are
/// mapped explicitly to `ConnectionLost` at the call site.
impl From<io::Error> for FtpClientError {
    fn from(error: io::Error) -> Self {
        FtpClientError::Io(error)
    }
}

pub type Result<T> = std::result::Result<T, FtpClientError>;
