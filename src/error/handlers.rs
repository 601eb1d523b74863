//! Error handlers
//!
//! Maps negative server replies to error kinds.

use crate::error::types::FtpClientError;
use crate::protocol::Response;
use crate::protocol::responses::{FILE_NOT_FOUND, NOT_LOGGED_IN};

/// What the failed command was trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// CWD, SIZE, MDTM, RETR, LIST, NLST
    Lookup,
    /// DELE, RMD, MKD, RNFR, RNTO, SITE CHMOD, STOR
    Mutation,
    Login,
    Passive,
    Port,
    Restart,
    Other,
}

fn says_missing(response: &Response) -> bool {
    let text = response.text().to_ascii_lowercase();
    ["no such", "not found", "not exist", "doesn't exist", "cannot find"]
        .iter()
        .any(|marker| text.contains(marker))
}

/// Converts a negative (or otherwise unexpected) reply into an error
pub fn classify_failure(operation: Operation, response: Response) -> FtpClientError {
    if response.code() == NOT_LOGGED_IN {
        return FtpClientError::AuthenticationFailed(response);
    }

    match operation {
        Operation::Login => FtpClientError::AuthenticationFailed(response),
        Operation::Passive => FtpClientError::PassiveModeUnsupported(response),
        Operation::Port => FtpClientError::PortModeRefused(response),
        Operation::Restart => FtpClientError::RangeNotSupported(response),
        Operation::Lookup if response.code() == FILE_NOT_FOUND || says_missing(&response) => {
            FtpClientError::PathNotFound(response)
        }
        Operation::Mutation if response.code() / 100 == 5 => {
            if says_missing(&response) {
                FtpClientError::PathNotFound(response)
            } else {
                FtpClientError::PermissionDenied(response)
            }
        }
        _ => FtpClientError::UnexpectedResponse(response),
    }
}

/// Whether a 5xx reply to SIZE means "no such file" rather than a failure
pub fn is_missing_file(response: &Response) -> bool {
    response.code() == FILE_NOT_FOUND && !response.text().to_ascii_lowercase().contains("denied")
}
