//! Control connection options

use std::fmt;
use std::time::Duration;

use crate::transfer::{IdleHandler, TransferMode};

/// Data buffer size used for chunked transfers
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
/// Seconds to wait for the server to connect back in active mode
pub const DEFAULT_ACCEPT_TIMEOUT_SECS: u64 = 30;

/// Timeouts, data connection mode and callbacks applied to one control connection
#[derive(Clone)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    pub accept_timeout: Duration,
    /// No bytes transferred and no reply received within this window
    pub idle_timeout: Option<Duration>,
    /// Bound on waiting for replies while aborting or quitting
    pub abort_timeout: Duration,
    pub transfer_mode: TransferMode,
    /// Retry data connection setup with the other mode when refused
    pub mode_fallback: bool,
    pub buffer_size: usize,
    /// Minimum bytes between progress reports; 0 reports every chunk
    pub callback_bytes: u64,
    pub idle_handler: Option<IdleHandler>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            accept_timeout: Duration::from_secs(DEFAULT_ACCEPT_TIMEOUT_SECS),
            idle_timeout: None,
            abort_timeout: Duration::from_secs(10),
            transfer_mode: TransferMode::Passive,
            mode_fallback: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            callback_bytes: 0,
            idle_handler: None,
        }
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("connect_timeout", &self.connect_timeout)
            .field("accept_timeout", &self.accept_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("abort_timeout", &self.abort_timeout)
            .field("transfer_mode", &self.transfer_mode)
            .field("mode_fallback", &self.mode_fallback)
            .field("buffer_size", &self.buffer_size)
            .field("callback_bytes", &self.callback_bytes)
            .field("idle_handler", &self.idle_handler.is_some())
            .finish()
    }
}
