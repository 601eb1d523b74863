//! Control channel
//!
//! Owns the control socket, pairs every command with its reply and tracks the
//! connection lifecycle.

pub mod channel;
pub mod options;
pub mod state;

pub use channel::ControlChannel;
pub use options::ConnectionOptions;
pub use state::ConnectionState;
