//! Session facade
//!
//! Logical FTP operations (listing, transfers, navigation, metadata) built
//! from control and data channels.

pub mod core;
pub mod operations;

pub use self::core::{FtpSession, SessionOptions};
