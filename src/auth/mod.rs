//! Authentication inputs
//!
//! Credentials used to log in on each control connection.

pub mod credentials;

pub use credentials::{Credentials, DEFAULT_PORT};
