//! Utility functions
//!
//! Provides logging setup.

pub mod logging;

pub use logging::{level_for_verbosity, setup_logging};
