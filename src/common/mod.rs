//! Common module
//!
//! This module contains shared errors, logging setup and network helpers used
//! throughout the crate.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{Result, SelectorError};
pub use log::{init_logger, set_log_level};
pub use net::Network;
