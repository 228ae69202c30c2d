//! Error handling module
//!
//! This module defines the error types and result type aliases used in the crate.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Port selector error type
#[derive(Error, Debug)]
pub enum SelectorError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Header size of zero or above `MAX_HEADER_SIZE`
    #[error("Invalid header size: {0} (expected 1 to {})", crate::selector::MAX_HEADER_SIZE)]
    InvalidHeaderSize(usize),

    /// Key rejected by the length checks of the selector or match rule
    #[error("Invalid key length for {key:?}: {len} bytes, {reason}")]
    InvalidKeyLength {
        /// Key as lossy UTF-8
        key: String,
        /// Key length in bytes
        len: usize,
        /// Which constraint failed
        reason: String,
    },

    /// Key registered twice
    #[error("Duplicate key: {0:?}")]
    DuplicateKey(String),

    /// Key that was never registered
    #[error("Unknown key: {0:?}")]
    UnknownKey(String),

    /// Second default listener
    #[error("Default listener already registered")]
    DuplicateDefault,

    /// Network kind other than tcp, tcp4 or tcp6
    #[error("Unsupported network: {0} (expected tcp, tcp4 or tcp6)")]
    UnsupportedNetwork(String),

    /// Client did not send its prefix in time
    #[error("Timed out after {0:?} waiting for protocol prefix")]
    PeekTimeout(Duration),

    /// Virtual listener has been closed
    #[error("Listener closed")]
    ListenerClosed,

    /// Selector has been closed
    #[error("Selector closed")]
    SelectorClosed,

    /// `serve` called while another `serve` is running
    #[error("Selector is already serving")]
    AlreadyServing,

    /// Terminal failure of the real listener
    #[error("Accept error: {0}")]
    Accept(io::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl SelectorError {
    /// Whether this error was caused by invalid construction or registration input
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::InvalidHeaderSize(_)
                | Self::InvalidKeyLength { .. }
                | Self::DuplicateKey(_)
                | Self::UnknownKey(_)
                | Self::DuplicateDefault
                | Self::UnsupportedNetwork(_)
        )
    }

    /// Whether this error signals a closed listener or selector
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ListenerClosed | Self::SelectorClosed)
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `SelectorError`.
pub type Result<T> = std::result::Result<T, SelectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "early eof");
        let err: SelectorError = io_err.into();

        match err {
            SelectorError::Io(_) => {}
            other => panic!("Should convert to IO error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_display() {
        let err = SelectorError::DuplicateKey("PRPC".to_string());
        assert!(err.to_string().contains("PRPC"));

        let err = SelectorError::InvalidKeyLength {
            key: "TOOLONG".to_string(),
            len: 7,
            reason: "header size is 4".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("7 bytes"));
        assert!(msg.contains("header size is 4"));

        let msg = SelectorError::InvalidHeaderSize(70_000).to_string();
        assert!(msg.contains("70000"));
        assert!(msg.contains("65536"));
    }

    #[test]
    fn test_error_classes() {
        assert!(SelectorError::InvalidHeaderSize(0).is_config());
        assert!(SelectorError::DuplicateDefault.is_config());
        assert!(!SelectorError::ListenerClosed.is_config());
        assert!(SelectorError::ListenerClosed.is_closed());
        assert!(SelectorError::SelectorClosed.is_closed());
        assert!(!SelectorError::AlreadyServing.is_closed());
    }
}
