//! Error types for peerwatch identity parsing.

use thiserror::Error;

/// Errors produced when parsing a [`DeviceId`](crate::DeviceId) from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The text was not valid URL-safe base64.
    #[error("invalid device id encoding: {0}")]
    Encoding(String),

    /// The decoded bytes had the wrong length.
    #[error("invalid device id length: expected {expected} bytes, got {actual}")]
    Length {
        /// Required length in bytes.
        expected: usize,
        /// Decoded length in bytes.
        actual: usize,
    },
}
