//! Wire-level error types.
//!
//! Every decoder in this crate fails with a [`WireError`]. The variants map
//! onto the ways a frame can be malformed: too few bytes for a fixed header,
//! a magic number or version mismatch, a payload shorter than the header
//! claims, payload bytes that cannot re-form the claimed shape, or a control
//! payload that is not valid JSON.

use thiserror::Error;

/// Result alias for wire codec operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// Fewer bytes than the fixed header requires.
    #[error("short header: need {need} bytes, got {got}")]
    ShortHeader {
        /// Header size for this frame type.
        need: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// Magic number does not identify this frame type.
    #[error("bad magic: expected {expected:#06x}, got {got:#06x}")]
    BadMagic {
        /// Magic number for this frame type.
        expected: u16,
        /// Magic number found on the wire.
        got: u16,
    },

    /// Protocol version is not supported by this implementation.
    #[error("unsupported protocol version {got} (supported: {supported})")]
    UnsupportedVersion {
        /// The single version this implementation speaks.
        supported: u16,
        /// Version found on the wire.
        got: u16,
    },

    /// Payload is shorter than the header claims.
    #[error("short payload: header claims {expected} bytes, got {got}")]
    ShortPayload {
        /// Byte count the header claims.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// Payload bytes cannot re-form the claimed shape.
    #[error("bad shape: {0}")]
    BadShape(String),

    /// Control payload is not valid UTF-8 JSON.
    #[error("malformed json payload: {0}")]
    MalformedJson(#[from] serde_json::Error),
}
