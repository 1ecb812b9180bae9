//! Transport-level error types.
//!
//! End-of-stream is its own variant rather than an `io::Error` kind: a
//! clean close and a reset must be distinguishable, because a zero-length
//! read means the peer is gone and the stream must be treated as dead.
//! Timeouts are also their own variant; workers use them as a liveness
//! tick and never surface them.

use std::io;

use thiserror::Error;

use crankline_proto::WireError;

/// Errors from the blocking transport adapters.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the stream (zero-length read).
    #[error("end of stream")]
    Eof,

    /// The configured per-operation deadline elapsed.
    #[error("operation timed out")]
    TimedOut,

    /// Any other socket failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Translate an `io::Error` from a socket with a read timeout set.
    ///
    /// Unix reports an elapsed `SO_RCVTIMEO` as `WouldBlock`, Windows as
    /// `TimedOut`; both collapse into [`TransportError::TimedOut`].
    pub fn from_io(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::TimedOut,
            _ => Self::Io(error),
        }
    }
}

/// Errors from framed operations on a link: transport or codec.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The bytes on the wire did not form a valid frame.
    #[error(transparent)]
    Wire(#[from] WireError),
}
