//! Client error types.
//!
//! The public device surface follows the device contract (`bool` results,
//! `Option` data) so a caller can drive reconnect loops without matching on
//! error shapes; these types carry the detail between the internal
//! fallible helpers and the log sink.

use std::io;

use crankline_core::{LinkError, TransportError};
use thiserror::Error;

/// Errors from client connection and control round-trips.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Host name did not resolve to a usable address.
    #[error("could not resolve {0}")]
    Resolve(String),

    /// Socket setup failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A framed control operation failed.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A raw transport operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The device answered something other than `ACK`.
    #[error("{command} rejected by the device")]
    Refused {
        /// The command that was refused.
        command: &'static str,
    },
}
