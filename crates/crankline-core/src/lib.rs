//! Shared plumbing for the crankline client and emulator.
//!
//! Everything both sides of the wire need, one layer above the codecs:
//!
//! - [`StreamLink`]: exact-length reads/writes on a reliable stream, with
//!   end-of-stream distinct from timeouts
//! - [`DatagramLink`]: whole-datagram send/receive with a bounded wait
//! - [`LatestSlot`]: single-slot latest-value hand-off between workers
//! - [`SequenceGate`]: strictly-forward sequence-id filtering with wrap
//!
//! The concurrency model is deliberately plain: long-lived threads, stop
//! flags checked every iteration, and bounded timeouts everywhere a worker
//! blocks, so shutdown is always observed within one tick.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod datagram;
mod errors;
mod sequence;
mod slot;
mod stream;

pub use datagram::{DatagramLink, MAX_DATAGRAM};
pub use errors::{LinkError, TransportError};
pub use sequence::SequenceGate;
pub use slot::LatestSlot;
pub use stream::StreamLink;
