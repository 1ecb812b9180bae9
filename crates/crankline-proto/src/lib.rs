//! Wire protocol for the crankline pedal telemetry stack.
//!
//! Two symmetrical protocols share this crate:
//!
//! - The **split protocol**: [`ControlFrame`]s (commands and
//!   acknowledgements) on a reliable stream, [`DataFrame`]s (sample blocks)
//!   on an unreliable datagram channel.
//! - The **legacy protocol**: [`LegacyRequest`]/[`LegacyResponse`]
//!   poll round-trips on a single reliable stream.
//!
//! Everything here is pure serialization: no sockets, no threads, no
//! clocks. The client and the in-process emulator both build on these
//! codecs, which is what keeps the two sides bit-exact.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod channel;
mod control;
mod data;
mod errors;
mod legacy;
mod payload;

pub use channel::{CHANNEL_COUNT, Channel, ChannelSet};
pub use control::{ControlFrame, ControlHeader, ControlMessage, Opcode};
pub use data::{DataFrame, DataHeader, Sample, SampleBlock};
pub use errors::{Result, WireError};
pub use legacy::{LEGACY_SAMPLE_WIDTH, LegacyRequest, LegacyResponse};
pub use payload::{SetConfig, StatusReport};
