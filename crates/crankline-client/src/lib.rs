//! Client side of the crankline telemetry stack.
//!
//! Two device variants share the [`Device`] capability:
//!
//! - [`LegacyClient`]: single reliable stream, poll model; every
//!   [`latest`](Device::latest) is one request/response round-trip.
//! - [`SplitClient`]: reliable control stream plus datagram data plane,
//!   push model; a background receiver keeps the newest block in a
//!   latest-frame cell and [`latest`](Device::latest) never blocks.
//!
//! The [`Collector`] consumes either variant on its own thread, owns the
//! accumulating [`TimeSeries`], and exposes the bounded sliding window the
//! live-view subsystem draws from.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod collector;
mod device;
mod error;
mod legacy;
mod split;

pub use collector::{Collector, TimeSeries, WidthMismatch};
pub use device::Device;
pub use error::ClientError;
pub use legacy::LegacyClient;
pub use split::SplitClient;
