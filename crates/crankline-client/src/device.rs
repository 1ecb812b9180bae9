//! The capability shared by both device variants.

use std::net::{SocketAddr, ToSocketAddrs};

use crankline_proto::SampleBlock;

use crate::error::ClientError;

/// A telemetry device the collector can drain.
///
/// Both client variants implement this: the legacy device's [`latest`]
/// blocks for one poll round-trip, the split device's [`latest`] is a
/// non-blocking read of the shared latest-frame cell. Sending commands is
/// deliberately not part of the capability: the two wire protocols take
/// different command types, so `send` stays inherent on each variant.
///
/// [`latest`]: Device::latest
pub trait Device {
    /// Establish the connection. `true` when the device is usable
    /// afterwards; already connected counts as success.
    fn connect(&mut self) -> bool;

    /// Tear the connection down. Idempotent; `true` when the device ends
    /// up disconnected (so repeated calls keep returning `true`).
    fn disconnect(&mut self) -> bool;

    /// Whether the device is currently connected.
    fn is_connected(&self) -> bool;

    /// The most recent sample block, if a new one is available.
    fn latest(&mut self) -> Option<SampleBlock>;
}

/// Resolve `host:port` to the first usable socket address.
pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr, ClientError> {
    (host, port)
        .to_socket_addrs()
        .map_err(ClientError::Io)?
        .next()
        .ok_or_else(|| ClientError::Resolve(format!("{host}:{port}")))
}
