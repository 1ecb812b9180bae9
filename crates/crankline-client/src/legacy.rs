//! Legacy poll-model client.
//!
//! One reliable stream, one request/response round-trip per [`poll`]. The
//! request enumerating the commands of interest is encoded once at
//! construction and replayed verbatim every poll.
//!
//! [`poll`]: LegacyClient::poll

use std::time::Duration;

use crankline_core::StreamLink;
use crankline_proto::{LegacyRequest, LegacyResponse, SampleBlock};
use tracing::{debug, warn};

use crate::{
    device::{Device, resolve},
    error::ClientError,
};

/// Bound on connect establishment.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-operation stream deadline; an unresponsive device fails the poll
/// instead of hanging the caller.
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the legacy request/response protocol.
pub struct LegacyClient {
    host: String,
    port: u16,
    request: Vec<u8>,
    link: Option<StreamLink>,
    last_timestamp: Option<f64>,
}

impl LegacyClient {
    /// Client polling with the default "NORMAL" request (all 430 commands).
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_request(host, port, &LegacyRequest::normal())
    }

    /// Client polling with a custom command request.
    pub fn with_request(host: impl Into<String>, port: u16, request: &LegacyRequest) -> Self {
        let mut encoded = Vec::with_capacity(4 + request.total_len());
        request.encode(&mut encoded);
        Self { host: host.into(), port, request: encoded, link: None, last_timestamp: None }
    }

    fn try_connect(&mut self) -> Result<(), ClientError> {
        let addr = resolve(&self.host, self.port)?;
        let link = StreamLink::connect(addr, Some(CONNECT_TIMEOUT))?;
        link.set_io_timeout(Some(IO_TIMEOUT))?;
        self.link = Some(link);
        Ok(())
    }

    /// Send one request frame without waiting for the response.
    pub fn send(&mut self, request: &LegacyRequest) -> bool {
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        let mut wire = Vec::with_capacity(4 + request.total_len());
        request.encode(&mut wire);
        link.write_all(&wire).is_ok()
    }

    /// One request/response round-trip.
    ///
    /// Returns the decoded block, or `None` on any socket or framing
    /// failure; the client stays connected either way and the caller
    /// decides whether to retry or [`disconnect`](Device::disconnect).
    ///
    /// Blocks whose first timestamp precedes the previous block's last
    /// timestamp are dropped: the device restarted its clock, or a stale
    /// frame arrived.
    pub fn poll(&mut self) -> Option<SampleBlock> {
        let link = self.link.as_mut()?;

        if let Err(error) = link.write_all(&self.request) {
            debug!(%error, "legacy request failed");
            return None;
        }

        let block = match Self::read_response(link) {
            Ok(block) => block,
            Err(error) => {
                debug!(%error, "legacy response failed");
                return None;
            }
        };

        if let Some(last) = self.last_timestamp
            && block.first_time() < last
        {
            debug!(
                first = block.first_time(),
                last, "dropping block that precedes the previous one"
            );
            return None;
        }
        self.last_timestamp = Some(block.last_time());

        Some(block)
    }

    fn read_response(link: &mut StreamLink) -> Result<SampleBlock, ClientError> {
        let prefix = link.read_exact(4)?;
        let mut wire = [0u8; 4];
        wire.copy_from_slice(&prefix);
        let body_len = LegacyResponse::body_len(wire).map_err(crankline_core::LinkError::Wire)?;

        let mut frame = prefix;
        frame.extend(link.read_exact(body_len)?);

        let response =
            LegacyResponse::decode(&frame).map_err(crankline_core::LinkError::Wire)?;
        Ok(response.into_block())
    }

    /// Timestamp of the last returned block's final sample.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }
}

impl Device for LegacyClient {
    fn connect(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }
        match self.try_connect() {
            Ok(()) => true,
            Err(error) => {
                warn!(host = %self.host, port = self.port, %error, "legacy connect failed");
                self.link = None;
                false
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        if let Some(link) = self.link.take() {
            link.shutdown();
        }
        true
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn latest(&mut self) -> Option<SampleBlock> {
        self.poll()
    }
}
