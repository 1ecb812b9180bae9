//! Legacy protocol emulator.
//!
//! Serves the first-generation poll protocol: accept one client, read a
//! request frame, validate that it enumerates the expected "NORMAL"
//! command matrix, and answer with one response block taken from the
//! shared sampler. Unlike the split emulator there is no control state
//! machine; every valid request is answered with data immediately.

use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};

use crankline_core::{StreamLink, TransportError};
use crankline_proto::{
    ChannelSet, LEGACY_SAMPLE_WIDTH, LegacyRequest, LegacyResponse, SampleBlock,
};
use tracing::{debug, info, warn};

use crate::{
    ShutdownHandle,
    error::EmulatorError,
    sampler,
    state::{EmulatorConfig, Shared},
};

/// Accept-loop cadence; shutdown is observed within one tick.
const ACCEPT_TICK: Duration = Duration::from_millis(100);

/// Per-operation deadline on the serving stream.
const SESSION_TICK: Duration = Duration::from_millis(100);

/// Wait for the sampler's first block at startup.
const FIRST_BLOCK_WAIT: Duration = Duration::from_secs(1);

/// Emulator for the legacy request/response protocol.
pub struct LegacyEmulator {
    listener: TcpListener,
    shared: Arc<Shared>,
    sampler: Option<JoinHandle<()>>,
    expected: LegacyRequest,
}

impl LegacyEmulator {
    /// Bind the listener and start the sampler.
    ///
    /// Only `control_addr` and the streaming defaults of `config` are
    /// used; the legacy protocol has no data plane.
    pub fn bind(config: EmulatorConfig) -> Result<Self, EmulatorError> {
        let listener = TcpListener::bind(config.control_addr)?;
        listener.set_nonblocking(true)?;

        let shared = Arc::new(Shared::new(config));
        let sampler = sampler::spawn(Arc::clone(&shared))?;

        Ok(Self { listener, shared, sampler: Some(sampler), expected: LegacyRequest::normal() })
    }

    /// The bound listener address (resolves port 0 binds).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle that stops the emulator from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(Arc::clone(&self.shared))
    }

    /// Serve clients until shut down.
    pub fn run(mut self) -> Result<(), EmulatorError> {
        info!(addr = %self.listener.local_addr()?, "legacy emulator listening");

        while !self.shared.is_shutdown() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!(%peer, "client connected");
                    self.serve_client(stream);
                    info!(%peer, "session ended");
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_TICK);
                }
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
                Err(error) => {
                    warn!(%error, "accept failed");
                    std::thread::sleep(ACCEPT_TICK);
                }
            }
        }

        self.join_workers();
        Ok(())
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> Result<crate::EmulatorHandle, EmulatorError> {
        let control_addr = self.local_addr()?;
        let shutdown = self.shutdown_handle();
        let thread = std::thread::Builder::new()
            .name("crankline-legacy-emulator".into())
            .spawn(move || self.run())?;
        Ok(crate::EmulatorHandle::new(control_addr, None, shutdown, thread))
    }

    /// One poll-protocol session: request frames in, response blocks out.
    fn serve_client(&mut self, stream: TcpStream) {
        if let Err(error) = stream.set_nonblocking(false) {
            warn!(%error, "session setup failed");
            return;
        }
        let mut link = StreamLink::from_stream(stream);
        if let Err(error) = link.set_io_timeout(Some(SESSION_TICK)) {
            warn!(%error, "session setup failed");
            return;
        }

        loop {
            if self.shared.is_shutdown() {
                break;
            }

            let request = match read_request(&mut link) {
                Ok(request) => request,
                Err(ReadOutcome::Idle) => continue,
                Err(ReadOutcome::Closed) => {
                    info!("client disconnected");
                    break;
                }
                Err(ReadOutcome::Malformed) => break,
            };

            if request != self.expected {
                warn!(
                    rows = request.rows(),
                    "unexpected command matrix, request not served"
                );
                continue;
            }

            let Some(block) = self.current_block() else {
                debug!("no sampler block available yet");
                continue;
            };

            let response = match legacy_view(&block).and_then(LegacyResponse::from_block) {
                Ok(response) => response,
                Err(error) => {
                    warn!(%error, "response block unavailable");
                    continue;
                }
            };

            let mut wire = Vec::new();
            response.encode(&mut wire);
            if let Err(error) = link.write_all(&wire) {
                warn!(%error, "response write failed");
                break;
            }
        }
    }

    fn current_block(&self) -> Option<SampleBlock> {
        self.shared
            .latest_block
            .peek()
            .or_else(|| self.shared.latest_block.wait_newer(0, FIRST_BLOCK_WAIT).map(|(b, _)| b))
    }

    fn join_workers(&mut self) {
        self.shared.shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        if let Some(sampler) = self.sampler.take() {
            let _ = sampler.join();
        }
    }
}

impl Drop for LegacyEmulator {
    fn drop(&mut self) {
        self.join_workers();
    }
}

/// Why a request read produced no request.
enum ReadOutcome {
    /// Deadline elapsed with no traffic; re-check the stop flag.
    Idle,
    /// The client hung up.
    Closed,
    /// The bytes did not form a request; end the session.
    Malformed,
}

fn read_request(link: &mut StreamLink) -> Result<LegacyRequest, ReadOutcome> {
    let prefix = match link.read_exact(4) {
        Ok(prefix) => prefix,
        Err(TransportError::TimedOut) => return Err(ReadOutcome::Idle),
        Err(TransportError::Eof) => return Err(ReadOutcome::Closed),
        Err(_) => return Err(ReadOutcome::Closed),
    };

    let total_len = i32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    let Ok(total_len) = usize::try_from(total_len) else {
        return Err(ReadOutcome::Malformed);
    };

    let payload = match link.read_exact(total_len) {
        Ok(payload) => payload,
        Err(_) => return Err(ReadOutcome::Closed),
    };

    let mut wire = prefix;
    wire.extend(payload);
    LegacyRequest::decode(&wire).map_err(|error| {
        debug!(%error, "request rejected");
        ReadOutcome::Malformed
    })
}

/// Project a sampler block onto the 10-wide legacy layout: the time
/// column plus the first nine channels.
fn legacy_view(block: &SampleBlock) -> crankline_proto::Result<SampleBlock> {
    let channels = ChannelSet::new(0..LEGACY_SAMPLE_WIDTH as u8 - 1)?;
    block.project(&channels)
}
