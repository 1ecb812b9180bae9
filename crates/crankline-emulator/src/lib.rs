//! In-process pedal device emulator.
//!
//! The emulator stands in for the real instrumented pedals: it serves the
//! same wire protocols, bit-exactly, from synthetic data. Tests and
//! development setups run it on loopback ports; the binary in this crate
//! runs it standalone.
//!
//! # Architecture
//!
//! A single-threaded acceptor with three cooperating workers:
//!
//! - **Acceptor** (the thread inside [`Emulator::run`]): binds the control
//!   and data ports and serves exactly one control session at a time;
//!   further clients wait until the current session ends.
//! - **Dispatcher**: reads control frames, answers `ACK`/`ERR`, toggles
//!   the streamer. Runs on the acceptor thread.
//! - **Sampler**: generates synthetic sample blocks at the configured
//!   cadence for the whole emulator lifetime.
//! - **Streamer**: while streaming, turns each new block into one data
//!   frame datagram.
//!
//! [`LegacyEmulator`] serves the first-generation poll protocol from the
//! same sampler machinery.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod legacy;
mod sampler;
mod session;
mod state;
mod streamer;

use std::{
    net::{SocketAddr, TcpListener},
    sync::{Arc, atomic::Ordering},
    thread::JoinHandle,
    time::Duration,
};

use crankline_core::DatagramLink;
use tracing::{info, warn};

pub use error::EmulatorError;
pub use legacy::LegacyEmulator;
pub use state::{DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, EmulatorConfig};

use crate::{session::Session, state::Shared};

/// Accept-loop cadence; stop requests are observed within one tick.
const ACCEPT_TICK: Duration = Duration::from_millis(100);

/// Split-protocol emulator: control stream in, data datagrams out.
pub struct Emulator {
    listener: TcpListener,
    data: Arc<DatagramLink>,
    shared: Arc<Shared>,
    sampler: Option<JoinHandle<()>>,
}

impl Emulator {
    /// Bind both ports and start the sampler.
    pub fn bind(config: EmulatorConfig) -> Result<Self, EmulatorError> {
        let listener = TcpListener::bind(config.control_addr)?;
        listener.set_nonblocking(true)?;
        let data = Arc::new(DatagramLink::bind(config.data_addr, Some(ACCEPT_TICK))?);

        let shared = Arc::new(Shared::new(config));
        let sampler = sampler::spawn(Arc::clone(&shared))?;

        Ok(Self { listener, data, shared, sampler: Some(sampler) })
    }

    /// The bound control address (resolves port 0 binds).
    pub fn local_control_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The bound data address (resolves port 0 binds).
    pub fn local_data_addr(&self) -> std::io::Result<SocketAddr> {
        self.data.local_addr()
    }

    /// Handle that stops the emulator from another thread (a signal
    /// handler, a test harness).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(Arc::clone(&self.shared))
    }

    /// Serve clients until shut down, then join all workers.
    pub fn run(mut self) -> Result<(), EmulatorError> {
        info!(
            control = %self.listener.local_addr()?,
            data = %self.data.local_addr()?,
            "emulator listening"
        );

        while !self.shared.is_shutdown() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!(%peer, "client connected");
                    match Session::new(stream, Arc::clone(&self.shared), Arc::clone(&self.data)) {
                        Ok(session) => session.serve(),
                        Err(error) => warn!(%error, "session setup failed"),
                    }
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

        info!("emulator stopping");
        self.join_workers();
        Ok(())
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> Result<EmulatorHandle, EmulatorError> {
        let control_addr = self.local_control_addr()?;
        let data_addr = self.local_data_addr()?;
        let shutdown = self.shutdown_handle();
        let thread = std::thread::Builder::new()
            .name("crankline-emulator".into())
            .spawn(move || self.run())?;
        Ok(EmulatorHandle::new(control_addr, Some(data_addr), shutdown, thread))
    }

    fn join_workers(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(sampler) = self.sampler.take() {
            let _ = sampler.join();
        }
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        self.join_workers();
    }
}

/// Idempotent stop signal for a running emulator.
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<Shared>,
}

impl ShutdownHandle {
    fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Request shutdown; every worker observes it within one tick.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }
}

/// A background emulator: bound addresses plus the means to stop it.
pub struct EmulatorHandle {
    control_addr: SocketAddr,
    data_addr: Option<SocketAddr>,
    shutdown: ShutdownHandle,
    thread: JoinHandle<Result<(), EmulatorError>>,
}

impl EmulatorHandle {
    fn new(
        control_addr: SocketAddr,
        data_addr: Option<SocketAddr>,
        shutdown: ShutdownHandle,
        thread: JoinHandle<Result<(), EmulatorError>>,
    ) -> Self {
        Self { control_addr, data_addr, shutdown, thread }
    }

    /// The bound control address.
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// The bound data address (`None` for the legacy emulator).
    pub fn data_addr(&self) -> Option<SocketAddr> {
        self.data_addr
    }

    /// A stop signal usable from any thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stop the emulator and wait for a clean exit.
    pub fn shutdown(self) -> Result<(), EmulatorError> {
        self.shutdown.shutdown();
        self.thread.join().map_err(|_| EmulatorError::WorkerPanicked)?
    }
}
