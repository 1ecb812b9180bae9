//! Emulator configuration and shared session state.

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
};

use crankline_core::LatestSlot;
use crankline_proto::{ChannelSet, SampleBlock};
use parking_lot::Mutex;

/// Default control-plane port.
pub const DEFAULT_CONTROL_PORT: u16 = 6000;

/// Default data-plane port.
pub const DEFAULT_DATA_PORT: u16 = 5999;

/// Static emulator configuration.
///
/// The streaming parameters are the per-session defaults; a client's
/// `SET_CONFIG` overrides them for the lifetime of its session.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Address the control listener binds to.
    pub control_addr: SocketAddr,
    /// Address the datagram data socket binds to.
    pub data_addr: SocketAddr,
    /// Default sampling frequency in Hz.
    pub frequency: u32,
    /// Default samples per emitted block.
    pub samples_per_block: u16,
    /// Default channel selection.
    pub channels: ChannelSet,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            control_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_CONTROL_PORT)),
            data_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_DATA_PORT)),
            frequency: 50,
            samples_per_block: 10,
            channels: ChannelSet::all(),
        }
    }
}

/// Mutable per-session streaming state.
///
/// Config fields and the streaming flag are guarded together so readers
/// can snapshot a consistent pair under one short lock.
pub(crate) struct StreamState {
    /// Sampling frequency in Hz.
    pub frequency: u32,
    /// Samples per emitted block.
    pub samples_per_block: u16,
    /// Channels projected into outgoing data frames.
    pub channels: ChannelSet,
    /// Where data frames are sent, once known.
    pub target: Option<SocketAddr>,
    /// Whether the streamer should be emitting.
    pub streaming: bool,
    /// Sequence id of the last emitted frame (0 before the first).
    pub sequence_id: u32,
    /// Last block timestamp put on the wire; blocks at or before this
    /// watermark are never re-sent, even across streamer restarts.
    pub last_streamed_time: f64,
}

impl StreamState {
    /// Fresh state for a new session, from the emulator defaults.
    pub fn from_config(config: &EmulatorConfig) -> Self {
        Self {
            frequency: config.frequency,
            samples_per_block: config.samples_per_block,
            channels: config.channels.clone(),
            target: None,
            streaming: false,
            sequence_id: 0,
            last_streamed_time: f64::NEG_INFINITY,
        }
    }
}

/// State shared by the acceptor, dispatcher, sampler, and streamer.
pub(crate) struct Shared {
    /// The emulator defaults, used to reset sessions.
    pub config: EmulatorConfig,
    /// Per-session streaming state.
    pub state: Mutex<StreamState>,
    /// Newest synthetic block from the sampler.
    pub latest_block: LatestSlot<SampleBlock>,
    /// Emulator-wide stop flag, observed by every worker each iteration.
    pub shutdown: AtomicBool,
}

impl Shared {
    pub fn new(config: EmulatorConfig) -> Self {
        let state = StreamState::from_config(&config);
        Self {
            config,
            state: Mutex::new(state),
            latest_block: LatestSlot::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Reset the session state to the configured defaults.
    pub fn reset_session(&self) {
        *self.state.lock() = StreamState::from_config(&self.config);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}
