//! Control-plane session dispatcher.
//!
//! One session serves one client's control connection: read a frame,
//! dispatch on its opcode, write the response, repeat. Protocol
//! violations (bad magic or version, short reads) end the session;
//! command-level problems (unknown opcode, bad JSON) are answered with an
//! `ERR` frame and the session continues.

use std::{
    net::{IpAddr, SocketAddr, TcpStream},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use crankline_core::{DatagramLink, LinkError, StreamLink, TransportError};
use crankline_proto::{
    ChannelSet, ControlFrame, ControlMessage, Opcode, SetConfig, StatusReport,
};
use tracing::{debug, info, warn};

use crate::{state::Shared, streamer};

/// Per-operation deadline on the session stream; each expiry re-checks
/// the emulator-wide stop flag.
const SESSION_TICK: Duration = Duration::from_millis(100);

/// One client's control session.
pub(crate) struct Session {
    link: StreamLink,
    peer_ip: IpAddr,
    shared: Arc<Shared>,
    data: Arc<DatagramLink>,
    streamer: Option<streamer::StreamerHandle>,
}

impl Session {
    /// Adopt an accepted control connection and reset the session state.
    pub fn new(
        stream: TcpStream,
        shared: Arc<Shared>,
        data: Arc<DatagramLink>,
    ) -> std::io::Result<Self> {
        let peer_ip = stream.peer_addr()?.ip();
        // Accepted from a nonblocking listener; the session itself uses
        // blocking reads with a short deadline.
        stream.set_nonblocking(false)?;
        let link = StreamLink::from_stream(stream);
        link.set_io_timeout(Some(SESSION_TICK))?;

        shared.reset_session();

        Ok(Self { link, peer_ip, shared, data, streamer: None })
    }

    /// Serve control frames until the client leaves, the protocol is
    /// violated, or the emulator shuts down.
    pub fn serve(mut self) {
        loop {
            if self.shared.is_shutdown() {
                break;
            }

            let frame = match self.link.read_control() {
                Ok(frame) => frame,
                Err(LinkError::Transport(TransportError::TimedOut)) => continue,
                Err(LinkError::Transport(TransportError::Eof)) => {
                    info!("client disconnected");
                    break;
                }
                Err(error) => {
                    warn!(%error, "session terminated");
                    break;
                }
            };

            if !self.dispatch(&frame) {
                break;
            }
        }

        self.stop_streamer();
    }

    /// Dispatch one frame. Returns false when the response write failed
    /// and the session must end.
    fn dispatch(&mut self, frame: &ControlFrame) -> bool {
        match frame.opcode() {
            Some(Opcode::SetConfig) => self.on_set_config(frame),
            Some(Opcode::Start) => self.on_start(),
            Some(Opcode::Stop) => self.on_stop(),
            Some(Opcode::GetStatus) => self.on_get_status(),
            Some(Opcode::Ping) => self.respond(ack(b"PONG")),
            Some(Opcode::Ack | Opcode::Err) | None => {
                debug!(opcode = frame.opcode, "unknown or unexpected opcode");
                self.respond(err(b"unknown_opcode"))
            }
        }
    }

    fn on_set_config(&mut self, frame: &ControlFrame) -> bool {
        let config: SetConfig = match serde_json::from_slice(&frame.payload) {
            Ok(config) => config,
            Err(error) => {
                debug!(%error, "SET_CONFIG payload rejected");
                return self.respond(err(b"invalid_json"));
            }
        };
        if let Err(error) = config.validate() {
            debug!(%error, "SET_CONFIG values rejected");
            return self.respond(err(b"invalid_config"));
        }

        {
            let mut state = self.shared.state.lock();
            if let Some(frequency) = config.frequency {
                state.frequency = frequency;
            }
            if let Some(samples_per_block) = config.samples_per_block {
                state.samples_per_block = samples_per_block;
            }
            if let Some(indices) = config.channels {
                // Validated above; an invalid set cannot reach this point.
                if let Ok(channels) = ChannelSet::new(indices) {
                    state.channels = channels;
                }
            }
            if let Some(port) = config.udp_port {
                state.target = Some(SocketAddr::new(self.peer_ip, port));
            }
            info!(
                frequency = state.frequency,
                samples_per_block = state.samples_per_block,
                channels = state.channels.len(),
                udp_target = ?state.target,
                "configuration applied"
            );
        }

        self.respond(ack(b"OK"))
    }

    fn on_start(&mut self) -> bool {
        let have_target = self.shared.state.lock().target.is_some();
        let target_known = have_target || self.learn_target();
        if !target_known {
            return self.respond(err(b"missing_udp_target"));
        }

        self.shared.state.lock().streaming = true;
        if self.streamer.is_none() {
            match streamer::spawn(Arc::clone(&self.shared), Arc::clone(&self.data)) {
                Ok(handle) => self.streamer = Some(handle),
                Err(error) => {
                    warn!(%error, "streamer failed to spawn");
                    self.shared.state.lock().streaming = false;
                    return self.respond(err(b"internal"));
                }
            }
        }

        self.respond(ack(b"STREAMING_STARTED"))
    }

    fn on_stop(&mut self) -> bool {
        self.shared.state.lock().streaming = false;
        self.stop_streamer();
        self.respond(ack(b"STREAMING_STOPPED"))
    }

    fn on_get_status(&mut self) -> bool {
        let report = {
            let state = self.shared.state.lock();
            StatusReport {
                is_streaming: state.streaming,
                frequency: state.frequency,
                samples_per_block: state.samples_per_block,
                channels: state.channels.indices().to_vec(),
                sequence_id: state.sequence_id,
            }
        };

        match serde_json::to_vec(&report) {
            Ok(payload) => self.respond(ack(&payload)),
            Err(error) => {
                warn!(%error, "status report failed to serialize");
                self.respond(err(b"internal"))
            }
        }
    }

    /// Learn the client's datagram return address from queued datagrams on
    /// the data socket (the split client punches a hole with an empty
    /// datagram right after connecting). Drains the queue and keeps the
    /// most recent source address.
    fn learn_target(&mut self) -> bool {
        let mut buf = [0u8; 64];
        let mut learned = None;
        while let Ok((_len, peer)) = self.data.recv_from(&mut buf) {
            learned = Some(peer);
        }

        match learned {
            Some(peer) => {
                info!(%peer, "datagram return address learned");
                self.shared.state.lock().target = Some(peer);
                true
            }
            None => false,
        }
    }

    /// Write one response frame. False ends the session.
    fn respond(&mut self, message: ControlMessage) -> bool {
        let frame = match message.into_frame() {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "response failed to encode");
                return false;
            }
        };
        match self.link.write_control(&frame) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "response write failed");
                false
            }
        }
    }

    fn stop_streamer(&mut self) {
        if let Some(handle) = self.streamer.take() {
            handle.stop();
        }
    }
}

fn ack(payload: &[u8]) -> ControlMessage {
    ControlMessage::Ack(Bytes::copy_from_slice(payload))
}

fn err(payload: &[u8]) -> ControlMessage {
    ControlMessage::Err(Bytes::copy_from_slice(payload))
}
