//! Split-protocol client: reliable control plus datagram data.
//!
//! `connect()` performs the whole handshake: open the control stream,
//! bind a local datagram socket, punch an outbound hole toward the
//! emulator's data port, then `SET_CONFIG` and `START`, each acknowledged
//! synchronously on the control stream. After that a background receiver
//! keeps the latest decoded block in a single-slot cell that
//! [`latest`](Device::latest) reads without blocking.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use bytes::Bytes;
use crankline_core::{
    DatagramLink, LatestSlot, MAX_DATAGRAM, SequenceGate, StreamLink, TransportError,
};
use crankline_proto::{
    ChannelSet, ControlMessage, DataFrame, Opcode, SampleBlock, SetConfig, StatusReport,
};
use tracing::{debug, warn};

use crate::{
    device::{Device, resolve},
    error::ClientError,
};

/// Bound on connect establishment.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Control round-trip deadline; the emulator answers immediately, so a
/// silent stream means the session is gone.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Datagram receive tick; doubles as the stop-flag observation interval.
const RECV_TICK: Duration = Duration::from_millis(100);

/// Background receiver worker handle.
struct Receiver {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Client for the split control/data protocol.
pub struct SplitClient {
    host: String,
    control_port: u16,
    data_port: u16,
    config: SetConfig,
    control: Option<StreamLink>,
    receiver: Option<Receiver>,
    latest: Arc<LatestSlot<SampleBlock>>,
}

impl SplitClient {
    /// Client with the default configuration: all 45 channels at the
    /// device's current cadence.
    pub fn new(host: impl Into<String>, control_port: u16, data_port: u16) -> Self {
        let config =
            SetConfig { channels: Some(ChannelSet::all().indices().to_vec()), ..SetConfig::default() };
        Self::with_config(host, control_port, data_port, config)
    }

    /// Client that sends a custom `SET_CONFIG` during connect.
    ///
    /// `udp_port` is overwritten with the locally bound datagram port.
    pub fn with_config(
        host: impl Into<String>,
        control_port: u16,
        data_port: u16,
        config: SetConfig,
    ) -> Self {
        Self {
            host: host.into(),
            control_port,
            data_port,
            config,
            control: None,
            receiver: None,
            latest: Arc::new(LatestSlot::new()),
        }
    }

    fn try_connect(&mut self) -> Result<(), ClientError> {
        let control_addr = resolve(&self.host, self.control_port)?;
        let link = StreamLink::connect(control_addr, Some(CONNECT_TIMEOUT))?;
        link.set_io_timeout(Some(CONTROL_TIMEOUT))?;
        let device_ip = link.peer_addr()?.ip();
        self.control = Some(link);

        // Fresh cell so a reconnect never serves a previous session's block.
        self.latest = Arc::new(LatestSlot::new());

        let bind_ip: IpAddr = match device_ip {
            IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            IpAddr::V6(_) => std::net::Ipv6Addr::UNSPECIFIED.into(),
        };
        let data = DatagramLink::bind(SocketAddr::new(bind_ip, 0), Some(RECV_TICK))?;
        let local_port = data.local_addr()?.port();

        // Outbound hole punch; also how the emulator learns our return
        // address when SET_CONFIG carries no udp_port.
        data.send_to(&[], SocketAddr::new(device_ip, self.data_port))?;

        let mut config = self.config.clone();
        config.udp_port = Some(local_port);
        let (ok, _payload) = self.send(ControlMessage::SetConfig(config));
        if !ok {
            return Err(ClientError::Refused { command: "SET_CONFIG" });
        }

        let (ok, _payload) = self.send(ControlMessage::Start);
        if !ok {
            return Err(ClientError::Refused { command: "START" });
        }

        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let worker_latest = Arc::clone(&self.latest);
        let handle = std::thread::Builder::new()
            .name("crankline-receiver".into())
            .spawn(move || run_receiver(&data, &worker_latest, &worker_stop))
            .map_err(ClientError::Io)?;
        self.receiver = Some(Receiver { stop, handle });

        Ok(())
    }

    /// One control round-trip.
    ///
    /// Returns `(ok, payload)` where `ok` is true iff the device answered
    /// `ACK`. The control channel is strictly request/response; concurrent
    /// callers must serialize (enforced here by `&mut self`).
    pub fn send(&mut self, message: ControlMessage) -> (bool, Bytes) {
        let Some(link) = self.control.as_mut() else {
            return (false, Bytes::new());
        };

        let frame = match message.into_frame() {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "control message failed to encode");
                return (false, Bytes::new());
            }
        };

        if let Err(error) = link.write_control(&frame) {
            debug!(%error, "control write failed");
            return (false, Bytes::new());
        }

        match link.read_control() {
            Ok(reply) => (reply.opcode() == Some(Opcode::Ack), reply.payload),
            Err(error) => {
                debug!(%error, "control read failed");
                (false, Bytes::new())
            }
        }
    }

    /// Ask the device for its current status.
    pub fn status(&mut self) -> Option<StatusReport> {
        let (ok, payload) = self.send(ControlMessage::GetStatus);
        if !ok {
            return None;
        }
        serde_json::from_slice(&payload).ok()
    }

    /// Liveness probe over the control stream.
    pub fn ping(&mut self) -> bool {
        self.send(ControlMessage::Ping).0
    }
}

impl Device for SplitClient {
    fn connect(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }
        match self.try_connect() {
            Ok(()) => true,
            Err(error) => {
                warn!(host = %self.host, port = self.control_port, %error, "split connect failed");
                self.disconnect();
                false
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        // Best effort: tell the device to stop streaming, ignoring failures.
        if self.control.is_some() {
            let _ = self.send(ControlMessage::Stop);
        }

        if let Some(receiver) = self.receiver.take() {
            receiver.stop.store(true, Ordering::Relaxed);
            let _ = receiver.handle.join();
        }

        if let Some(link) = self.control.take() {
            link.shutdown();
        }

        true
    }

    fn is_connected(&self) -> bool {
        self.control.is_some()
    }

    fn latest(&mut self) -> Option<SampleBlock> {
        self.latest.take()
    }
}

impl Drop for SplitClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Datagram receiver worker.
///
/// Decodes every arriving datagram, filters it through the sequence gate,
/// and publishes accepted blocks into the latest-frame cell. The receive
/// timeout is the liveness tick: each expiry re-checks the stop flag. A
/// non-timeout receive error means the socket was closed under us, which
/// is normal termination.
fn run_receiver(socket: &DatagramLink, latest: &LatestSlot<SampleBlock>, stop: &AtomicBool) {
    let mut gate = SequenceGate::new();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while !stop.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((len, _peer)) => match DataFrame::decode(&buf[..len]) {
                Ok(frame) => {
                    if gate.accept(frame.sequence_id) {
                        latest.publish(frame.block);
                    } else {
                        debug!(
                            sequence_id = frame.sequence_id,
                            rejected = gate.rejected(),
                            "dropped out-of-order frame"
                        );
                    }
                }
                Err(error) => debug!(%error, "undecodable datagram dropped"),
            },
            Err(TransportError::TimedOut) => {}
            Err(error) => {
                debug!(%error, "receiver terminating");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_is_idempotent() {
        let mut client = SplitClient::new("127.0.0.1", 1, 2);
        assert!(client.disconnect());
        assert!(client.disconnect());
        assert!(!client.is_connected());
    }

    #[test]
    fn send_without_connection_fails_cleanly() {
        let mut client = SplitClient::new("127.0.0.1", 1, 2);
        let (ok, payload) = client.send(ControlMessage::Ping);
        assert!(!ok);
        assert!(payload.is_empty());
    }

    #[test]
    fn receiver_filters_and_publishes() {
        let receiver_socket =
            DatagramLink::bind(SocketAddr::from(([127, 0, 0, 1], 0)), Some(RECV_TICK)).unwrap();
        let sender =
            DatagramLink::bind(SocketAddr::from(([127, 0, 0, 1], 0)), None).unwrap();
        let target = receiver_socket.local_addr().unwrap();

        let latest = Arc::new(LatestSlot::new());
        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let latest = Arc::clone(&latest);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || run_receiver(&receiver_socket, &latest, &stop))
        };

        let block = |time: f64| SampleBlock::from_rows(&[vec![time, 1.0]]).unwrap();
        for (sequence_id, time) in [(10, 0.1), (9, 0.05), (11, 0.2)] {
            let frame = DataFrame { sequence_id, block: block(time) };
            let mut wire = Vec::new();
            frame.encode(&mut wire).unwrap();
            sender.send_to(&wire, target).unwrap();
            std::thread::sleep(Duration::from_millis(50));
        }

        // Frame 9 was rejected: the surviving block is frame 11's.
        let published = latest.take().unwrap();
        assert_eq!(published.first_time(), 0.2);

        stop.store(true, Ordering::Relaxed);
        worker.join().unwrap();
    }
}
