//! Unreliable datagram adapter.
//!
//! One [`DatagramLink`] wraps one UDP socket. Sends are atomic whole
//! datagrams; receives fill a caller-provided buffer (size it with
//! [`MAX_DATAGRAM`]; anything larger than the buffer is silently truncated
//! by the kernel and the decoder rejects the remainder). The receive
//! timeout doubles as the worker liveness tick.

use std::{
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use socket2::{Domain, Protocol, Socket, Type};

use crate::errors::TransportError;

/// Largest datagram either side will send or accept (64 KiB).
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Socket buffer size requested from the kernel (best effort).
const SOCKET_BUFFER_SIZE: usize = 1024 * 1024;

/// An unreliable datagram channel.
pub struct DatagramLink {
    socket: UdpSocket,
}

impl DatagramLink {
    /// Bind a datagram socket on `addr` with the given receive timeout.
    ///
    /// Address reuse is enabled so quick restarts do not fight the previous
    /// incarnation for the port, and the kernel buffers are enlarged so a
    /// burst of sample frames is not dropped before the receiver wakes.
    pub fn bind(addr: SocketAddr, recv_timeout: Option<Duration>) -> std::io::Result<Self> {
        let domain = Domain::for_address(addr);
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_read_timeout(recv_timeout)?;

        let _ = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE);
        let _ = socket.set_send_buffer_size(SOCKET_BUFFER_SIZE);

        Ok(Self { socket: socket.into() })
    }

    /// The locally bound address (resolves port 0 binds).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Clone the underlying socket handle for a receiver worker.
    pub fn try_clone(&self) -> std::io::Result<Self> {
        Ok(Self { socket: self.socket.try_clone()? })
    }

    /// Send one whole datagram to `peer`.
    pub fn send_to(&self, bytes: &[u8], peer: SocketAddr) -> Result<(), TransportError> {
        self.socket.send_to(bytes, peer).map_err(TransportError::from_io)?;
        Ok(())
    }

    /// Receive one whole datagram into `buf`.
    ///
    /// Returns [`TransportError::TimedOut`] when the configured deadline
    /// elapses without traffic.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TransportError> {
        self.socket.recv_from(buf).map_err(TransportError::from_io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn datagrams_arrive_whole() {
        let receiver = DatagramLink::bind(local(0), Some(Duration::from_millis(500))).unwrap();
        let sender = DatagramLink::bind(local(0), None).unwrap();

        sender.send_to(&[9u8; 1200], receiver.local_addr().unwrap()).unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, peer) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(len, 1200);
        assert_eq!(peer, sender.local_addr().unwrap());
        assert!(buf[..len].iter().all(|&b| b == 9));
    }

    #[test]
    fn idle_socket_times_out() {
        let receiver = DatagramLink::bind(local(0), Some(Duration::from_millis(20))).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(receiver.recv_from(&mut buf), Err(TransportError::TimedOut)));
    }

    #[test]
    fn empty_datagram_is_received() {
        let receiver = DatagramLink::bind(local(0), Some(Duration::from_millis(500))).unwrap();
        let sender = DatagramLink::bind(local(0), None).unwrap();

        sender.send_to(&[], receiver.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 16];
        let (len, _peer) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(len, 0);
    }
}
