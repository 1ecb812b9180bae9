//! Reliable stream adapter.
//!
//! Wraps a connected `TcpStream` with exact-length reads and writes. A
//! zero-length read surfaces as [`TransportError::Eof`] and the caller must
//! treat the stream as dead; an elapsed read timeout surfaces as
//! [`TransportError::TimedOut`] and the stream stays usable.

use std::{
    io::{Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    time::Duration,
};

use bytes::Bytes;
use crankline_proto::{ControlFrame, ControlHeader};

use crate::errors::{LinkError, TransportError};

/// A reliable byte stream carrying length-prefixed frames.
pub struct StreamLink {
    stream: TcpStream,
}

impl StreamLink {
    /// Connect to `addr`, optionally bounding the connect itself.
    pub fn connect(addr: SocketAddr, timeout: Option<Duration>) -> std::io::Result<Self> {
        let stream = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        Ok(Self { stream })
    }

    /// Adopt an already-connected stream (the emulator's accepted side).
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Set the per-operation timeout for both reads and writes.
    pub fn set_io_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Read exactly `len` bytes, looping over short reads.
    pub fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(TransportError::Eof),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::from_io(e)),
            }
        }
        Ok(buf)
    }

    /// Write the whole buffer.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).map_err(TransportError::from_io)
    }

    /// Read one control frame: fixed header, then the claimed payload.
    pub fn read_control(&mut self) -> Result<ControlFrame, LinkError> {
        let header_bytes = self.read_exact(ControlHeader::SIZE)?;
        let header = ControlHeader::from_bytes(&header_bytes)?;
        let opcode = header.opcode();
        let payload_len = header.payload_len() as usize;

        let payload = self.read_exact(payload_len)?;
        Ok(ControlFrame { opcode, payload: Bytes::from(payload) })
    }

    /// Write one control frame.
    pub fn write_control(&mut self, frame: &ControlFrame) -> Result<(), LinkError> {
        let mut wire = Vec::with_capacity(ControlHeader::SIZE + frame.payload.len());
        frame.encode(&mut wire)?;
        self.write_all(&wire)?;
        Ok(())
    }

    /// Shut the stream down in both directions, ignoring failures.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use crankline_proto::{ControlMessage, Opcode};

    use super::*;

    fn pair() -> (StreamLink, StreamLink) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let join = thread::spawn(move || listener.accept().unwrap().0);
        let client = StreamLink::connect(addr, Some(Duration::from_secs(1))).unwrap();
        let server = StreamLink::from_stream(join.join().unwrap());
        (client, server)
    }

    #[test]
    fn exact_read_reassembles_split_writes() {
        let (mut client, mut server) = pair();
        server.write_all(&[1, 2, 3]).unwrap();
        server.write_all(&[4, 5]).unwrap();
        assert_eq!(client.read_exact(5).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn closed_peer_reads_as_eof() {
        let (mut client, server) = pair();
        drop(server);
        assert!(matches!(client.read_exact(1), Err(TransportError::Eof)));
    }

    #[test]
    fn timeout_is_distinct_from_eof() {
        let (mut client, _server) = pair();
        client.set_io_timeout(Some(Duration::from_millis(20))).unwrap();
        assert!(matches!(client.read_exact(1), Err(TransportError::TimedOut)));
    }

    #[test]
    fn control_frame_crosses_the_link() {
        let (mut client, mut server) = pair();
        let frame = ControlMessage::Ping.into_frame().unwrap();
        client.write_control(&frame).unwrap();

        let received = server.read_control().unwrap();
        assert_eq!(received.opcode(), Some(Opcode::Ping));
        assert!(received.payload.is_empty());
    }
}
