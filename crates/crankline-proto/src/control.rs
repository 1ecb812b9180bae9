//! Control-plane frames: commands and acknowledgements.
//!
//! A control frame is one command or one response on the reliable stream:
//!
//! ```text
//! [ControlHeader: 10 bytes, big endian] + [payload_len bytes of UTF-8 JSON]
//! ```
//!
//! The payload may be empty. Commands and responses alternate strictly on
//! one stream, so a frame never needs to carry a request id.

use bytes::{BufMut, Bytes};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    errors::{Result, WireError},
    payload::SetConfig,
};

/// Control operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Apply streaming configuration.
    SetConfig = 1,
    /// Begin emitting data frames.
    Start = 2,
    /// Stop emitting data frames.
    Stop = 3,
    /// Report current configuration and streaming state.
    GetStatus = 4,
    /// Liveness probe.
    Ping = 5,
    /// Positive response.
    Ack = 6,
    /// Negative response.
    Err = 7,
}

impl Opcode {
    /// Opcode for a raw wire value, `None` if unknown.
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::SetConfig),
            2 => Some(Self::Start),
            3 => Some(Self::Stop),
            4 => Some(Self::GetStatus),
            5 => Some(Self::Ping),
            6 => Some(Self::Ack),
            7 => Some(Self::Err),
            _ => None,
        }
    }

    /// Raw wire value.
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Fixed 10-byte control frame header (big endian network byte order).
///
/// Stored as raw byte arrays so the struct has no padding and can be cast
/// directly from network bytes; magic and version are validated after the
/// cast, the opcode is left raw so an unknown command can still be read off
/// the stream and answered with an error.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ControlHeader {
    magic: [u8; 2],
    version: [u8; 2],
    opcode: [u8; 2],
    payload_len: [u8; 4],
}

impl ControlHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 10;

    /// Magic number identifying control frames.
    pub const MAGIC: u16 = 0xC0DE;

    /// Current control protocol version.
    pub const VERSION: u16 = 1;

    /// Maximum accepted payload length (64 KiB).
    ///
    /// Control payloads are small JSON documents; the cap exists so a
    /// corrupt or hostile length field cannot drive a huge allocation.
    pub const MAX_PAYLOAD: u32 = 64 * 1024;

    /// Create a header for the given opcode and payload length.
    pub fn new(opcode: u16, payload_len: u32) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION.to_be_bytes(),
            opcode: opcode.to_be_bytes(),
            payload_len: payload_len.to_be_bytes(),
        }
    }

    /// Parse a header from the front of `bytes` (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`WireError::ShortHeader`] if fewer than 10 bytes are available
    /// - [`WireError::BadMagic`] / [`WireError::UnsupportedVersion`] on
    ///   identification mismatch
    /// - [`WireError::BadShape`] if the claimed payload length exceeds
    ///   [`Self::MAX_PAYLOAD`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _rest) = Self::ref_from_prefix(bytes)
            .map_err(|_| WireError::ShortHeader { need: Self::SIZE, got: bytes.len() })?;

        if header.magic() != Self::MAGIC {
            return Err(WireError::BadMagic { expected: Self::MAGIC, got: header.magic() });
        }
        if header.version() != Self::VERSION {
            return Err(WireError::UnsupportedVersion {
                supported: Self::VERSION,
                got: header.version(),
            });
        }
        if header.payload_len() > Self::MAX_PAYLOAD {
            return Err(WireError::BadShape(format!(
                "payload length {} exceeds the {} byte cap",
                header.payload_len(),
                Self::MAX_PAYLOAD
            )));
        }

        Ok(header)
    }

    /// Magic number field.
    pub fn magic(&self) -> u16 {
        u16::from_be_bytes(self.magic)
    }

    /// Protocol version field.
    pub fn version(&self) -> u16 {
        u16::from_be_bytes(self.version)
    }

    /// Raw opcode field (may be unknown to this implementation).
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> u32 {
        u32::from_be_bytes(self.payload_len)
    }
}

/// Complete control frame (transport layer).
///
/// Holds the raw opcode and opaque payload bytes, not the decoded
/// [`ControlMessage`]; a dispatcher can answer an unknown opcode without
/// this type rejecting it first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    /// Raw opcode (see [`Opcode::from_u16`]).
    pub opcode: u16,
    /// Raw payload bytes (UTF-8 JSON or empty).
    pub payload: Bytes,
}

impl ControlFrame {
    /// Create a frame for a known opcode.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self { opcode: opcode.to_u16(), payload: payload.into() }
    }

    /// Decoded opcode, `None` when unknown.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode)
    }

    /// Encode the frame into `dst`.
    ///
    /// # Errors
    ///
    /// [`WireError::BadShape`] when the payload exceeds
    /// [`ControlHeader::MAX_PAYLOAD`].
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let payload_len = u32::try_from(self.payload.len())
            .ok()
            .filter(|len| *len <= ControlHeader::MAX_PAYLOAD)
            .ok_or_else(|| {
                WireError::BadShape(format!("payload of {} bytes is oversize", self.payload.len()))
            })?;

        let header = ControlHeader::new(self.opcode, payload_len);
        dst.put_slice(header.as_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire format.
    ///
    /// Trailing bytes beyond the claimed payload are ignored; on a stream
    /// the caller reads exactly one header plus one payload at a time.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = ControlHeader::from_bytes(bytes)?;
        let payload_len = header.payload_len() as usize;
        let opcode = header.opcode();

        let available = bytes.len() - ControlHeader::SIZE;
        if available < payload_len {
            return Err(WireError::ShortPayload { expected: payload_len, got: available });
        }

        let payload =
            Bytes::copy_from_slice(&bytes[ControlHeader::SIZE..ControlHeader::SIZE + payload_len]);

        Ok(Self { opcode, payload })
    }
}

/// High-level control message, one variant per opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Apply streaming configuration.
    SetConfig(SetConfig),
    /// Begin emitting data frames.
    Start,
    /// Stop emitting data frames.
    Stop,
    /// Report configuration and streaming state.
    GetStatus,
    /// Liveness probe.
    Ping,
    /// Positive response with an opaque payload.
    Ack(Bytes),
    /// Negative response with an opaque payload.
    Err(Bytes),
}

impl ControlMessage {
    /// The opcode this message travels under.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::SetConfig(_) => Opcode::SetConfig,
            Self::Start => Opcode::Start,
            Self::Stop => Opcode::Stop,
            Self::GetStatus => Opcode::GetStatus,
            Self::Ping => Opcode::Ping,
            Self::Ack(_) => Opcode::Ack,
            Self::Err(_) => Opcode::Err,
        }
    }

    /// Build the wire frame for this message.
    pub fn into_frame(self) -> Result<ControlFrame> {
        let opcode = self.opcode();
        let payload = match self {
            Self::SetConfig(config) => Bytes::from(serde_json::to_vec(&config)?),
            Self::Start | Self::Stop | Self::GetStatus | Self::Ping => Bytes::new(),
            Self::Ack(payload) | Self::Err(payload) => payload,
        };
        Ok(ControlFrame::new(opcode, payload))
    }

    /// Interpret a wire frame as a message.
    ///
    /// # Errors
    ///
    /// - [`WireError::BadShape`] for an opcode unknown to this
    ///   implementation
    /// - [`WireError::MalformedJson`] when a `SET_CONFIG` payload does not
    ///   parse
    pub fn from_frame(frame: &ControlFrame) -> Result<Self> {
        let opcode = frame
            .opcode()
            .ok_or_else(|| WireError::BadShape(format!("unknown opcode {}", frame.opcode)))?;

        Ok(match opcode {
            Opcode::SetConfig => Self::SetConfig(serde_json::from_slice(&frame.payload)?),
            Opcode::Start => Self::Start,
            Opcode::Stop => Self::Stop,
            Opcode::GetStatus => Self::GetStatus,
            Opcode::Ping => Self::Ping,
            Opcode::Ack => Self::Ack(frame.payload.clone()),
            Opcode::Err => Self::Err(frame.payload.clone()),
        })
    }
}
