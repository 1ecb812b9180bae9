//! Data-plane frames: sample blocks and their datagram encoding.
//!
//! A [`DataFrame`] is one datagram on the wire:
//!
//! ```text
//! [DataHeader: 12 bytes, big endian] + [samples_per_block x channel_count x 8 bytes BE f64]
//! ```
//!
//! The payload is row-major by sample (sample 0 channel 0, sample 0
//! channel 1, ..., sample S-1 channel C-1) and column 0 of every sample is
//! the device timestamp in seconds. Lost frames are never retransmitted;
//! consumers observe a discontinuity in the time column instead.

use bytes::BufMut;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    channel::ChannelSet,
    errors::{Result, WireError},
};

/// Fixed 12-byte data frame header (big endian network byte order).
///
/// Fields are stored as raw byte arrays so the struct has no padding and can
/// be cast directly from untrusted network bytes; every 12-byte pattern is a
/// structurally valid header, and magic/version are checked after the cast.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DataHeader {
    magic: [u8; 2],
    version: [u8; 2],
    sequence_id: [u8; 4],
    samples_per_block: [u8; 2],
    channel_count: [u8; 2],
}

impl DataHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 12;

    /// Magic number identifying data frames.
    pub const MAGIC: u16 = 0xDA7A;

    /// Current data protocol version.
    pub const VERSION: u16 = 1;

    /// Create a header for a frame with the given dimensions.
    pub fn new(sequence_id: u32, samples_per_block: u16, channel_count: u16) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION.to_be_bytes(),
            sequence_id: sequence_id.to_be_bytes(),
            samples_per_block: samples_per_block.to_be_bytes(),
            channel_count: channel_count.to_be_bytes(),
        }
    }

    /// Parse a header from the front of `bytes` (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`WireError::ShortHeader`] if fewer than 12 bytes are available
    /// - [`WireError::BadMagic`] / [`WireError::UnsupportedVersion`] on
    ///   identification mismatch
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

    /// Wrapping frame sequence identifier.
    pub fn sequence_id(&self) -> u32 {
        u32::from_be_bytes(self.sequence_id)
    }

    /// Number of samples in the payload.
    pub fn samples_per_block(&self) -> u16 {
        u16::from_be_bytes(self.samples_per_block)
    }

    /// Number of values per sample (time column included).
    pub fn channel_count(&self) -> u16 {
        u16::from_be_bytes(self.channel_count)
    }
}

/// Borrowed view of one sample inside a [`SampleBlock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<'a> {
    /// Monotonic device time in seconds.
    pub time: f64,
    /// Channel readings, in block column order (time column excluded).
    pub channels: &'a [f64],
}

/// A group of consecutive samples produced atomically.
///
/// Stored as a row-major matrix of `samples x width` values where column 0
/// is the device timestamp. Blocks are never empty, every row has the same
/// width, and timestamps are strictly increasing within the block. These
/// invariants are enforced at construction and therefore hold for every
/// block decoded off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    width: usize,
    values: Vec<f64>,
}

impl SampleBlock {
    /// Build a block from row-major values.
    ///
    /// # Errors
    ///
    /// [`WireError::BadShape`] if `width` is zero, `values` is empty or not
    /// a multiple of `width`, or the time column is not strictly increasing.
    pub fn from_raw(width: usize, values: Vec<f64>) -> Result<Self> {
        if width == 0 {
            return Err(WireError::BadShape("sample width must be positive".into()));
        }
        if values.is_empty() || values.len() % width != 0 {
            return Err(WireError::BadShape(format!(
                "{} values cannot form rows of width {width}",
                values.len()
            )));
        }

        let block = Self { width, values };
        let mut previous = f64::NEG_INFINITY;
        for row in block.values.chunks_exact(width) {
            if row[0] <= previous {
                return Err(WireError::BadShape(format!(
                    "timestamps not strictly increasing ({} after {previous})",
                    row[0]
                )));
            }
            previous = row[0];
        }

        Ok(block)
    }

    /// Build a block from explicit rows.
    ///
    /// All rows must share the same non-zero width; see [`Self::from_raw`]
    /// for the remaining shape rules.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return Err(WireError::BadShape("rows are not rectangular".into()));
        }
        Self::from_raw(width, rows.concat())
    }

    /// Values per sample, time column included.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of samples in the block (always at least one).
    pub fn samples(&self) -> usize {
        self.values.len() / self.width
    }

    /// Channel readings per sample (time column excluded).
    pub fn channels(&self) -> usize {
        self.width - 1
    }

    /// One row of the block, time column first.
    pub fn row(&self, index: usize) -> &[f64] {
        &self.values[index * self.width..(index + 1) * self.width]
    }

    /// Iterate the samples in time order.
    pub fn iter(&self) -> impl Iterator<Item = Sample<'_>> {
        self.values
            .chunks_exact(self.width)
            .map(|row| Sample { time: row[0], channels: &row[1..] })
    }

    /// Timestamp of the first sample.
    pub fn first_time(&self) -> f64 {
        self.values[0]
    }

    /// Timestamp of the last sample.
    pub fn last_time(&self) -> f64 {
        self.values[self.values.len() - self.width]
    }

    /// Raw row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Project the block onto a channel set, time column always first.
    ///
    /// Channel index `c` selects block column `c + 1`. Fails with
    /// [`WireError::BadShape`] when the block is too narrow for the set.
    pub fn project(&self, channels: &ChannelSet) -> Result<Self> {
        if let Some(&max) = channels.indices().last()
            && usize::from(max) + 1 >= self.width
        {
            return Err(WireError::BadShape(format!(
                "channel {max} not present in block of width {}",
                self.width
            )));
        }

        let width = 1 + channels.len();
        let mut values = Vec::with_capacity(self.samples() * width);
        for row in self.values.chunks_exact(self.width) {
            values.push(row[0]);
            for &index in channels.indices() {
                values.push(row[usize::from(index) + 1]);
            }
        }

        Ok(Self { width, values })
    }
}

/// One data-plane frame: a sequence id plus a sample block.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    /// Wrapping per-session sequence identifier.
    pub sequence_id: u32,
    /// The sample block carried by this frame.
    pub block: SampleBlock,
}

impl DataFrame {
    /// Serialized size of this frame in bytes.
    pub fn wire_size(&self) -> usize {
        DataHeader::SIZE + self.block.values().len() * 8
    }

    /// Encode the frame into `dst`.
    ///
    /// # Errors
    ///
    /// [`WireError::BadShape`] when the block dimensions do not fit the
    /// 16-bit header fields.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let samples = u16::try_from(self.block.samples()).map_err(|_| {
            WireError::BadShape(format!("{} samples overflow the header", self.block.samples()))
        })?;
        let width = u16::try_from(self.block.width()).map_err(|_| {
            WireError::BadShape(format!("width {} overflows the header", self.block.width()))
        })?;

        let header = DataHeader::new(self.sequence_id, samples, width);
        dst.put_slice(header.as_bytes());
        for value in self.block.values() {
            dst.put_f64(*value);
        }

        Ok(())
    }

    /// Decode one whole datagram.
    ///
    /// Datagrams are atomic, so the byte count must match the header
    /// exactly: fewer payload bytes than claimed (a truncated oversize
    /// datagram included) is [`WireError::ShortPayload`], trailing garbage
    /// is [`WireError::BadShape`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = DataHeader::from_bytes(bytes)?;
        let samples = usize::from(header.samples_per_block());
        let width = usize::from(header.channel_count());
        let sequence_id = header.sequence_id();

        if samples == 0 || width == 0 {
            return Err(WireError::BadShape("empty block dimensions".into()));
        }

        let expected = samples * width * 8;
        let payload = &bytes[DataHeader::SIZE..];
        if payload.len() < expected {
            return Err(WireError::ShortPayload { expected, got: payload.len() });
        }
        if payload.len() > expected {
            return Err(WireError::BadShape(format!(
                "{} trailing bytes after block payload",
                payload.len() - expected
            )));
        }

        let mut values = Vec::with_capacity(samples * width);
        for chunk in payload.chunks_exact(8) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            values.push(f64::from_be_bytes(raw));
        }

        Ok(Self { sequence_id, block: SampleBlock::from_raw(width, values)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_sample_block() -> SampleBlock {
        SampleBlock::from_rows(&[vec![0.0, 0.5], vec![0.02, 0.75]]).unwrap()
    }

    #[test]
    fn known_wire_layout() {
        let frame = DataFrame { sequence_id: 1, block: two_sample_block() };

        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        assert_eq!(wire.len(), 44);
        assert_eq!(
            &wire[..DataHeader::SIZE],
            &[0xDA, 0x7A, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x02]
        );

        let mut doubles = Vec::new();
        for value in [0.0_f64, 0.5, 0.02, 0.75] {
            doubles.extend_from_slice(&value.to_be_bytes());
        }
        assert_eq!(&wire[DataHeader::SIZE..], &doubles[..]);
    }

    #[test]
    fn decode_round_trip() {
        let frame = DataFrame { sequence_id: 0xDEAD_BEEF, block: two_sample_block() };
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        let parsed = DataFrame::decode(&wire).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn reject_bad_magic() {
        let frame = DataFrame { sequence_id: 7, block: two_sample_block() };
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();
        wire[0] = 0xBE;

        assert!(matches!(DataFrame::decode(&wire), Err(WireError::BadMagic { .. })));
    }

    #[test]
    fn reject_truncated_payload() {
        let frame = DataFrame { sequence_id: 7, block: two_sample_block() };
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();
        wire.truncate(wire.len() - 1);

        assert!(matches!(DataFrame::decode(&wire), Err(WireError::ShortPayload { .. })));
    }

    #[test]
    fn reject_non_monotone_block() {
        let result = SampleBlock::from_rows(&[vec![1.0, 0.0], vec![1.0, 0.0]]);
        assert!(matches!(result, Err(WireError::BadShape(_))));
    }

    #[test]
    fn projection_keeps_time_first() {
        let block = SampleBlock::from_rows(&[
            vec![0.0, 10.0, 20.0, 30.0],
            vec![0.1, 11.0, 21.0, 31.0],
        ])
        .unwrap();
        let set = ChannelSet::new([2, 0]).unwrap();

        let projected = block.project(&set).unwrap();
        assert_eq!(projected.width(), 3);
        assert_eq!(projected.row(0), &[0.0, 10.0, 30.0]);
        assert_eq!(projected.row(1), &[0.1, 11.0, 31.0]);
    }

    #[test]
    fn projection_rejects_narrow_block() {
        let block = two_sample_block();
        let set = ChannelSet::new([5]).unwrap();
        assert!(block.project(&set).is_err());
    }
}
