//! Legacy request/response frames.
//!
//! The first-generation device speaks a poll protocol over a single
//! reliable stream: the client sends a request enumerating the command
//! codes it wants served, the device answers with one block of doubles.
//! Neither frame carries a magic number or version; the stream framing is
//! a bare big-endian `i32` length prefix.

use bytes::BufMut;

use crate::{
    data::SampleBlock,
    errors::{Result, WireError},
};

/// Values per sample in a legacy response (time column included).
pub const LEGACY_SAMPLE_WIDTH: usize = 10;

/// Command pair dimensions of the built-in request types.
const NORMAL_ROWS: u8 = 43;
const NORMAL_COLS: u8 = 10;

/// A legacy request frame: a rectangular matrix of command codes.
///
/// On the wire: `i32 BE total_len` followed by `total_len` bytes, one per
/// command code, row-major. Commands come in `(x, y)` pairs, so a decoded
/// request always has width 2; the encoder accepts any rectangle because
/// the constructor-side invariant is only that the matrix is rectangular.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRequest {
    cols: usize,
    codes: Vec<u8>,
}

impl LegacyRequest {
    /// The default "NORMAL" request: all 430 command pairs
    /// `(x, y), x in 0..43, y in 0..10`.
    pub fn normal() -> Self {
        let mut codes = Vec::with_capacity(usize::from(NORMAL_ROWS) * usize::from(NORMAL_COLS) * 2);
        for x in 0..NORMAL_ROWS {
            for y in 0..NORMAL_COLS {
                codes.push(x);
                codes.push(y);
            }
        }
        Self { cols: 2, codes }
    }

    /// The "FAST" request type.
    ///
    /// Identical to [`Self::normal`] on the wire; the device firmware never
    /// distinguished the two.
    pub fn fast() -> Self {
        Self::normal()
    }

    /// Build a request from an explicit command matrix.
    ///
    /// # Errors
    ///
    /// [`WireError::BadShape`] when the matrix is empty or not rectangular.
    pub fn from_matrix(rows: &[Vec<u8>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if cols == 0 {
            return Err(WireError::BadShape("command matrix is empty".into()));
        }
        if rows.iter().any(|row| row.len() != cols) {
            return Err(WireError::BadShape("command matrix is not rectangular".into()));
        }
        Ok(Self { cols, codes: rows.concat() })
    }

    /// Number of command rows.
    pub fn rows(&self) -> usize {
        self.codes.len() / self.cols
    }

    /// Commands per row.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major command codes.
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    /// Total byte count carried by the length prefix.
    pub fn total_len(&self) -> usize {
        self.codes.len()
    }

    /// Encode the frame into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i32(self.codes.len() as i32);
        dst.put_slice(&self.codes);
    }

    /// Decode a frame from wire format.
    ///
    /// The wire does not carry the matrix shape, only its area; decoding
    /// re-forms the `(x, y)` pair rectangle, so the length must be even.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(WireError::ShortHeader { need: 4, got: bytes.len() });
        }
        let total_len = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let total_len = usize::try_from(total_len)
            .map_err(|_| WireError::BadShape(format!("negative request length {total_len}")))?;

        let payload = &bytes[4..];
        if payload.len() < total_len {
            return Err(WireError::ShortPayload { expected: total_len, got: payload.len() });
        }
        if total_len == 0 || total_len % 2 != 0 {
            return Err(WireError::BadShape(format!(
                "{total_len} command codes cannot form (x, y) pairs"
            )));
        }

        Ok(Self { cols: 2, codes: payload[..total_len].to_vec() })
    }
}

/// A legacy response frame: one block of big-endian doubles.
///
/// On the wire: `i32 BE double_count` followed by `double_count` IEEE-754
/// binary64 values. The count must divide by [`LEGACY_SAMPLE_WIDTH`]; each
/// group of ten consecutive doubles is one sample whose first value is the
/// device timestamp (the historical client reshaped row-major and
/// transposed, which leaves the time column leading).
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyResponse {
    block: SampleBlock,
}

impl LegacyResponse {
    /// Body length in bytes implied by the 4-byte count prefix.
    ///
    /// Used by stream readers that must know how many bytes to pull after
    /// the prefix. Shape validation happens later in [`Self::decode`].
    pub fn body_len(prefix: [u8; 4]) -> Result<usize> {
        let double_count = i32::from_be_bytes(prefix);
        let double_count = usize::try_from(double_count)
            .map_err(|_| WireError::BadShape(format!("negative double count {double_count}")))?;
        Ok(double_count * 8)
    }

    /// Wrap a block for the wire.
    ///
    /// # Errors
    ///
    /// [`WireError::BadShape`] unless the block is exactly
    /// [`LEGACY_SAMPLE_WIDTH`] wide.
    pub fn from_block(block: SampleBlock) -> Result<Self> {
        if block.width() != LEGACY_SAMPLE_WIDTH {
            return Err(WireError::BadShape(format!(
                "legacy responses are {LEGACY_SAMPLE_WIDTH} wide, got {}",
                block.width()
            )));
        }
        Ok(Self { block })
    }

    /// The carried sample block.
    pub fn block(&self) -> &SampleBlock {
        &self.block
    }

    /// Consume into the carried sample block.
    pub fn into_block(self) -> SampleBlock {
        self.block
    }

    /// Encode the frame into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i32(self.block.values().len() as i32);
        for value in self.block.values() {
            dst.put_f64(*value);
        }
    }

    /// Decode a frame from wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(WireError::ShortHeader { need: 4, got: bytes.len() });
        }
        let double_count = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let double_count = usize::try_from(double_count)
            .map_err(|_| WireError::BadShape(format!("negative double count {double_count}")))?;

        if double_count == 0 || double_count % LEGACY_SAMPLE_WIDTH != 0 {
            return Err(WireError::BadShape(format!(
                "{double_count} doubles cannot form {LEGACY_SAMPLE_WIDTH}-wide samples"
            )));
        }

        let expected = double_count * 8;
        let payload = &bytes[4..];
        if payload.len() < expected {
            return Err(WireError::ShortPayload { expected, got: payload.len() });
        }

        let mut values = Vec::with_capacity(double_count);
        for chunk in payload[..expected].chunks_exact(8) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            values.push(f64::from_be_bytes(raw));
        }

        Ok(Self { block: SampleBlock::from_raw(LEGACY_SAMPLE_WIDTH, values)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_request_enumerates_every_pair() {
        let request = LegacyRequest::normal();
        assert_eq!(request.rows(), 430);
        assert_eq!(request.cols(), 2);
        assert_eq!(request.total_len(), 860);
        assert_eq!(&request.codes()[..4], &[0, 0, 0, 1]);
        assert_eq!(&request.codes()[858..], &[42, 9]);
    }

    #[test]
    fn fast_matches_normal() {
        assert_eq!(LegacyRequest::fast(), LegacyRequest::normal());
    }

    #[test]
    fn request_round_trip() {
        let request = LegacyRequest::from_matrix(&[vec![1, 2], vec![3, 4], vec![5, 6]]).unwrap();
        let mut wire = Vec::new();
        request.encode(&mut wire);

        assert_eq!(&wire[..4], &[0, 0, 0, 6]);
        assert_eq!(LegacyRequest::decode(&wire).unwrap(), request);
    }

    #[test]
    fn request_rejects_ragged_matrix() {
        let result = LegacyRequest::from_matrix(&[vec![1, 2], vec![3]]);
        assert!(matches!(result, Err(WireError::BadShape(_))));
    }

    #[test]
    fn request_rejects_odd_wire_length() {
        let mut wire = Vec::new();
        wire.put_i32(3);
        wire.put_slice(&[1, 2, 3]);
        assert!(matches!(LegacyRequest::decode(&wire), Err(WireError::BadShape(_))));
    }

    #[test]
    fn response_round_trip() {
        let rows: Vec<Vec<f64>> = (0..3)
            .map(|sample| {
                let mut row = vec![sample as f64 * 0.02];
                row.extend((1..LEGACY_SAMPLE_WIDTH).map(|channel| channel as f64));
                row
            })
            .collect();
        let response = LegacyResponse::from_block(SampleBlock::from_rows(&rows).unwrap()).unwrap();

        let mut wire = Vec::new();
        response.encode(&mut wire);
        assert_eq!(&wire[..4], &[0, 0, 0, 30]);

        let parsed = LegacyResponse::decode(&wire).unwrap();
        assert_eq!(parsed, response);
        assert_eq!(parsed.block().first_time(), 0.0);
        assert_eq!(parsed.block().last_time(), 0.04);
    }

    #[test]
    fn response_rejects_indivisible_count() {
        let mut wire = Vec::new();
        wire.put_i32(7);
        wire.extend(std::iter::repeat_n(0u8, 7 * 8));
        assert!(matches!(LegacyResponse::decode(&wire), Err(WireError::BadShape(_))));
    }

    #[test]
    fn response_rejects_short_body() {
        let mut wire = Vec::new();
        wire.put_i32(10);
        wire.extend(std::iter::repeat_n(0u8, 9 * 8));
        assert!(matches!(LegacyResponse::decode(&wire), Err(WireError::ShortPayload { .. })));
    }

    #[test]
    fn response_rejects_wrong_width_block() {
        let block = SampleBlock::from_rows(&[vec![0.0, 1.0]]).unwrap();
        assert!(LegacyResponse::from_block(block).is_err());
    }
}
