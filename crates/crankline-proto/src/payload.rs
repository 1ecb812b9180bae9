//! JSON payloads carried by control frames.
//!
//! Control payloads are UTF-8 JSON on the wire. Unknown keys are ignored on
//! decode so newer peers can talk to older ones; all fields of
//! [`SetConfig`] are optional and only supplied fields are applied.

use serde::{Deserialize, Serialize};

use crate::{
    channel::ChannelSet,
    errors::{Result, WireError},
};

/// `SET_CONFIG` command payload.
///
/// Every field is optional; the emulator applies only the fields that are
/// present and keeps its current value for the rest. `udp_port` tells the
/// emulator where to stream data frames (paired with the IP of the control
/// connection's peer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetConfig {
    /// Sampling frequency in Hz (positive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,

    /// Samples per emitted block (positive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples_per_block: Option<u16>,

    /// Channel indices to stream, each in `[0, 44]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<u8>>,

    /// Datagram port on the client side, in `[1, 65535]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp_port: Option<u16>,
}

impl SetConfig {
    /// Check value ranges beyond what the JSON types enforce.
    pub fn validate(&self) -> Result<()> {
        if self.frequency == Some(0) {
            return Err(WireError::BadShape("frequency must be positive".into()));
        }
        if self.samples_per_block == Some(0) {
            return Err(WireError::BadShape("samples_per_block must be positive".into()));
        }
        if self.udp_port == Some(0) {
            return Err(WireError::BadShape("udp_port must be non-zero".into()));
        }
        if let Some(channels) = &self.channels {
            ChannelSet::new(channels.iter().copied())?;
        }
        Ok(())
    }
}

/// `GET_STATUS` acknowledgement payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Whether the streamer is currently emitting frames.
    pub is_streaming: bool,
    /// Configured sampling frequency in Hz.
    pub frequency: u32,
    /// Configured samples per block.
    pub samples_per_block: u16,
    /// Configured channel indices in ascending order.
    pub channels: Vec<u8>,
    /// Sequence id of the last emitted data frame (0 before the first).
    pub sequence_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_ignored() {
        let parsed: SetConfig =
            serde_json::from_str(r#"{"frequency":100,"sample_window":10,"color":"red"}"#).unwrap();
        assert_eq!(parsed.frequency, Some(100));
        assert_eq!(parsed.samples_per_block, None);
    }

    #[test]
    fn absent_fields_stay_off_the_wire() {
        let config = SetConfig { frequency: Some(50), ..SetConfig::default() };
        assert_eq!(serde_json::to_string(&config).unwrap(), r#"{"frequency":50}"#);
    }

    #[test]
    fn validate_rejects_zero_frequency() {
        let config = SetConfig { frequency: Some(0), ..SetConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_channel() {
        let config = SetConfig { channels: Some(vec![0, 45]), ..SetConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn status_report_round_trip() {
        let report = StatusReport {
            is_streaming: true,
            frequency: 50,
            samples_per_block: 10,
            channels: vec![0, 1, 2],
            sequence_id: 17,
        };
        let json = serde_json::to_vec(&report).unwrap();
        let parsed: StatusReport = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
