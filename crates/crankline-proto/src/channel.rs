//! Measurement channel codes.
//!
//! The device exposes 45 scalar measurement channels, indexed `0..=44`.
//! Roughly a third of them have a known physical meaning (per-pedal forces
//! and moments, pedal angle, pedalling speed, power); the rest are
//! auxiliary values the device serves but does not document.

use crate::errors::{Result, WireError};

/// Number of measurement channels the device exposes.
pub const CHANNEL_COUNT: usize = 45;

/// One scalar measurement axis.
///
/// For the left pedal, X points forward when the pedal hangs cable-down,
/// Y points to the left side perpendicular to the chain ring, and Z points
/// up along the long axis of the pedal. The right pedal mirrors Y and Z.
/// Angles are radians; speeds are positive when pedalling forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)] // the axis naming scheme above covers all variants
pub enum Channel {
    FxLeft = 0,
    FyLeft = 1,
    FzLeft = 2,
    MxLeft = 3,
    MyLeft = 4,
    MzLeft = 5,
    Aux6 = 6,
    Aux7 = 7,
    FxRight = 8,
    FyRight = 9,
    FzRight = 10,
    Aux11 = 11,
    Aux12 = 12,
    Aux13 = 13,
    Aux14 = 14,
    Aux15 = 15,
    Aux16 = 16,
    Aux17 = 17,
    PedalAngle = 18,
    DeviceTime = 19,
    Aux20 = 20,
    Aux21 = 21,
    Aux22 = 22,
    Aux23 = 23,
    Aux24 = 24,
    Aux25 = 25,
    Aux26 = 26,
    Aux27 = 27,
    Aux28 = 28,
    Aux29 = 29,
    Aux30 = 30,
    Aux31 = 31,
    Aux32 = 32,
    Aux33 = 33,
    Aux34 = 34,
    PedallingSpeed = 35,
    PowerLeft = 36,
    PowerRight = 37,
    PowerTotal = 38,
    Aux39 = 39,
    Aux40 = 40,
    Aux41 = 41,
    Aux42 = 42,
    Aux43 = 43,
    Aux44 = 44,
}

/// All channels in index order.
const ALL_CHANNELS: [Channel; CHANNEL_COUNT] = [
    Channel::FxLeft,
    Channel::FyLeft,
    Channel::FzLeft,
    Channel::MxLeft,
    Channel::MyLeft,
    Channel::MzLeft,
    Channel::Aux6,
    Channel::Aux7,
    Channel::FxRight,
    Channel::FyRight,
    Channel::FzRight,
    Channel::Aux11,
    Channel::Aux12,
    Channel::Aux13,
    Channel::Aux14,
    Channel::Aux15,
    Channel::Aux16,
    Channel::Aux17,
    Channel::PedalAngle,
    Channel::DeviceTime,
    Channel::Aux20,
    Channel::Aux21,
    Channel::Aux22,
    Channel::Aux23,
    Channel::Aux24,
    Channel::Aux25,
    Channel::Aux26,
    Channel::Aux27,
    Channel::Aux28,
    Channel::Aux29,
    Channel::Aux30,
    Channel::Aux31,
    Channel::Aux32,
    Channel::Aux33,
    Channel::Aux34,
    Channel::PedallingSpeed,
    Channel::PowerLeft,
    Channel::PowerRight,
    Channel::PowerTotal,
    Channel::Aux39,
    Channel::Aux40,
    Channel::Aux41,
    Channel::Aux42,
    Channel::Aux43,
    Channel::Aux44,
];

impl Channel {
    /// Channel index on the wire.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Channel for a wire index, `None` if out of range.
    pub fn from_index(index: u8) -> Option<Self> {
        ALL_CHANNELS.get(index as usize).copied()
    }
}

/// Ordered, deduplicated subset of the channel indices `[0, CHANNEL_COUNT)`.
///
/// The set is kept in ascending index order regardless of construction
/// order; this fixes the column order of projected data frames. An empty
/// set is legal and yields frames carrying only the time column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    indices: Vec<u8>,
}

impl ChannelSet {
    /// Build a set from raw indices.
    ///
    /// Duplicates are dropped; any index `>= CHANNEL_COUNT` is rejected
    /// with [`WireError::BadShape`].
    pub fn new(indices: impl IntoIterator<Item = u8>) -> Result<Self> {
        let mut sorted: Vec<u8> = Vec::new();
        for index in indices {
            if usize::from(index) >= CHANNEL_COUNT {
                return Err(WireError::BadShape(format!(
                    "channel index {index} out of range (max {})",
                    CHANNEL_COUNT - 1
                )));
            }
            sorted.push(index);
        }
        sorted.sort_unstable();
        sorted.dedup();
        Ok(Self { indices: sorted })
    }

    /// Build a set from typed channels.
    pub fn from_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        let mut indices: Vec<u8> = channels.into_iter().map(Channel::index).collect();
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    /// The full set of all 45 channels.
    pub fn all() -> Self {
        Self { indices: (0..CHANNEL_COUNT as u8).collect() }
    }

    /// Number of channels in the set.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True when no channel is selected.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether the set contains the given index.
    pub fn contains(&self, index: u8) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    /// The indices in ascending order.
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self::all()
    }
}
