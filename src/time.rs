//! # Time Grid
//!
//! A timestamp (whole milliseconds) decomposes uniquely into a `(block, slot)`
//! coordinate given two configured constants: `resolution` R and `block_size` B,
//! with the invariant `B % R == 0` and `S = B / R` slots per block.

use std::time::{SystemTime, UNIX_EPOCH};

/// Common time constants, expressed in milliseconds.
pub struct Time;

impl Time {
    pub const SECOND: u64 = 1_000;
    pub const MINUTE: u64 = 60 * Self::SECOND;
    pub const HOUR: u64 = 60 * Self::MINUTE;
    pub const DAY: u64 = 24 * Self::HOUR;
    pub const WEEK: u64 = 7 * Self::DAY;
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as u64
}

/// A `(block, slot)` coordinate on the time grid defined by `block_size`/`resolution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockSlot {
    pub block: u64,
    pub slot: u64,
}

impl BlockSlot {
    /// Decomposes `timestamp` into its `(block, slot)` coordinate.
    pub fn from_timestamp(timestamp: u64, block_size: u64, resolution: u64) -> Self {
        Self {
            block: timestamp / block_size,
            slot: (timestamp % block_size) / resolution,
        }
    }

    /// Reconstructs the timestamp (the start of this slot) this coordinate represents.
    pub fn to_timestamp(self, block_size: u64, resolution: u64) -> u64 {
        self.block * block_size + self.slot * resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_timestamp() {
        // R=1s, B=10s
        let coord = BlockSlot::from_timestamp(15_000, 10_000, 1_000);
        assert_eq!(coord, BlockSlot { block: 1, slot: 5 });
    }

    #[test]
    fn roundtrips_on_slot_boundaries() {
        let coord = BlockSlot::from_timestamp(40_000, 10_000, 1_000);
        assert_eq!(coord.to_timestamp(10_000, 1_000), 40_000);
    }

    #[test]
    fn ordering_matches_timestamp_ordering() {
        let a = BlockSlot::from_timestamp(10_000, 10_000, 1_000);
        let b = BlockSlot::from_timestamp(15_000, 10_000, 1_000);
        assert!(a < b);
    }
}
