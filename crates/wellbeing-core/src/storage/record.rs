//! Fixed-width binary records kept in the cycle log.
//!
//! All multi-byte fields are big-endian so that encoded timestamp keys sort
//! lexicographically in chronological order:
//!
//! - Key: 4 bytes (u32 seconds since epoch of the cycle start, or the
//!   reserved all-zero configuration key)
//! - CycleRecord: 20 bytes
//! - ConfigRecord: 12 bytes

use core::fmt::Display;

/// Encoded store key
pub type StoreKey = [u8; 4];

/// Reserved key of the configuration record. No valid cycle starts at 0.
pub const CONFIG_KEY: StoreKey = [0; 4];

/// Initial value of `min_amps` before any sample is folded in
pub const MIN_AMPS_SENTINEL: f32 = 999_999.0;

/// Initial value of `max_amps` before any sample is folded in
pub const MAX_AMPS_SENTINEL: f32 = 0.0;

/// Encodes a timestamp as a store key.
pub const fn key_for_time(timestamp: u32) -> StoreKey {
    timestamp.to_be_bytes()
}

/// One completed pump run.
///
/// Binary format (big-endian):
/// - start_time: 4 bytes (u32)
/// - duration_secs: 4 bytes (u32)
/// - min_amps: 4 bytes (f32)
/// - avg_amps: 4 bytes (f32)
/// - max_amps: 4 bytes (f32)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleRecord {
    /// Seconds since epoch when the current first exceeded the threshold
    pub start_time: u32,
    /// Seconds since epoch when the current dropped back to the threshold
    pub end_time: u32,
    pub duration_secs: u32,
    pub min_amps: f32,
    pub avg_amps: f32,
    pub max_amps: f32,
}

impl CycleRecord {
    pub const ENCODED_LEN: usize = 20;

    /// Store key of this record.
    pub const fn key(&self) -> StoreKey {
        key_for_time(self.start_time)
    }

    /// Converts the record to its stored byte layout.
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        bytes[0..4].copy_from_slice(&self.start_time.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.duration_secs.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.min_amps.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.avg_amps.to_be_bytes());
        bytes[16..20].copy_from_slice(&self.max_amps.to_be_bytes());
        bytes
    }

    /// Decodes a stored record. The end time is derived from the duration.
    pub fn from_bytes(bytes: &[u8; Self::ENCODED_LEN]) -> Self {
        let start_time = be_u32(bytes, 0);
        let duration_secs = be_u32(bytes, 4);
        Self {
            start_time,
            end_time: start_time.saturating_add(duration_secs),
            duration_secs,
            min_amps: be_f32(bytes, 8),
            avg_amps: be_f32(bytes, 12),
            max_amps: be_f32(bytes, 16),
        }
    }
}

impl Display for CycleRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[Cycle] start: {}, duration: {}s, min: {:.3} A, avg: {:.3} A, max: {:.3} A",
            self.start_time, self.duration_secs, self.min_amps, self.avg_amps, self.max_amps
        )
    }
}

/// Safety limits and the on/off threshold.
///
/// Binary format (big-endian):
/// - max_runtime_secs: 4 bytes (u32)
/// - max_cycles_per_day: 4 bytes (u32)
/// - min_current_amps: 4 bytes (f32)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigRecord {
    /// Longest a single run may last before the fault latches
    pub max_runtime_secs: u32,
    /// Most runs allowed in any trailing 24 hours
    pub max_cycles_per_day: u32,
    /// Readings above this are "pump on"
    pub min_current_amps: f32,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            max_runtime_secs: 8 * 60,
            max_cycles_per_day: 360,
            min_current_amps: 0.25,
        }
    }
}

impl ConfigRecord {
    pub const ENCODED_LEN: usize = 12;

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        bytes[0..4].copy_from_slice(&self.max_runtime_secs.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.max_cycles_per_day.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.min_current_amps.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; Self::ENCODED_LEN]) -> Self {
        Self {
            max_runtime_secs: be_u32(bytes, 0),
            max_cycles_per_day: be_u32(bytes, 4),
            min_current_amps: be_f32(bytes, 8),
        }
    }
}

impl Display for ConfigRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[Config] max runtime: {}s, max cycles/day: {}, on threshold: {:.3} A",
            self.max_runtime_secs, self.max_cycles_per_day, self.min_current_amps
        )
    }
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(word)
}

fn be_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_bits(be_u32(bytes, offset))
}
