use alloc::collections::BTreeMap;
use alloc::collections::btree_map;
use alloc::vec::Vec;

use log::{debug, info, warn};

use super::record::{CONFIG_KEY, ConfigRecord, CycleRecord, StoreKey, key_for_time};
use crate::error::{MediumError, StoreError};

/// Bytes in a journal frame header: 4-byte key + 1-byte value length
const FRAME_HEADER_LEN: usize = 5;

/// Byte-level persistence behind the [`LogStore`].
///
/// The device backs this with a single file. Implementations must make
/// `sync` durable: once it returns, appended bytes survive a power cut.
pub trait StorageMedium {
    /// Appends the complete stored image to `buf`. A store that does not
    /// exist yet reads as empty.
    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<(), MediumError>;

    /// Appends bytes to the end of the stored image.
    fn append(&mut self, bytes: &[u8]) -> Result<(), MediumError>;

    /// Flushes everything written so far to durable storage.
    fn sync(&mut self) -> Result<(), MediumError>;

    /// Replaces the whole stored image.
    fn replace(&mut self, bytes: &[u8]) -> Result<(), MediumError>;

    /// Closes and deletes the backing store.
    fn destroy(&mut self) -> Result<(), MediumError>;
}

/// Time-ordered store of completed cycles plus the configuration record.
///
/// The sorted map lives in RAM; the medium holds an append-only journal of
/// frames `[key: 4][len: 1][value: len]`. Replaying the journal front to back
/// rebuilds the map, the last frame for a key winning. Keys are big-endian
/// timestamps so map order is chronological order.
///
/// Keys assume the clock never moves backwards: a cycle recorded after the
/// clock was rewound sorts before newer cycles and shifts range scans.
pub struct LogStore<M: StorageMedium> {
    medium: M,
    entries: BTreeMap<StoreKey, Vec<u8>>,
}

/// Result of replaying a journal image
struct Replay {
    entries: BTreeMap<StoreKey, Vec<u8>>,
    frames: usize,
    torn: bool,
}

impl<M: StorageMedium> LogStore<M> {
    /// Open the store, replaying and if needed compacting the journal.
    pub fn open(mut medium: M) -> Result<Self, StoreError> {
        let mut image = Vec::new();
        medium.read_all(&mut image)?;

        let replay = replay_journal(&image);
        let mut store = Self {
            medium,
            entries: replay.entries,
        };

        if replay.torn || replay.frames != store.entries.len() {
            info!(
                " Compacting cycle log: {} frames -> {} entries",
                replay.frames,
                store.entries.len()
            );
            store.compact()?;
        }

        info!(" Opened cycle log with {} cycles", store.cycle_count());
        Ok(store)
    }

    /// Upsert a completed cycle and flush it before returning.
    pub fn put(&mut self, record: &CycleRecord) -> Result<(), StoreError> {
        let key = record.key();
        if key == CONFIG_KEY {
            return Err(StoreError::ReservedKey);
        }
        self.write_durable(key, &record.to_bytes())?;
        debug!(" Stored {}", record);
        Ok(())
    }

    /// Cycles whose start time is at or after `timestamp`, oldest first.
    ///
    /// The sequence is lazy and can be restarted by cloning it before use.
    pub fn range_from(&self, timestamp: u32) -> CycleRange<'_> {
        // Skip the configuration record at key 0.
        let start = key_for_time(timestamp.max(1));
        CycleRange {
            inner: self.entries.range(start..),
        }
    }

    /// Number of stored cycles.
    pub fn cycle_count(&self) -> usize {
        self.entries.len() - usize::from(self.entries.contains_key(&CONFIG_KEY))
    }

    /// The stored configuration, if one was ever written.
    pub fn config(&self) -> Option<ConfigRecord> {
        let value = self.entries.get(&CONFIG_KEY)?;
        let bytes: &[u8; ConfigRecord::ENCODED_LEN] = value.as_slice().try_into().ok()?;
        Some(ConfigRecord::from_bytes(bytes))
    }

    /// Overwrite the configuration record and flush it before returning.
    pub fn set_config(&mut self, config: &ConfigRecord) -> Result<(), StoreError> {
        self.write_durable(CONFIG_KEY, &config.to_bytes())
    }

    /// Close and delete the backing store, then clear the in-memory map.
    ///
    /// If the medium cannot be deleted the map is left as is, so the store
    /// keeps answering from what is still on disk.
    pub fn destroy(&mut self) -> Result<(), StoreError> {
        self.medium.destroy()?;
        self.entries.clear();
        Ok(())
    }

    fn write_durable(&mut self, key: StoreKey, value: &[u8]) -> Result<(), StoreError> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + value.len());
        push_frame(&mut frame, &key, value);

        self.medium.append(&frame)?;
        self.medium.sync()?;

        self.entries.insert(key, value.to_vec());
        Ok(())
    }

    /// Rewrite the journal with one frame per live key.
    fn compact(&mut self) -> Result<(), StoreError> {
        let mut image = Vec::new();
        for (key, value) in &self.entries {
            push_frame(&mut image, key, value);
        }
        self.medium.replace(&image)?;
        self.medium.sync()?;
        Ok(())
    }
}

/// Ascending sequence of stored cycles, see [`LogStore::range_from`].
#[derive(Clone)]
pub struct CycleRange<'a> {
    inner: btree_map::Range<'a, StoreKey, Vec<u8>>,
}

impl Iterator for CycleRange<'_> {
    type Item = CycleRecord;

    fn next(&mut self) -> Option<Self::Item> {
        for (_, value) in self.inner.by_ref() {
            if let Ok(bytes) = <&[u8; CycleRecord::ENCODED_LEN]>::try_from(value.as_slice()) {
                return Some(CycleRecord::from_bytes(bytes));
            }
        }
        None
    }
}

const fn value_len_for(key: &StoreKey) -> usize {
    if u32::from_be_bytes(*key) == 0 {
        ConfigRecord::ENCODED_LEN
    } else {
        CycleRecord::ENCODED_LEN
    }
}

fn push_frame(buf: &mut Vec<u8>, key: &StoreKey, value: &[u8]) {
    buf.extend_from_slice(key);
    // Values are fixed-width records well below 256 bytes.
    buf.push(value.len() as u8);
    buf.extend_from_slice(value);
}

fn replay_journal(image: &[u8]) -> Replay {
    let mut entries = BTreeMap::new();
    let mut frames = 0;
    let mut offset = 0;
    let mut torn = false;

    while offset < image.len() {
        if image.len() - offset < FRAME_HEADER_LEN {
            torn = true;
            break;
        }

        let mut key: StoreKey = [0; 4];
        key.copy_from_slice(&image[offset..offset + 4]);
        let len = usize::from(image[offset + 4]);
        let end = offset + FRAME_HEADER_LEN + len;

        if end > image.len() {
            torn = true;
            break;
        }

        frames += 1;
        if len == value_len_for(&key) {
            entries.insert(key, image[offset + FRAME_HEADER_LEN..end].to_vec());
        } else {
            warn!(
                " Skipping cycle log frame at offset {}: {} byte value for key {:?}",
                offset, len, key
            );
        }
        offset = end;
    }

    if torn {
        warn!(
            " Discarding {} bytes of torn cycle log frame at offset {}",
            image.len() - offset,
            offset
        );
    }

    Replay {
        entries,
        frames,
        torn,
    }
}
