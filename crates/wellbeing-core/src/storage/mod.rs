pub mod log_store;
pub mod record;

pub use log_store::{CycleRange, LogStore, StorageMedium};
pub use record::{CONFIG_KEY, ConfigRecord, CycleRecord, StoreKey, key_for_time};

/// File name of the cycle log on the device filesystem
pub const DB_FILE: &str = "database.bin";

/// Seconds in the trailing window of the cycles-per-day guard
pub const SECONDS_PER_DAY: u32 = 86_400;
