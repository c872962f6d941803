//! Pump run-cycle detection
//!
//! Two states, `OFF` and `ON`, switched by comparing each reading against the
//! configured on-threshold. While `ON` an open cycle aggregates min/avg/max
//! current; when the current drops back the cycle is finalized and stored.
//!
//! Readings are folded into the aggregate one reading late. The reading that
//! switches the pump on is never folded, and the reading just before the
//! switch-off is never folded either, so partially sampled windows at both
//! edges stay out of the record. A run that is above the threshold for only
//! one reading therefore stores zero samples: `avg_amps` is 0 and min/max keep
//! their sentinel values.

use crate::round_milli;
use crate::storage::record::{MAX_AMPS_SENTINEL, MIN_AMPS_SENTINEL};
use crate::storage::{ConfigRecord, CycleRecord, LogStore, SECONDS_PER_DAY, StorageMedium};
use crate::error::StoreError;

/// Running aggregate of the cycle currently in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleAccumulator {
    pub start_time: u32,
    sum: f64,
    count: u32,
    min_amps: f32,
    max_amps: f32,
}

impl CycleAccumulator {
    pub fn new(start_time: u32) -> Self {
        Self {
            start_time,
            sum: 0.0,
            count: 0,
            min_amps: MIN_AMPS_SENTINEL,
            max_amps: MAX_AMPS_SENTINEL,
        }
    }

    /// Fold one reading into the aggregate.
    pub fn fold(&mut self, amps: f32) {
        self.sum += f64::from(amps);
        self.count += 1;
        self.min_amps = self.min_amps.min(amps);
        self.max_amps = self.max_amps.max(amps);
    }

    /// Close the aggregate at `end_time`.
    pub fn finish(&self, end_time: u32) -> CycleRecord {
        let avg_amps = if self.count == 0 {
            0.0
        } else {
            round_milli(self.sum / f64::from(self.count)) as f32
        };
        CycleRecord {
            start_time: self.start_time,
            end_time,
            duration_secs: end_time.saturating_sub(self.start_time),
            min_amps: self.min_amps,
            avg_amps,
            max_amps: self.max_amps,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenCycle {
    record: CycleAccumulator,
    /// Latest above-threshold reading, folded once the next one confirms it
    last_unlogged: Option<f32>,
}

/// What a reading did to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Pump stayed off
    Idle,
    /// Pump switched on; a new cycle is open
    Opened { start_time: u32 },
    /// Pump still on
    Running {
        elapsed_secs: u32,
        runtime_exceeded: bool,
    },
    /// Pump switched off; the cycle was finalized and stored
    Closed {
        record: CycleRecord,
        cycles_in_window: usize,
        cycle_limit_exceeded: bool,
    },
}

/// The on/off state machine.
///
/// `ON` is represented by the presence of the open cycle, so the state and the
/// open record cannot disagree.
#[derive(Debug, Default)]
pub struct CycleDetector {
    open: Option<OpenCycle>,
}

impl CycleDetector {
    pub const fn new() -> Self {
        Self { open: None }
    }

    pub fn is_on(&self) -> bool {
        self.open.is_some()
    }

    /// The cycle in progress, present exactly when the pump is on.
    pub fn open_record(&self) -> Option<&CycleAccumulator> {
        self.open.as_ref().map(|open| &open.record)
    }

    pub fn last_unlogged(&self) -> Option<f32> {
        self.open.and_then(|open| open.last_unlogged)
    }

    /// Whether handling `amps` needs the current time. Only a reading that
    /// leaves the pump off does not.
    pub fn needs_timestamp(&self, amps: f32, config: &ConfigRecord) -> bool {
        self.is_on() || amps > config.min_current_amps
    }

    /// Apply one reading taken at `now`.
    ///
    /// A closing cycle is stored before the cycles-per-day guard counts the
    /// trailing window, so the new cycle counts towards its own limit.
    pub fn on_reading<M: StorageMedium>(
        &mut self,
        amps: f32,
        now: u32,
        config: &ConfigRecord,
        store: &mut LogStore<M>,
    ) -> Result<Transition, StoreError> {
        let above = amps > config.min_current_amps;

        let Some(open) = self.open.as_mut() else {
            if !above {
                return Ok(Transition::Idle);
            }
            self.open = Some(OpenCycle {
                record: CycleAccumulator::new(now),
                last_unlogged: None,
            });
            return Ok(Transition::Opened { start_time: now });
        };

        if above {
            if let Some(previous) = open.last_unlogged.filter(|&a| a > 0.0) {
                open.record.fold(previous);
            }
            open.last_unlogged = Some(amps);

            let elapsed_secs = now.saturating_sub(open.record.start_time);
            return Ok(Transition::Running {
                elapsed_secs,
                runtime_exceeded: elapsed_secs > config.max_runtime_secs,
            });
        }

        let record = open.record.finish(now);
        self.open = None;
        store.put(&record)?;

        let cycles_in_window = cycles_in_trailing_day(store, record.end_time);
        Ok(Transition::Closed {
            record,
            cycles_in_window,
            cycle_limit_exceeded: cycles_in_window > config.max_cycles_per_day as usize,
        })
    }
}

/// Stored cycles that started in `(end_time - 24h, end_time]`.
pub fn cycles_in_trailing_day<M: StorageMedium>(store: &LogStore<M>, end_time: u32) -> usize {
    store
        .range_from(end_time.saturating_sub(SECONDS_PER_DAY - 1))
        .take_while(|record| record.start_time <= end_time)
        .count()
}
