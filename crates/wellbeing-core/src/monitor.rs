//! The pump monitor context
//!
//! [`PumpMonitor`] is built once at startup and shared (by reference) between
//! the processing loop and the front end. Everything that touches the cycle
//! log or the fault latch goes through its single state mutex, so operator
//! requests and the processing loop never write the store concurrently.

use alloc::vec::Vec;
use core::convert::Infallible;

use chrono::{Datelike, NaiveDateTime, Timelike};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};

use crate::channel::ReadingChannel;
use crate::clock::{self, DateTimeRequest, RealTimeClock};
use crate::detector::{CycleDetector, Transition};
use crate::error::{MonitorError, RequestError, StoreError};
use crate::hardware::SystemReset;
use crate::notifier::{PumpStatus, StatusNotifier, StatusUpdate};
use crate::storage::{ConfigRecord, CycleRecord, LogStore, SECONDS_PER_DAY, StorageMedium};

/// Operator request to change the configuration, as posted by the front end.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    pub max_cycles: Option<u32>,
    pub max_runtime: Option<u32>,
    pub min_current: Option<f32>,
}

impl ConfigRequest {
    pub fn validate(&self) -> Result<ConfigRecord, RequestError> {
        let max_cycles_per_day = self.max_cycles.ok_or(RequestError::MissingField("maxCycles"))?;
        let max_runtime_secs = self
            .max_runtime
            .ok_or(RequestError::MissingField("maxRuntime"))?;
        let min_current_amps = self
            .min_current
            .ok_or(RequestError::MissingField("minCurrent"))?;

        if !min_current_amps.is_finite() || min_current_amps < 0.0 {
            return Err(RequestError::InvalidField("minCurrent"));
        }

        Ok(ConfigRecord {
            max_runtime_secs,
            max_cycles_per_day,
            min_current_amps,
        })
    }
}

/// Configuration as reported to the front end.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub max_runtime: u32,
    pub max_cycles: u32,
    pub min_current: f32,
    /// Clock reading at boot: `[year, month, day, hour, minute, second]`
    pub boot_time: [i32; 6],
}

/// One stored cycle as reported by [`PumpMonitor::logs`].
///
/// Serialized as the array
/// `[daysAgo, year, month, day, hour, minute, second, duration, min, avg, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRow {
    /// Whole days from the end of today back to the cycle start (0 or negative)
    pub days_ago: i32,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub duration_secs: u32,
    pub min_amps: f32,
    pub avg_amps: f32,
    pub max_amps: f32,
}

impl LogRow {
    fn new(record: &CycleRecord, end_of_today: u32) -> Self {
        let start = clock::from_timestamp(record.start_time);
        let days_ago = (i64::from(record.start_time) - i64::from(end_of_today))
            / i64::from(SECONDS_PER_DAY);
        Self {
            days_ago: days_ago as i32,
            year: start.year(),
            month: start.month(),
            day: start.day(),
            hour: start.hour(),
            minute: start.minute(),
            second: start.second(),
            duration_secs: record.duration_secs,
            min_amps: record.min_amps,
            avg_amps: record.avg_amps,
            max_amps: record.max_amps,
        }
    }
}

impl Serialize for LogRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_tuple(11)?;
        row.serialize_element(&self.days_ago)?;
        row.serialize_element(&self.year)?;
        row.serialize_element(&self.month)?;
        row.serialize_element(&self.day)?;
        row.serialize_element(&self.hour)?;
        row.serialize_element(&self.minute)?;
        row.serialize_element(&self.second)?;
        row.serialize_element(&self.duration_secs)?;
        row.serialize_element(&self.min_amps)?;
        row.serialize_element(&self.avg_amps)?;
        row.serialize_element(&self.max_amps)?;
        row.end()
    }
}

/// Everything guarded by the monitor's state mutex.
struct MonitorState<M, C, R, L, S>
where
    M: StorageMedium,
{
    store: LogStore<M>,
    config: ConfigRecord,
    detector: CycleDetector,
    /// Latched until cleared by the operator; not persisted
    fault: bool,
    clock: C,
    relay: R,
    lamp: L,
    system: S,
}

impl<M, C, R, L, S> MonitorState<M, C, R, L, S>
where
    M: StorageMedium,
    C: RealTimeClock,
    R: OutputPin,
    L: OutputPin,
    S: SystemReset,
{
    async fn handle_reading(&mut self, amps: f32) -> Result<Transition, MonitorError> {
        if !self.detector.needs_timestamp(amps, &self.config) {
            return Ok(Transition::Idle);
        }

        let now = clock::to_timestamp(&self.clock.now().await?);
        let config = self.config;
        let transition = self
            .detector
            .on_reading(amps, now, &config, &mut self.store)?;

        match transition {
            Transition::Opened { start_time } => {
                info!(" Pump on at {} ({:.3} A)", start_time, amps);
            }
            Transition::Running {
                elapsed_secs,
                runtime_exceeded: true,
            } => {
                if self.set_fault(true) {
                    warn!(
                        " Runtime limit exceeded: running {}s, limit {}s",
                        elapsed_secs, config.max_runtime_secs
                    );
                }
            }
            Transition::Closed {
                record,
                cycles_in_window,
                cycle_limit_exceeded,
            } => {
                info!(" Pump off: {}", record);
                if cycle_limit_exceeded && self.set_fault(true) {
                    warn!(
                        " Cycle limit exceeded: {} cycles in 24h, limit {}",
                        cycles_in_window, config.max_cycles_per_day
                    );
                }
            }
            _ => {}
        }

        Ok(transition)
    }

    /// Set the latch and drive relay and lamp to match.
    ///
    /// Returns `true` when the latch changed.
    fn set_fault(&mut self, fault: bool) -> bool {
        let changed = self.fault != fault;
        self.fault = fault;
        drive_output(&mut self.relay, fault, "relay");
        drive_output(&mut self.lamp, fault, "lamp");
        changed
    }

    fn status(&self, amps: f32) -> StatusUpdate {
        StatusUpdate {
            status: PumpStatus::from_state(self.detector.is_on(), self.fault),
            amps,
        }
    }
}

fn drive_output<P: OutputPin>(pin: &mut P, active: bool, name: &str) {
    let result = if active { pin.set_high() } else { pin.set_low() };
    if let Err(e) = result {
        error!(" Failed to drive {} {}: {:?}", name, if active { "high" } else { "low" }, e);
    }
}

/// Pump monitor context: cycle log, detector, fault latch, clock and
/// actuator outputs behind one mutex, plus the live status fan-out.
pub struct PumpMonitor<M, C, R, L, S>
where
    M: StorageMedium,
{
    state: AsyncMutex<CriticalSectionRawMutex, MonitorState<M, C, R, L, S>>,
    notifier: StatusNotifier,
    boot_time: NaiveDateTime,
}

impl<M, C, R, L, S> PumpMonitor<M, C, R, L, S>
where
    M: StorageMedium,
    C: RealTimeClock,
    R: OutputPin,
    L: OutputPin,
    S: SystemReset,
{
    /// Open the cycle log, load or create the configuration and release the
    /// relay and lamp.
    pub async fn boot(
        medium: M,
        mut clock: C,
        relay: R,
        lamp: L,
        system: S,
    ) -> Result<Self, MonitorError> {
        let mut store = LogStore::open(medium)?;

        let config = match store.config() {
            Some(config) => config,
            None => {
                let config = ConfigRecord::default();
                store.set_config(&config)?;
                info!(" No stored configuration, wrote defaults");
                config
            }
        };
        info!(" {}", config);

        let boot_time = clock.now().await?;

        let mut state = MonitorState {
            store,
            config,
            detector: CycleDetector::new(),
            fault: false,
            clock,
            relay,
            lamp,
            system,
        };
        state.set_fault(false);

        Ok(Self {
            state: AsyncMutex::new(state),
            notifier: StatusNotifier::new(),
            boot_time,
        })
    }

    /// Process readings from `channel` forever.
    ///
    /// A reading that fails for any other reason is logged and skipped. Only
    /// returns when the cycle log fails; the caller is expected to restart.
    pub async fn run<const N: usize, D: DelayNs>(
        &self,
        channel: &ReadingChannel<N>,
        delay: &mut D,
    ) -> StoreError {
        info!(" Processing readings");
        loop {
            let amps = channel.pop(delay).await;
            match self.process_reading(amps).await {
                Ok(_) => {}
                Err(MonitorError::Store(e)) => {
                    error!(" Failed to store cycle: {}", e);
                    return e;
                }
                Err(e) => warn!(" Skipping {:.3} A reading: {}", amps, e),
            }
        }
    }

    /// Broadcast the status for `amps`, then run it through the detector and
    /// its safety guards.
    ///
    /// The broadcast status reflects the state before this reading is applied.
    pub async fn process_reading(&self, amps: f32) -> Result<Transition, MonitorError> {
        let (update, result) = {
            let mut state = self.state.lock().await;
            let update = state.status(amps);
            (update, state.handle_reading(amps).await)
        };
        self.notifier.broadcast(&update).await;
        result
    }

    pub fn notifier(&self) -> &StatusNotifier {
        &self.notifier
    }

    pub fn boot_time(&self) -> NaiveDateTime {
        self.boot_time
    }

    pub async fn config(&self) -> ConfigView {
        let config = self.state.lock().await.config;
        let boot = self.boot_time;
        ConfigView {
            max_runtime: config.max_runtime_secs,
            max_cycles: config.max_cycles_per_day,
            min_current: config.min_current_amps,
            boot_time: [
                boot.year(),
                boot.month() as i32,
                boot.day() as i32,
                boot.hour() as i32,
                boot.minute() as i32,
                boot.second() as i32,
            ],
        }
    }

    /// Validate and persist a new configuration. Takes effect on the next
    /// reading.
    pub async fn set_config(&self, request: &ConfigRequest) -> Result<ConfigRecord, MonitorError> {
        let config = request.validate()?;
        let mut state = self.state.lock().await;
        state.store.set_config(&config)?;
        state.config = config;
        info!(" Configuration updated: {}", config);
        Ok(config)
    }

    /// Cycles that started within the last `days` days, counted back from
    /// 23:59:59 today, oldest first.
    pub async fn logs(&self, days: u32) -> Result<Vec<LogRow>, MonitorError> {
        let mut state = self.state.lock().await;
        let today = state.clock.now().await?;
        let end_of_today = clock::to_timestamp(&clock::end_of_day(&today));
        let from = end_of_today.saturating_sub(days.saturating_mul(SECONDS_PER_DAY));

        Ok(state
            .store
            .range_from(from)
            .map(|record| LogRow::new(&record, end_of_today))
            .collect())
    }

    /// Operator override of the fault latch. Clearing it releases the relay
    /// and lamp.
    pub async fn set_fault(&self, fault: bool) {
        let mut state = self.state.lock().await;
        if state.set_fault(fault) {
            info!(" Fault {} by operator", if fault { "set" } else { "cleared" });
        }
    }

    pub async fn fault(&self) -> bool {
        self.state.lock().await.fault
    }

    pub async fn is_on(&self) -> bool {
        self.state.lock().await.detector.is_on()
    }

    /// Stored cycles in the log.
    pub async fn cycle_count(&self) -> usize {
        self.state.lock().await.store.cycle_count()
    }

    pub async fn set_date_time(&self, request: &DateTimeRequest) -> Result<(), MonitorError> {
        let (time, weekday) = request.validate()?;
        let mut state = self.state.lock().await;
        state.clock.set(time, weekday).await?;
        info!(" Clock set to {}", time);
        Ok(())
    }

    /// Factory reset: delete the cycle log and configuration, then restart.
    ///
    /// Only returns if the backing store could not be deleted.
    pub async fn reset(&self) -> Result<Infallible, MonitorError> {
        let mut state = self.state.lock().await;
        warn!(" Factory reset: deleting cycle log and restarting");
        state.store.destroy()?;
        state.system.hard_reset()
    }
}
