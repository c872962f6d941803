//! Host stand-ins for the device peripherals

use std::convert::Infallible;
use std::f64::consts::{PI, SQRT_2};
use std::process;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, TimeDelta};
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use wellbeing_core::{AlertAdc, Calibration, ClockError, RealTimeClock, SystemReset, Watchdog};

/// Conversions per second, matching the device ADC data rate
pub const SAMPLE_RATE_HZ: u32 = 250;

/// Exit code of a requested restart
pub const RESTART_EXIT_CODE: u8 = 3;

/// Exit code when the watchdog expires
pub const WATCHDOG_EXIT_CODE: u8 = 4;

const LINE_HZ: f64 = 60.0;
const RUN_SECS: f64 = 45.0;
const REST_SECS: f64 = 135.0;
const RUN_AMPS: f64 = 4.2;
const IDLE_AMPS: f64 = 0.05;

/// ADC fed by a synthetic 60 Hz current waveform.
///
/// The pump runs for 45 s and rests for 135 s; `speed` divides both.
pub struct SimulatedAdc {
    sample: u64,
    speed: f64,
    calibration: Calibration,
    converting: bool,
}

impl SimulatedAdc {
    pub fn new(speed: f64) -> Self {
        Self {
            sample: 0,
            speed,
            calibration: Calibration::DEFAULT,
            converting: false,
        }
    }

    fn rms_amps_at(&self, t: f64) -> f64 {
        let period = (RUN_SECS + REST_SECS) / self.speed;
        if t % period < RUN_SECS / self.speed {
            RUN_AMPS
        } else {
            IDLE_AMPS
        }
    }

    fn code_for(&self, rms_amps: f64) -> f64 {
        rms_amps * self.calibration.divisor as f64 * 1000.0 / self.calibration.factor_milli as f64
    }
}

impl AlertAdc for SimulatedAdc {
    type Error = Infallible;

    fn start_conversions(&mut self) -> Result<(), Infallible> {
        self.converting = true;
        Ok(())
    }

    fn stop_conversions(&mut self) {
        self.converting = false;
    }

    fn read_alert(&mut self) -> Result<i16, Infallible> {
        let t = self.sample as f64 / f64::from(SAMPLE_RATE_HZ);
        self.sample += 1;
        if !self.converting {
            return Ok(0);
        }
        let peak = self.code_for(self.rms_amps_at(t)) * SQRT_2;
        Ok((peak * (2.0 * PI * LINE_HZ * t).sin()).round() as i16)
    }
}

/// Host time shifted by whatever the operator last set.
pub struct HostClock {
    offset: TimeDelta,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            offset: TimeDelta::zero(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RealTimeClock for HostClock {
    async fn now(&mut self) -> Result<NaiveDateTime, ClockError> {
        Ok(Local::now().naive_local() + self.offset)
    }

    async fn set(&mut self, time: NaiveDateTime, weekday: u8) -> Result<(), ClockError> {
        self.offset = time - Local::now().naive_local();
        info!(" Clock now {} (weekday {})", time, weekday);
        Ok(())
    }
}

/// Output pin that logs its level changes.
pub struct LoggedPin {
    name: &'static str,
    gpio: u8,
    level: Option<bool>,
}

impl LoggedPin {
    pub fn new(name: &'static str, gpio: u8) -> Self {
        Self {
            name,
            gpio,
            level: None,
        }
    }

    pub fn is_high(&self) -> bool {
        self.level == Some(true)
    }

    fn drive(&mut self, high: bool) {
        if self.level != Some(high) {
            info!(
                " GPIO{} ({}) {}",
                self.gpio,
                self.name,
                if high { "high" } else { "low" }
            );
        }
        self.level = Some(high);
    }
}

impl ErrorType for LoggedPin {
    type Error = Infallible;
}

impl OutputPin for LoggedPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.drive(true);
        Ok(())
    }
}

/// Restart by exiting; the supervising shell starts the process again.
pub struct ProcessReset;

impl SystemReset for ProcessReset {
    fn hard_reset(&mut self) -> ! {
        warn!(" Restarting");
        log::logger().flush();
        process::exit(i32::from(RESTART_EXIT_CODE))
    }
}

/// Watchdog backed by a supervisor thread that ends the process when the
/// interrupt path stops feeding it.
#[derive(Clone)]
pub struct HostWatchdog {
    last_feed: Arc<Mutex<Instant>>,
}

impl HostWatchdog {
    pub fn start(timeout: Duration) -> Self {
        let watchdog = Self {
            last_feed: Arc::new(Mutex::new(Instant::now())),
        };
        let supervised = watchdog.clone();
        thread::spawn(move || {
            loop {
                thread::sleep(Duration::from_secs(1));
                let starved = supervised.since_last_feed();
                if starved > timeout {
                    error!(" Watchdog expired after {:?} without a feed", starved);
                    log::logger().flush();
                    process::exit(i32::from(WATCHDOG_EXIT_CODE));
                }
            }
        });
        watchdog
    }

    fn since_last_feed(&self) -> Duration {
        self.last_feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

impl Watchdog for HostWatchdog {
    fn feed(&mut self) {
        *self.last_feed.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }
}

/// [`DelayNs`] that parks the calling thread.
pub struct ThreadDelay;

impl DelayNs for ThreadDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}
