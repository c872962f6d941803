//! Hardware-independent core library for the wellbeing pump runtime monitor
//!
//! This crate contains all platform-agnostic logic of the device: turning
//! current-sensor interrupts into calibrated readings, handing them from
//! interrupt context to the processing loop, detecting pump run cycles and
//! their safety limits, and keeping the binary time-indexed cycle log.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).
//!
//! ```text
//! SignalAcquirer (interrupt) -> ReadingChannel -> PumpMonitor::run
//!                                                   |-> CycleDetector -> LogStore
//!                                                   |-> StatusNotifier
//!                                                   `-> relay / lamp on fault
//! ```

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod acquisition;
pub mod channel;
pub mod clock;
pub mod detector;
pub mod error;
pub mod hardware;
pub mod monitor;
pub mod notifier;
pub mod storage;

#[cfg(test)]
mod testing;

pub use acquisition::{Calibration, SignalAcquirer};
pub use channel::{READING_QUEUE_DEPTH, ReadingChannel};
pub use clock::{DateTimeRequest, RealTimeClock};
pub use detector::{CycleDetector, Transition};
pub use error::{ClockError, MediumError, MonitorError, ObserverError, RequestError, StoreError};
pub use hardware::{AlertAdc, SystemReset, Watchdog};
pub use monitor::{ConfigRequest, ConfigView, LogRow, PumpMonitor};
pub use notifier::{ObserverId, PumpStatus, StatusNotifier, StatusObserver, StatusUpdate};
pub use storage::{ConfigRecord, CycleRecord, LogStore, StorageMedium};

/// Rounds a non-negative value to 3 decimal places (milli-units).
///
/// `f64::round` is not available in `core`, so this works on the scaled value.
pub(crate) fn round_milli(value: f64) -> f64 {
    if value < 0.0 {
        return -round_milli(-value);
    }
    let scaled = (value * 1000.0 + 0.5) as u64;
    scaled as f64 / 1000.0
}
