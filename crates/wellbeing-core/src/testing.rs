//! Host-side doubles for the hardware and storage seams

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use chrono::NaiveDateTime;
use embedded_hal::digital::{ErrorType, OutputPin};

use crate::clock::{self, RealTimeClock};
use crate::error::{ClockError, MediumError, ObserverError};
use crate::hardware::{AlertAdc, SystemReset, Watchdog};
use crate::notifier::{StatusObserver, StatusUpdate};
use crate::storage::StorageMedium;

#[derive(Default)]
struct MediumState {
    image: Vec<u8>,
    syncs: u32,
    destroyed: bool,
    fail_writes: bool,
    fail_destroy: bool,
}

/// In-memory medium. Clones share the same image, so a test can keep a
/// handle after moving one into a store.
#[derive(Clone, Default)]
pub struct MockMedium {
    state: Arc<Mutex<MediumState>>,
}

impl MockMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> Vec<u8> {
        self.state.lock().unwrap().image.clone()
    }

    pub fn set_image(&self, image: &[u8]) {
        self.state.lock().unwrap().image = image.to_vec();
    }

    pub fn sync_count(&self) -> u32 {
        self.state.lock().unwrap().syncs
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn fail_destroy(&self, fail: bool) {
        self.state.lock().unwrap().fail_destroy = fail;
    }
}

impl StorageMedium for MockMedium {
    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<(), MediumError> {
        buf.extend_from_slice(&self.state.lock().unwrap().image);
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), MediumError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(MediumError::Write);
        }
        state.image.extend_from_slice(bytes);
        Ok(())
    }

    fn sync(&mut self) -> Result<(), MediumError> {
        self.state.lock().unwrap().syncs += 1;
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> Result<(), MediumError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(MediumError::Write);
        }
        state.image = bytes.to_vec();
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), MediumError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_destroy {
            return Err(MediumError::Remove);
        }
        state.image.clear();
        state.destroyed = true;
        Ok(())
    }
}

/// ADC whose every conversion returns the same code.
#[derive(Clone)]
pub struct MockAdc {
    code: i16,
    converting: Arc<AtomicBool>,
    failures: Arc<AtomicU32>,
}

impl MockAdc {
    pub fn constant(code: i16) -> Self {
        Self {
            code,
            converting: Arc::new(AtomicBool::new(false)),
            failures: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn is_converting(&self) -> bool {
        self.converting.load(Ordering::SeqCst)
    }
}

impl AlertAdc for MockAdc {
    type Error = ();

    fn start_conversions(&mut self) -> Result<(), ()> {
        self.converting.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_conversions(&mut self) {
        self.converting.store(false, Ordering::SeqCst);
    }

    fn read_alert(&mut self) -> Result<i16, ()> {
        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(());
        }
        Ok(self.code)
    }
}

#[derive(Clone, Default)]
pub struct MockWatchdog {
    feeds: Arc<AtomicU32>,
}

impl MockWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feeds(&self) -> u32 {
        self.feeds.load(Ordering::SeqCst)
    }
}

impl Watchdog for MockWatchdog {
    fn feed(&mut self) {
        self.feeds.fetch_add(1, Ordering::SeqCst);
    }
}

/// Observer that keeps every update it receives.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    received: Arc<Mutex<Vec<StatusUpdate>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<StatusUpdate> {
        self.received.lock().unwrap().clone()
    }
}

impl StatusObserver for RecordingObserver {
    fn deliver(&mut self, update: &StatusUpdate) -> Result<(), ObserverError> {
        self.received.lock().unwrap().push(*update);
        Ok(())
    }
}

/// Clock that stands still until a test moves it.
#[derive(Clone)]
pub struct MockClock {
    timestamp: Arc<AtomicU32>,
    weekday: Arc<Mutex<Option<u8>>>,
    failures: Arc<AtomicU32>,
}

impl MockClock {
    pub fn at(timestamp: u32) -> Self {
        Self {
            timestamp: Arc::new(AtomicU32::new(timestamp)),
            weekday: Arc::new(Mutex::new(None)),
            failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// The next `count` reads fail with a bus error.
    pub fn fail_next_reads(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn set_timestamp(&self, timestamp: u32) {
        self.timestamp.store(timestamp, Ordering::SeqCst);
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp.load(Ordering::SeqCst)
    }

    pub fn last_weekday(&self) -> Option<u8> {
        *self.weekday.lock().unwrap()
    }
}

impl RealTimeClock for MockClock {
    async fn now(&mut self) -> Result<NaiveDateTime, ClockError> {
        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(ClockError::Bus);
        }
        Ok(clock::from_timestamp(self.timestamp()))
    }

    async fn set(&mut self, time: NaiveDateTime, weekday: u8) -> Result<(), ClockError> {
        self.set_timestamp(clock::to_timestamp(&time));
        *self.weekday.lock().unwrap() = Some(weekday);
        Ok(())
    }
}

/// Output pin that remembers its level.
#[derive(Clone, Default)]
pub struct MockPin {
    high: Arc<AtomicBool>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Reset line that unwinds instead of restarting, so tests can observe it.
pub struct MockReset;

impl SystemReset for MockReset {
    fn hard_reset(&mut self) -> ! {
        panic!("hard reset requested");
    }
}
