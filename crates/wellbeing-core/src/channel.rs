//! Interrupt-to-loop hand-off of calibrated readings
//!
//! A fixed-capacity ring shared between the sampling interrupt (single
//! producer) and the processing loop (single consumer). The producer never
//! waits: when the ring is full the oldest reading is discarded, because the
//! cycle detector only needs the current trend, not every window.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal_async::delay::DelayNs;
use heapless::Deque;

/// Readings buffered between the interrupt and the processing loop
pub const READING_QUEUE_DEPTH: usize = 25;

/// How long the consumer sleeps when the ring is empty
pub const POLL_INTERVAL_MS: u32 = 250;

struct Ring<const N: usize> {
    readings: Deque<f32, N>,
    /// Readings displaced by overflow since boot
    dropped: u32,
}

/// Bounded drop-oldest channel of amps readings.
///
/// The ring is guarded by a critical section held only for the O(1) push or
/// pop, so the interrupt is never delayed by the consumer's processing.
///
/// ```rust,ignore
/// static READINGS: ReadingChannel<READING_QUEUE_DEPTH> = ReadingChannel::new();
///
/// // interrupt context
/// READINGS.push(amps);
///
/// // processing loop
/// let amps = READINGS.pop(&mut delay).await;
/// ```
pub struct ReadingChannel<const N: usize> {
    ring: Mutex<CriticalSectionRawMutex, RefCell<Ring<N>>>,
}

impl<const N: usize> ReadingChannel<N> {
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Ring {
                readings: Deque::new(),
                dropped: 0,
            })),
        }
    }

    /// Queue a reading. Never blocks.
    ///
    /// Returns `true` when the ring was full and the oldest reading was
    /// discarded to make room.
    pub fn push(&self, amps: f32) -> bool {
        self.ring.lock(|ring| {
            let mut ring = ring.borrow_mut();
            let displaced = ring.readings.is_full();
            if displaced {
                ring.readings.pop_front();
                ring.dropped = ring.dropped.wrapping_add(1);
            }
            // A slot is free at this point unless N is 0.
            let _ = ring.readings.push_back(amps);
            displaced
        })
    }

    /// Take the oldest queued reading, if any.
    pub fn try_pop(&self) -> Option<f32> {
        self.ring.lock(|ring| ring.borrow_mut().readings.pop_front())
    }

    /// Wait for the next reading, polling every [`POLL_INTERVAL_MS`].
    pub async fn pop<D: DelayNs>(&self, delay: &mut D) -> f32 {
        loop {
            if let Some(amps) = self.try_pop() {
                return amps;
            }
            delay.delay_ms(POLL_INTERVAL_MS).await;
        }
    }

    pub fn len(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().readings.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Readings discarded by overflow since boot.
    pub fn dropped(&self) -> u32 {
        self.ring.lock(|ring| ring.borrow().dropped)
    }
}

impl<const N: usize> Default for ReadingChannel<N> {
    fn default() -> Self {
        Self::new()
    }
}
