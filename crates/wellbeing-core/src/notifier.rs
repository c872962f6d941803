//! Live status fan-out
//!
//! Every processed reading produces a [`StatusUpdate`] that is pushed to all
//! connected observers (web socket clients on the device). Delivery is best
//! effort: a failing observer is logged and skipped.

use alloc::boxed::Box;
use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use log::warn;
use serde::Serialize;

use crate::error::ObserverError;

/// Pump state as shown to observers.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PumpStatus {
    On,
    Fault,
    Ok,
}

impl PumpStatus {
    /// `On` wins over a latched fault, which wins over `Ok`.
    pub const fn from_state(on: bool, fault: bool) -> Self {
        if on {
            Self::On
        } else if fault {
            Self::Fault
        } else {
            Self::Ok
        }
    }
}

/// Payload broadcast for every reading: `{"status": "ON", "amps": 4.2}`
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct StatusUpdate {
    pub status: PumpStatus,
    pub amps: f32,
}

/// A connected live observer.
pub trait StatusObserver {
    fn deliver(&mut self, update: &StatusUpdate) -> Result<(), ObserverError>;
}

/// Handle returned by [`StatusNotifier::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

struct ObserverSet {
    next_id: u32,
    entries: Vec<(ObserverId, Box<dyn StatusObserver + Send>)>,
}

/// Observer set shared between the processing loop and the front end.
///
/// Registration, removal and broadcast all serialize on one async mutex,
/// which may be held across delivery without blocking interrupts.
pub struct StatusNotifier {
    observers: AsyncMutex<CriticalSectionRawMutex, ObserverSet>,
}

impl StatusNotifier {
    pub const fn new() -> Self {
        Self {
            observers: AsyncMutex::new(ObserverSet {
                next_id: 0,
                entries: Vec::new(),
            }),
        }
    }

    pub async fn register(&self, observer: Box<dyn StatusObserver + Send>) -> ObserverId {
        let mut set = self.observers.lock().await;
        let id = ObserverId(set.next_id);
        set.next_id = set.next_id.wrapping_add(1);
        set.entries.push((id, observer));
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: ObserverId) -> bool {
        let mut set = self.observers.lock().await;
        let before = set.entries.len();
        set.entries.retain(|(entry, _)| *entry != id);
        set.entries.len() != before
    }

    /// Push `update` to every observer. Returns how many accepted it.
    pub async fn broadcast(&self, update: &StatusUpdate) -> usize {
        let mut set = self.observers.lock().await;
        let mut delivered = 0;
        for (id, observer) in set.entries.iter_mut() {
            match observer.deliver(update) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(" Status delivery to observer {:?} failed: {}", id, e),
            }
        }
        delivered
    }

    pub async fn len(&self) -> usize {
        self.observers.lock().await.entries.len()
    }
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new()
    }
}
