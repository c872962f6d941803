//! Error types shared across the monitor

use thiserror_no_std::Error;

/// Failure reported by a [`StorageMedium`](crate::storage::StorageMedium).
///
/// Media log the underlying OS/driver error themselves and report only the
/// operation that failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumError {
    #[error("failed to read the backing store")]
    Read,
    #[error("failed to write the backing store")]
    Write,
    #[error("failed to flush the backing store")]
    Sync,
    #[error("failed to remove the backing store")]
    Remove,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage medium failure: {0}")]
    Medium(#[from] MediumError),
    #[error("cycle start time 0 collides with the reserved configuration key")]
    ReservedKey,
}

/// The real-time clock could not be read or set.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("real-time clock bus error")]
    Bus,
}

/// A live observer could not take a status update.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverError {
    #[error("observer disconnected")]
    Disconnected,
    #[error("observer rejected the message")]
    Rejected,
}

/// An inbound operator request was missing fields or held invalid values.
///
/// No state is mutated when a request is rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value for `{0}`")]
    InvalidField(&'static str),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),
    #[error("bad request: {0}")]
    Request(#[from] RequestError),
}

impl From<MediumError> for MonitorError {
    fn from(err: MediumError) -> Self {
        Self::Store(StoreError::Medium(err))
    }
}
