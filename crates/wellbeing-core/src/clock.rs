//! Real-time clock access and calendar helpers
//!
//! The device clock keeps naive local time. Timestamps throughout the monitor
//! are seconds of that naive time since 1970-01-01 00:00:00, which is also
//! what the cycle log keys are built from.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::{ClockError, RequestError};

/// Battery-backed real-time clock on the sensor bus.
pub trait RealTimeClock {
    /// Read the current date and time.
    fn now(&mut self) -> impl Future<Output = Result<NaiveDateTime, ClockError>>;

    /// Set the date and time. `weekday` is stored as given (0 = Sunday).
    fn set(
        &mut self,
        time: NaiveDateTime,
        weekday: u8,
    ) -> impl Future<Output = Result<(), ClockError>>;
}

/// Seconds since epoch of a naive clock reading, clamped to the `u32` range.
pub fn to_timestamp(time: &NaiveDateTime) -> u32 {
    let secs = time.and_utc().timestamp();
    secs.clamp(0, i64::from(u32::MAX)) as u32
}

/// Naive clock reading of a stored timestamp.
pub fn from_timestamp(timestamp: u32) -> NaiveDateTime {
    DateTime::from_timestamp(i64::from(timestamp), 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// 23:59:59 on the day of `time`.
pub fn end_of_day(time: &NaiveDateTime) -> NaiveDateTime {
    time.date().and_hms_opt(23, 59, 59).unwrap_or(*time)
}

/// Operator request to set the clock, as posted by the front end.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeRequest {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub month_day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
    pub weekday: Option<u8>,
}

impl DateTimeRequest {
    /// Check every field is present and forms a real calendar date and time.
    pub fn validate(&self) -> Result<(NaiveDateTime, u8), RequestError> {
        let year = self.year.ok_or(RequestError::MissingField("year"))?;
        let month = self.month.ok_or(RequestError::MissingField("month"))?;
        let day = self.month_day.ok_or(RequestError::MissingField("monthDay"))?;
        let hour = self.hour.ok_or(RequestError::MissingField("hour"))?;
        let minute = self.minute.ok_or(RequestError::MissingField("minute"))?;
        let second = self.second.ok_or(RequestError::MissingField("second"))?;
        let weekday = self.weekday.ok_or(RequestError::MissingField("weekday"))?;

        if weekday > 6 {
            return Err(RequestError::InvalidField("weekday"));
        }

        let time = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(RequestError::InvalidField("date"))?
            .and_hms_opt(hour, minute, second)
            .ok_or(RequestError::InvalidField("time"))?;

        Ok((time, weekday))
    }
}
