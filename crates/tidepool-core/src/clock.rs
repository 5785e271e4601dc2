//! Conversions between `hhmm` integers (e.g. `830` for 08:30) and times of day.

use chrono::{NaiveTime, Timelike};

use crate::{Result, error::Error};

/// Convert an `hhmm` integer to a time of day.
///
/// # Errors
/// Returns `Error::InvalidArgument` when the hour is above 23 or the
/// minute above 59 (`2500`, `1267`).
///
/// # Examples
///
/// ```
/// use chrono::NaiveTime;
/// use tidepool_core::hhmm_to_time;
///
/// assert_eq!(hhmm_to_time(259).unwrap(), NaiveTime::from_hms_opt(2, 59, 0).unwrap());
/// assert!(hhmm_to_time(1267).is_err());
/// ```
pub fn hhmm_to_time(hhmm: u32) -> Result<NaiveTime> {
    let (hour, minute) = (hhmm / 100, hhmm % 100);
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| Error::InvalidArgument(format!("Invalid hhmm time: {hhmm}")))
}

/// Convert a time of day to its `hhmm` integer. Seconds are dropped.
pub fn time_to_hhmm(time: NaiveTime) -> u32 {
    time.hour() * 100 + time.minute()
}
