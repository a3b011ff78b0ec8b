// =============================================================================
// Time-of-week bucket keys
// =============================================================================
//
// A bucket is a recurring ten-minute slot of the week for one instrument and
// interval length. It is derived from local wall-clock time, never stored.
// Weekday counts from Sunday = 0.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub instrument: String,
    pub interval_secs: u32,
    pub weekday: u8,
    pub hour: u8,
    /// Ten-minute slot within the hour, 0..=5.
    pub slot: u8,
}

impl BucketKey {
    pub fn from_datetime<Tz: TimeZone>(instrument: &str, interval_secs: u32, at: &DateTime<Tz>) -> Self {
        Self {
            instrument: instrument.to_string(),
            interval_secs,
            weekday: at.weekday().num_days_from_sunday() as u8,
            hour: at.hour() as u8,
            slot: (at.minute() / 10) as u8,
        }
    }

    /// Bucket for the epoch-millisecond instant `now_ms` in local time.
    pub fn at(instrument: &str, interval_secs: u32, now_ms: i64) -> Self {
        let utc: DateTime<Utc> = DateTime::from_timestamp_millis(now_ms).unwrap_or_default();
        Self::from_datetime(instrument, interval_secs, &utc.with_timezone(&Local))
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.instrument, self.interval_secs, self.weekday, self.hour, self.slot
        )
    }
}
