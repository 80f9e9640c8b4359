//! Timestamp normalization.
//!
//! Every timestamp that enters the system is converted to `DateTime<Utc>`
//! at the boundary. Code past the boundary never sees a naive or
//! offset-carrying value, so date arithmetic has a single representation.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

/// Converts an offset-aware timestamp to UTC.
fn normalize<Tz: TimeZone>(timestamp: DateTime<Tz>) -> DateTime<Utc> {
    timestamp.with_timezone(&Utc)
}

/// Interprets a naive timestamp as UTC wall-clock time.
///
/// Stores that drop the offset (SQLite, some drivers) write UTC, so the
/// value is taken as-is.
fn normalize_naive(timestamp: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&timestamp)
}

/// Parses RFC 3339 with any offset, or a naive `YYYY-MM-DDTHH:MM:SS[.f]`
/// taken as UTC.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(input) {
        Ok(aware) => Ok(normalize(aware)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
            .map(normalize_naive)
            .map_err(|_| rfc_err),
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by tests exercising due dates.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn normalize_converts_offset_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let utc = normalize(local);
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn naive_and_aware_forms_agree() {
        let aware = parse_timestamp("2024-03-01T10:00:00+00:00").unwrap();
        let naive = parse_timestamp("2024-03-01T10:00:00").unwrap();
        let shifted = parse_timestamp("2024-03-01T05:00:00-05:00").unwrap();
        assert_eq!(aware, naive);
        assert_eq!(aware, shifted);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::days(3));
        assert_eq!(clock.now(), start + Duration::days(3));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
