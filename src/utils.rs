use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Round to a fixed number of decimal places (storage precision).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Timestamps are stored at second resolution.
pub fn to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(0)
}

/// Caller-supplied timestamp, or ingestion time when absent.
pub fn resolve_timestamp(ts: Option<DateTime<Utc>>) -> DateTime<Utc> {
    to_seconds(ts.unwrap_or_else(Utc::now))
}

/// Start of a look-back window of `hours` ending now. Windows reaching back
/// past the Unix epoch start at the epoch.
pub fn window_start(hours: u32) -> DateTime<Utc> {
    window_start_at(Utc::now(), hours)
}

pub fn window_start_at(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    Duration::try_hours(i64::from(hours))
        .and_then(|span| now.checked_sub_signed(span))
        .map_or(DateTime::UNIX_EPOCH, |start| start.max(DateTime::UNIX_EPOCH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn rounding_matches_storage_precision() {
        assert_eq!(round_to(4.26, 1), 4.3);
        assert_eq!(round_to(-3.04, 1), -3.0);
        assert_eq!(round_to(120.456, 2), 120.46);
    }

    #[test]
    fn subsecond_part_is_dropped() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 5, 14, 30, 0).unwrap() + Duration::milliseconds(750);
        let truncated = to_seconds(ts);
        assert_eq!(truncated.nanosecond(), 0);
        assert_eq!(truncated.second(), 0);
    }

    #[test]
    fn huge_windows_clamp_to_the_epoch() {
        let now = Utc.with_ymd_and_hms(2026, 2, 5, 14, 30, 0).unwrap();
        assert_eq!(window_start_at(now, 48), now - Duration::hours(48));
        assert_eq!(window_start_at(now, u32::MAX), DateTime::UNIX_EPOCH);
        assert_eq!(window_start(u32::MAX), DateTime::UNIX_EPOCH);
    }
}
