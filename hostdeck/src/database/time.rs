//! Epoch-millisecond timestamps for hostdeck rows.
//!
//! `servers.created_at`, `deployments.updated_at`, `metrics.timestamp` and the
//! other time columns are `INTEGER` Unix epoch milliseconds in UTC.

use chrono::{DateTime, Duration, Utc};

#[inline]
pub fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Stored milliseconds back to a timestamp, clamped to chrono's range.
#[inline]
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(if ms < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Half-open `[since, until)` bounds for a metric query. An open end covers
/// every later sample.
pub fn metric_window_ms(since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> (i64, i64) {
    (
        datetime_to_ms(since),
        until.map(datetime_to_ms).unwrap_or(i64::MAX),
    )
}

/// Start of the aggregation bucket of `width` that contains `ts`.
///
/// Buckets are aligned to the epoch, so every server's report for the same
/// window shares bucket boundaries. Widths under a millisecond are treated as one.
pub fn bucket_start(ts: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    let width_ms = width.num_milliseconds().max(1);
    ms_to_datetime(datetime_to_ms(ts).div_euclid(width_ms) * width_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ms_roundtrip_keeps_millis() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap() + Duration::milliseconds(250);
        assert_eq!(ms_to_datetime(datetime_to_ms(dt)), dt);
    }

    #[test]
    fn test_out_of_range_clamps() {
        assert_eq!(ms_to_datetime(i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(ms_to_datetime(i64::MIN), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_open_metric_window() {
        let since = Utc.with_ymd_and_hms(2024, 5, 17, 8, 0, 0).unwrap();
        let (from, to) = metric_window_ms(since, None);
        assert_eq!(from, since.timestamp_millis());
        assert_eq!(to, i64::MAX);

        let until = since + Duration::hours(1);
        assert_eq!(metric_window_ms(since, Some(until)).1, until.timestamp_millis());
    }

    #[test]
    fn test_bucket_start_aligns_to_width() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 8, 47, 13).unwrap();
        assert_eq!(
            bucket_start(ts, Duration::minutes(15)),
            Utc.with_ymd_and_hms(2024, 5, 17, 8, 45, 0).unwrap()
        );
        assert_eq!(
            bucket_start(ts, Duration::hours(1)),
            Utc.with_ymd_and_hms(2024, 5, 17, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_bucket_start_before_epoch_rounds_down() {
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 30).unwrap();
        assert_eq!(
            bucket_start(ts, Duration::minutes(1)),
            Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 0).unwrap()
        );
    }
}
