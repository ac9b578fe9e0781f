use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// Parse an ISO-8601 timestamp as emitted by the tracker or a test export.
///
/// Accepts RFC 3339 with an explicit offset, a trailing `Z`, naive date-times
/// (read as UTC) and bare dates (midnight UTC). Anything else yields `None`.
pub fn parse_timestamp(input: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = match trimmed.strip_suffix(['Z', 'z']) {
        Some(base) => format!("{base}+00:00"),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt);
    }

    let utc = FixedOffset::east_opt(0)?;
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(naive.and_utc().with_timezone(&utc));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().with_timezone(&utc));
    }

    tracing::debug!(value = %trimmed, "unparseable timestamp ignored");
    None
}

/// Whole days between two instants, rounded toward negative infinity.
///
/// A negative span stays negative: `-1h` is `-1` day, not `0`.
pub fn floor_days<Tz1, Tz2>(from: &DateTime<Tz1>, to: &DateTime<Tz2>) -> i64
where
    Tz1: chrono::TimeZone,
    Tz2: chrono::TimeZone,
{
    let millis = to.timestamp_millis() - from.timestamp_millis();
    millis.div_euclid(86_400_000)
}

/// Convenience for "days elapsed since `ts` as of `now`".
pub fn days_since(ts: &DateTime<FixedOffset>, now: &DateTime<Utc>) -> i64 {
    floor_days(ts, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_trailing_z() {
        let dt = parse_timestamp("2025-09-15T10:30:00Z").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.day(), 15);
    }

    #[test]
    fn test_parse_fractional_seconds_and_offset() {
        let dt = parse_timestamp("2025-09-15T23:30:00.123+02:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 7200);
        // Calendar date stays in the record's own offset.
        assert_eq!(dt.date_naive().day(), 15);
    }

    #[test]
    fn test_parse_naive_and_date_only() {
        let naive = parse_timestamp("2025-09-15T10:30:00").unwrap();
        assert_eq!(naive.offset().local_minus_utc(), 0);
        let date = parse_timestamp("2025-09-15").unwrap();
        assert_eq!(date.hour(), 0);
        assert_eq!(date.month(), 9);
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("   ").is_none());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("2025-13-45T99:00:00Z").is_none());
    }

    #[test]
    fn test_floor_days_rounds_down() {
        let a = parse_timestamp("2025-09-10T14:20:00Z").unwrap();
        let b = parse_timestamp("2025-09-16T11:45:00Z").unwrap();
        assert_eq!(floor_days(&a, &b), 5);
        // Reversed span is floored, not truncated.
        assert_eq!(floor_days(&b, &a), -6);
    }

    #[test]
    fn test_floor_days_keeps_fractional_seconds() {
        let a = parse_timestamp("2025-09-10T00:00:00Z").unwrap();
        let b = parse_timestamp("2025-09-10T23:59:59.500Z").unwrap();
        let c = parse_timestamp("2025-09-11T00:00:00.250Z").unwrap();
        assert_eq!(floor_days(&a, &b), 0);
        assert_eq!(floor_days(&b, &c), 0);
        assert_eq!(floor_days(&a, &c), 1);
        assert_eq!(floor_days(&c, &b), -1);
    }
}
