use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap() - Duration::days(1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap() - Duration::days(1)
    }
}

/// Parse a `YYYY-MM-DD` date string.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parse an `HH:MM` clock time.
pub fn parse_clock_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Combine an activity's date and optional `HH:MM` time into a start
/// timestamp. Returns None when either part is absent or malformed, in which
/// case callers fall back to the record's creation timestamp.
pub fn combine_date_time(date: &str, time: Option<&str>) -> Option<NaiveDateTime> {
    let d = parse_date(date)?;
    let t = parse_clock_time(time?)?;
    Some(d.and_time(t))
}

/// Whole minutes between two timestamps, floored at 1 so zero or negative
/// spans never produce degenerate durations.
pub fn minutes_between(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    (end - start).num_minutes().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2025, 1),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        ); // Leap year
        assert_eq!(
            last_day_of_month(2025, 12),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_combine_date_time() {
        let dt = combine_date_time("2025-03-10", Some("09:30")).unwrap();
        assert_eq!(dt.to_string(), "2025-03-10 09:30:00");
        assert!(combine_date_time("2025-03-10", None).is_none());
        assert!(combine_date_time("not-a-date", Some("09:30")).is_none());
        assert!(combine_date_time("2025-03-10", Some("9 am")).is_none());
    }

    #[test]
    fn test_minutes_between_floors_at_one() {
        let a = combine_date_time("2025-03-10", Some("09:30")).unwrap();
        let b = combine_date_time("2025-03-10", Some("10:15")).unwrap();
        assert_eq!(minutes_between(a, b), 45);
        // Same instant and reversed order both floor to 1 minute
        assert_eq!(minutes_between(a, a), 1);
        assert_eq!(minutes_between(b, a), 1);
    }
}
