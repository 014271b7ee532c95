use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::date_util::last_day_of_month;
use crate::error::{Error, Result};

/// Upper bound on rolling windows (ten years). Keeps the window plausible
/// and the date arithmetic in `date_range` comfortably in range.
const MAX_ROLLING_DAYS: u32 = 3650;

static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2}):(\d{4}-\d{2}-\d{2})$").unwrap());

/// A reporting window resolved to inclusive whole-day bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Month(i32, u8),
    Range(NaiveDate, NaiveDate),
    Rolling(u32, NaiveDate),
    MonthToDate(NaiveDate),
}

impl Period {
    /// Parse a period string.
    ///
    /// Supported formats:
    /// - `2025-01` — calendar month
    /// - `2025-01-06:2025-01-19` — explicit inclusive range
    /// - `30d` — rolling last N days (ending today)
    /// - `mtd` — month to date
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let today = chrono::Local::now().date_naive();

        if s.eq_ignore_ascii_case("mtd") {
            return Ok(Period::MonthToDate(today));
        }

        // Rolling: "30d", "7d", etc.
        if let Some(stripped) = s.strip_suffix(['d', 'D']) {
            if let Ok(n) = stripped.parse::<u32>() {
                if n == 0 {
                    return Err(Error::PeriodParse(format!("rolling window of 0 days: {s}")));
                }
                if n > MAX_ROLLING_DAYS {
                    return Err(Error::PeriodParse(format!(
                        "rolling window too large (max {MAX_ROLLING_DAYS} days): {s}"
                    )));
                }
                return Ok(Period::Rolling(n, today));
            }
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let month: u8 = caps[2].parse().unwrap();
            if (1..=12).contains(&month) {
                return Ok(Period::Month(year, month));
            }
            return Err(Error::PeriodParse(format!("invalid month: {s}")));
        }

        if let Some(caps) = RE_RANGE.captures(s) {
            let start = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d")
                .map_err(|_| Error::PeriodParse(format!("invalid start date: {s}")))?;
            let end = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d")
                .map_err(|_| Error::PeriodParse(format!("invalid end date: {s}")))?;
            if end < start {
                return Err(Error::PeriodParse(format!("end before start: {s}")));
            }
            return Ok(Period::Range(start, end));
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Inclusive date bounds for the window.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        match *self {
            Period::Month(year, month) => (
                NaiveDate::from_ymd_opt(year, month as u32, 1).unwrap(),
                last_day_of_month(year, month as u32),
            ),
            Period::Range(start, end) => (start, end),
            Period::Rolling(days, today) => (today - Duration::days(days as i64 - 1), today),
            Period::MonthToDate(today) => (
                NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap(),
                today,
            ),
        }
    }

    /// Human-readable key, e.g. `2025-01` or `2025-01-06:2025-01-19`.
    pub fn to_key(&self) -> String {
        let (start, end) = self.date_range();
        match self {
            Period::Month(year, month) => format!("{year}-{month:02}"),
            _ => format!("{start}:{end}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_month() {
        let p = Period::parse("2025-03").unwrap();
        assert_eq!(p, Period::Month(2025, 3));
        let (start, end) = p.date_range();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
        assert_eq!(p.to_key(), "2025-03");
    }

    #[test]
    fn test_parse_range() {
        let p = Period::parse("2025-01-06:2025-01-19").unwrap();
        let (start, end) = p.date_range();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 19).unwrap());
    }

    #[test]
    fn test_parse_rolling() {
        let p = Period::parse("7d").unwrap();
        let (start, end) = p.date_range();
        assert_eq!((end - start).num_days(), 6); // 7 days inclusive
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Period::parse("2025-13").is_err());
        assert!(Period::parse("0d").is_err());
        assert!(Period::parse("last tuesday").is_err());
        assert!(Period::parse("2025-01-19:2025-01-06").is_err());
    }

    #[test]
    fn test_rolling_window_is_capped() {
        // Oversized windows must fail at parse time; accepting them lets
        // date_range overflow NaiveDate subtraction.
        assert!(Period::parse("4000000000d").is_err());
        assert!(Period::parse("3651d").is_err());

        let p = Period::parse("3650d").unwrap();
        let (start, end) = p.date_range();
        assert_eq!((end - start).num_days(), 3649);
    }

    #[test]
    fn test_mtd_starts_on_first() {
        let p = Period::parse("mtd").unwrap();
        let (start, end) = p.date_range();
        assert_eq!(start.day(), 1);
        assert!(start <= end);
    }
}
