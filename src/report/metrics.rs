use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::date_util::{combine_date_time, minutes_between};
use crate::redmine::types::RemoteIssue;
use crate::storage::repository::{ActivityRow, ActivityStatus};

/// One working day for time-efficiency conversion.
pub const WORKING_MINUTES_PER_DAY: f64 = 480.0;

/// Completed tasks per working day that score 100 points.
pub const BENCHMARK_TASKS_PER_DAY: f64 = 4.0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionScore {
    pub score: f64,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEfficiency {
    pub score: f64,
    pub label: &'static str,
    /// Mean minutes to complete a daylog activity.
    pub avg_daylog_duration: f64,
    /// Mean minutes per remote issue (closed issues plus age of open ones).
    pub avg_redmine_duration: f64,
    pub time_efficiency_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScore {
    pub score: f64,
    pub label: &'static str,
    pub description: &'static str,
}

/// Immutable per-member scoring bundle, recomputed on every report request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductivityMetrics {
    pub option1: OptionScore,
    pub option2: OptionScore,
    pub option3: TimeEfficiency,
    pub final_score: FinalScore,
}

/// Completed ÷ total × 100, clamped. Zero when the denominator is zero.
/// The clamp guards against mismatched date windows where the closed query
/// returns more issues than the assigned query.
pub fn completion_rate(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Compute the full metrics bundle for one member.
///
/// `issues` is the member's full remote-issue list for the window,
/// `closed_issues` the separately fetched closed list. `now` anchors the age
/// of still-open issues.
pub fn compute_productivity(
    activities: &[ActivityRow],
    issues: &[RemoteIssue],
    closed_issues: &[RemoteIssue],
    now: DateTime<Utc>,
) -> ProductivityMetrics {
    let completed: Vec<&ActivityRow> = activities
        .iter()
        .filter(|a| a.status == ActivityStatus::Done)
        .collect();
    let daylog_rate = completion_rate(completed.len(), activities.len());
    let redmine_rate = completion_rate(closed_issues.len(), issues.len());

    let option1_score = blended_score(redmine_rate, daylog_rate, 0.75, activities.is_empty());
    let option2_score = blended_score(redmine_rate, daylog_rate, 0.50, activities.is_empty());
    let option3 = time_efficiency(&completed, issues, closed_issues, now);

    ProductivityMetrics {
        option1: OptionScore {
            score: option1_score,
            label: "Combined Completion Rate",
        },
        option2: OptionScore {
            score: option2_score,
            label: "Weighted Performance",
        },
        option3,
        // Always Option 1's value. The report UI hints at a smarter pick but
        // the shipped behavior has only ever surfaced the 75/25 blend.
        final_score: FinalScore {
            score: option1_score,
            label: "Combined Completion Rate",
            description: "75% Redmine completion, 25% daylog completion; \
                          pure Redmine rate when no activities were logged",
        },
    }
}

/// Weighted blend of the two completion rates, with the zero-activity
/// fallback to the raw Redmine rate. One decimal, clamped.
fn blended_score(
    redmine_rate: f64,
    daylog_rate: f64,
    redmine_weight: f64,
    no_activities: bool,
) -> f64 {
    let raw = if no_activities {
        redmine_rate
    } else {
        redmine_rate * redmine_weight + daylog_rate * (1.0 - redmine_weight)
    };
    round1(raw.clamp(0.0, 100.0))
}

fn time_efficiency(
    completed: &[&ActivityRow],
    issues: &[RemoteIssue],
    closed_issues: &[RemoteIssue],
    now: DateTime<Utc>,
) -> TimeEfficiency {
    // Daylog duration: completion minus start, where start prefers the
    // logged date+time over the record's creation timestamp.
    let daylog_minutes: Vec<i64> = completed
        .iter()
        .filter_map(|a| {
            let start = combine_date_time(&a.date, a.time.as_deref())
                .or_else(|| parse_db_timestamp(&a.created_at))?;
            let end = parse_db_timestamp(&a.updated_at)?;
            Some(minutes_between(start, end))
        })
        .collect();

    let closed_minutes: Vec<i64> = closed_issues
        .iter()
        .filter_map(|i| {
            let created = i.created_on?;
            let closed = i.closed_on?;
            Some(minutes_between(created.naive_utc(), closed.naive_utc()))
        })
        .collect();

    // Age of still-open issues: reporting context only, never scored.
    let open_minutes: Vec<i64> = issues
        .iter()
        .filter(|i| i.closed_on.is_none())
        .filter_map(|i| {
            let created = i.created_on?;
            Some(minutes_between(created.naive_utc(), now.naive_utc()))
        })
        .collect();

    let completed_count = completed.len() + closed_issues.len();
    let total_working_minutes: i64 =
        daylog_minutes.iter().sum::<i64>() + closed_minutes.iter().sum::<i64>();
    let working_days = total_working_minutes as f64 / WORKING_MINUTES_PER_DAY;
    let tasks_per_working_day = if working_days > 0.0 {
        completed_count as f64 / working_days
    } else {
        0.0
    };
    let score = round1(
        (tasks_per_working_day / BENCHMARK_TASKS_PER_DAY * 100.0).clamp(0.0, 100.0),
    );

    let mut remote_minutes = closed_minutes;
    remote_minutes.extend(open_minutes);

    TimeEfficiency {
        score,
        label: "Time-based Efficiency",
        avg_daylog_duration: mean(&daylog_minutes),
        avg_redmine_duration: mean(&remote_minutes),
        time_efficiency_score: score,
    }
}

fn mean(minutes: &[i64]) -> f64 {
    if minutes.is_empty() {
        return 0.0;
    }
    round1(minutes.iter().sum::<i64>() as f64 / minutes.len() as f64)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// SQLite `datetime('now')` produces `YYYY-MM-DD HH:MM:SS`; tolerate the
/// ISO `T` separator as well.
fn parse_db_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
