use serde::Serialize;

use crate::redmine::types::RemoteIssue;

/// Fixed tracker status ids recognized alongside name matching.
pub const STATUS_NEW_ID: u64 = 1;
pub const STATUS_IN_PROGRESS_ID: u64 = 2;

const IN_PROGRESS_NAMES: [&str; 3] = ["in progress", "inprogress", "testing"];

/// Per-member issue counts. `assigned` is derived from the three buckets,
/// which are assumed to partition all assigned work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCounts {
    pub assigned: u64,
    pub new: u64,
    pub in_progress: u64,
    pub closed: u64,
}

/// Reduce the fetched issue lists to count buckets.
///
/// The closed count comes from the separately fetched closed list, never
/// from the status of the open listing — the assigned fetch intentionally
/// excludes closed tickets at some call sites, so callers must pass both.
pub fn classify(issues: &[RemoteIssue], closed_issues: &[RemoteIssue]) -> IssueCounts {
    let mut new = 0u64;
    let mut in_progress = 0u64;
    for issue in issues {
        let name = issue.status.name.to_lowercase();
        if issue.status.id == STATUS_NEW_ID || name == "new" {
            new += 1;
        } else if issue.status.id == STATUS_IN_PROGRESS_ID
            || IN_PROGRESS_NAMES.contains(&name.as_str())
        {
            in_progress += 1;
        }
    }
    let closed = closed_issues.len() as u64;
    IssueCounts {
        assigned: new + in_progress + closed,
        new,
        in_progress,
        closed,
    }
}
