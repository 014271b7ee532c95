use serde::Serialize;

use crate::report::metrics::ProductivityMetrics;
use crate::storage::repository::TeamRole;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInfo {
    pub id: i64,
    pub name: String,
}

/// Remote counts for one member, as classified from the fetched lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedmineStats {
    pub assigned_issues: u64,
    pub new_issues: u64,
    pub in_progress_issues: u64,
    pub closed_issues: u64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProductivity {
    pub member_id: i64,
    pub username: String,
    pub role: TeamRole,
    pub is_lead: bool,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub blocked_tasks: u64,
    /// Daylog completion rate (completed ÷ total internal activities).
    pub completion_rate: f64,
    pub redmine_stats: RedmineStats,
    pub productivity_metrics: ProductivityMetrics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub total_members: u64,
    pub total_activities: u64,
    pub total_completed: u64,
    /// Mean of per-member daylog rates, not a global completed/total ratio.
    pub average_completion_rate: f64,
}

/// Distinguishes "no remote work" from "remote fetch failed" — a degraded
/// report is otherwise shaped identically to a fully populated one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCompleteness {
    pub redmine_fetch_succeeded: bool,
    pub members_with_remote_data: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub team: TeamInfo,
    pub period: String,
    pub member_productivity: Vec<MemberProductivity>,
    pub summary: TeamSummary,
    pub data_completeness: DataCompleteness,
}
