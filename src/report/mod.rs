pub mod classify;
pub mod metrics;
pub mod respond;
pub mod types;

use std::collections::HashMap;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::period::Period;
use crate::redmine::fetcher::{IssueFetcher, UserIssues};
use crate::storage::repository::{
    self, ActivityRow, ActivityStatus, GlobalRole, MemberRow, TeamRole,
};
use crate::storage::Database;
use classify::classify;
use metrics::{completion_rate, compute_productivity, round1};
use types::{
    DataCompleteness, MemberProductivity, RedmineStats, ReportPayload, TeamInfo, TeamSummary,
};

/// Build the team productivity report: authorize the requester, load the
/// roster and activity records, fetch remote issue data once for the whole
/// team, then score each member and aggregate.
///
/// Remote degradation (timeouts, upstream errors) never fails the report;
/// affected members simply carry zeroed remote stats, with the degradation
/// surfaced through the payload's data-completeness block.
pub async fn build_report(
    db: &Database,
    fetcher: &IssueFetcher,
    team_id: i64,
    requester_id: i64,
    period: &Period,
) -> Result<ReportPayload> {
    authorize(db, team_id, requester_id).await?;

    let team = db
        .reader()
        .call(move |conn| repository::get_team(conn, team_id))
        .await?
        .ok_or_else(|| Error::NotFound(format!("team {team_id}")))?;

    // Global admins are never scored subjects, even on the roster.
    let members: Vec<MemberRow> = db
        .reader()
        .call(move |conn| repository::team_members(conn, team_id))
        .await?
        .into_iter()
        .filter(|m| m.user_role != GlobalRole::Admin)
        .collect();

    let (from, to) = period.date_range();
    let member_ids: Vec<i64> = members.iter().map(|m| m.user_id).collect();
    let activities = {
        let ids = member_ids.clone();
        let from = from.to_string();
        let to = to.to_string();
        db.reader()
            .call(move |conn| repository::activities_for_users(conn, &ids, &from, &to))
            .await?
    };
    let mut activities_by_user: HashMap<i64, Vec<ActivityRow>> = HashMap::new();
    for activity in activities {
        activities_by_user
            .entry(activity.user_id)
            .or_default()
            .push(activity);
    }

    let usernames: Vec<String> = members.iter().map(|m| m.username.clone()).collect();
    let issues_by_user = fetcher.batch_fetch(&usernames, from, to).await;

    let now = Utc::now();
    let empty = UserIssues::default();
    let mut member_productivity = Vec::with_capacity(members.len());
    let mut total_activities = 0u64;
    let mut total_completed = 0u64;
    let mut rate_sum = 0.0f64;
    let mut members_with_remote_data = 0u64;

    for member in &members {
        let user_issues = issues_by_user.get(&member.username).unwrap_or(&empty);
        if user_issues.fetch_succeeded {
            members_with_remote_data += 1;
        }

        let member_activities = activities_by_user
            .remove(&member.user_id)
            .unwrap_or_default();
        let total = member_activities.len();
        let completed = member_activities
            .iter()
            .filter(|a| a.status == ActivityStatus::Done)
            .count();
        let blocked = member_activities
            .iter()
            .filter(|a| a.status == ActivityStatus::Blocked)
            .count();
        let daylog_rate = completion_rate(completed, total);

        let counts = classify(&user_issues.issues, &user_issues.closed_issues);
        let redmine_rate = completion_rate(
            user_issues.closed_issues.len(),
            user_issues.issues.len(),
        );

        let productivity = compute_productivity(
            &member_activities,
            &user_issues.issues,
            &user_issues.closed_issues,
            now,
        );

        total_activities += total as u64;
        total_completed += completed as u64;
        rate_sum += daylog_rate;

        member_productivity.push(MemberProductivity {
            member_id: member.user_id,
            username: member.username.clone(),
            role: member.team_role,
            is_lead: member.is_lead,
            total_tasks: total as u64,
            completed_tasks: completed as u64,
            blocked_tasks: blocked as u64,
            completion_rate: daylog_rate,
            redmine_stats: RedmineStats {
                assigned_issues: counts.assigned,
                new_issues: counts.new,
                in_progress_issues: counts.in_progress,
                closed_issues: counts.closed,
                completion_rate: redmine_rate,
            },
            productivity_metrics: productivity,
        });
    }

    let average_completion_rate = if member_productivity.is_empty() {
        0.0
    } else {
        round1((rate_sum / member_productivity.len() as f64).min(100.0))
    };

    Ok(ReportPayload {
        team: TeamInfo {
            id: team.team_id,
            name: team.name,
        },
        period: period.to_key(),
        summary: TeamSummary {
            total_members: member_productivity.len() as u64,
            total_activities,
            total_completed,
            average_completion_rate,
        },
        data_completeness: DataCompleteness {
            redmine_fetch_succeeded: members_with_remote_data == member_productivity.len() as u64,
            members_with_remote_data,
        },
        member_productivity,
    })
}

/// Cheap checks first: an unknown requester is rejected before any team
/// data is touched; non-admins must be the team's lead (and not hold the
/// team_admin role).
async fn authorize(db: &Database, team_id: i64, requester_id: i64) -> Result<()> {
    let requester = db
        .reader()
        .call(move |conn| repository::get_user(conn, requester_id))
        .await?
        .ok_or(Error::Unauthenticated)?;

    if requester.role == GlobalRole::Admin {
        return Ok(());
    }

    let membership = db
        .reader()
        .call(move |conn| repository::membership(conn, team_id, requester_id))
        .await?;
    match membership {
        Some(m) if m.is_lead && m.team_role != TeamRole::TeamAdmin => Ok(()),
        _ => Err(Error::Forbidden(format!(
            "user {requester_id} may not view reports for team {team_id}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::redmine::types::{IssueQuery, IssueStatusRef, Page, RedmineUser, RemoteIssue};
    use crate::redmine::RedmineApi;

    /// Directory of remote users plus per-user issue totals
    /// (new, in_progress, closed). Optionally errors on every issue page.
    struct ScriptedApi {
        users: Vec<(u64, String)>,
        issues: HashMap<u64, (u64, u64, u64)>,
        degraded: bool,
    }

    impl ScriptedApi {
        fn empty() -> Self {
            Self {
                users: Vec::new(),
                issues: HashMap::new(),
                degraded: false,
            }
        }

        fn with_user(mut self, id: u64, login: &str, new: u64, in_progress: u64, closed: u64) -> Self {
            self.users.push((id, login.to_string()));
            self.issues.insert(id, (new, in_progress, closed));
            self
        }

        fn degraded(mut self) -> Self {
            self.degraded = true;
            self
        }
    }

    fn issue_with_status(id: u64, status_id: u64, name: &str) -> RemoteIssue {
        RemoteIssue {
            id,
            status: IssueStatusRef {
                id: status_id,
                name: name.to_string(),
            },
            assigned_to: None,
            created_on: Some("2025-01-02T09:00:00Z".parse().unwrap()),
            closed_on: if status_id == 5 {
                Some("2025-01-03T09:00:00Z".parse().unwrap())
            } else {
                None
            },
        }
    }

    #[async_trait]
    impl RedmineApi for ScriptedApi {
        async fn users_page(
            &self,
            _login: &str,
            _offset: u32,
            _limit: u32,
        ) -> crate::error::Result<Page<RedmineUser>> {
            let items = self
                .users
                .iter()
                .map(|(id, login)| RedmineUser {
                    id: *id,
                    login: login.clone(),
                    firstname: None,
                    lastname: None,
                })
                .collect::<Vec<_>>();
            let total_count = items.len() as u64;
            Ok(Page { items, total_count })
        }

        async fn issues_page(
            &self,
            query: &IssueQuery,
            _offset: u32,
            _limit: u32,
        ) -> crate::error::Result<Page<RemoteIssue>> {
            if self.degraded {
                return Err(Error::Api("upstream unavailable".into()));
            }
            let (new, in_progress, closed) =
                self.issues.get(&query.assigned_to).copied().unwrap_or((0, 0, 0));
            let mut items = Vec::new();
            if query.closed_only {
                for i in 0..closed {
                    items.push(issue_with_status(i + 1, 5, "Closed"));
                }
            } else {
                for i in 0..new {
                    items.push(issue_with_status(i + 1, 1, "New"));
                }
                for i in 0..in_progress {
                    items.push(issue_with_status(new + i + 1, 2, "In Progress"));
                }
                for i in 0..closed {
                    items.push(issue_with_status(new + in_progress + i + 1, 5, "Closed"));
                }
            }
            let total_count = items.len() as u64;
            Ok(Page { items, total_count })
        }
    }

    struct Fixture {
        db: Database,
        team: i64,
        admin: i64,
        lead: i64,
        member: i64,
    }

    /// Team of three: a lead ("lena"), a plain member ("marco"), and a
    /// global admin ("root") who sits on the roster.
    async fn fixture() -> Fixture {
        let db = Database::open_memory().await.unwrap();
        let (team, admin, lead, member) = db
            .writer()
            .call(|conn| {
                let team = repository::create_team(conn, "Platform")?;
                let admin = repository::create_user(conn, "root", GlobalRole::Admin)?;
                let lead = repository::create_user(conn, "lena", GlobalRole::User)?;
                let member = repository::create_user(conn, "marco", GlobalRole::User)?;
                repository::add_team_member(conn, team, admin, TeamRole::TeamAdmin)?;
                repository::add_team_member(conn, team, lead, TeamRole::Member)?;
                repository::add_team_member(conn, team, member, TeamRole::Member)?;
                repository::set_team_lead(conn, team, lead)?;
                Ok::<_, rusqlite::Error>((team, admin, lead, member))
            })
            .await
            .unwrap();
        Fixture {
            db,
            team,
            admin,
            lead,
            member,
        }
    }

    fn period() -> Period {
        Period::parse("2025-01").unwrap()
    }

    async fn log_done(db: &Database, user: i64, date: &str) {
        let date = date.to_string();
        db.writer()
            .call(move |conn| {
                let id = repository::create_activity(conn, user, &date, Some("09:00"), None, false)?;
                repository::update_activity_status(conn, id, ActivityStatus::Done, None)?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_plain_member_is_forbidden() {
        let f = fixture().await;
        let fetcher = IssueFetcher::new(Arc::new(ScriptedApi::empty()));
        let err = build_report(&f.db, &fetcher, f.team, f.member, &period())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_unknown_requester_is_unauthenticated() {
        let f = fixture().await;
        let fetcher = IssueFetcher::new(Arc::new(ScriptedApi::empty()));
        let err = build_report(&f.db, &fetcher, f.team, 9999, &period())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_team_admin_lead_is_forbidden() {
        let f = fixture().await;
        // Flip the lead to the team_admin member: role excludes lead access.
        let (team, admin) = (f.team, f.admin);
        f.db
            .writer()
            .call(move |conn| repository::set_team_lead(conn, team, admin))
            .await
            .unwrap();
        // The admin's global role still bypasses, so demote them first.
        f.db
            .writer()
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET role = 'user' WHERE user_id = ?1",
                    rusqlite::params![admin],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();
        let fetcher = IssueFetcher::new(Arc::new(ScriptedApi::empty()));
        let err = build_report(&f.db, &fetcher, f.team, f.admin, &period())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_missing_team_is_not_found() {
        let f = fixture().await;
        let fetcher = IssueFetcher::new(Arc::new(ScriptedApi::empty()));
        let err = build_report(&f.db, &fetcher, 424242, f.admin, &period())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_admin_bypasses_and_is_excluded_from_scoring() {
        let f = fixture().await;
        let fetcher = IssueFetcher::new(Arc::new(ScriptedApi::empty()));
        let payload = build_report(&f.db, &fetcher, f.team, f.admin, &period())
            .await
            .unwrap();
        let usernames: Vec<&str> = payload
            .member_productivity
            .iter()
            .map(|m| m.username.as_str())
            .collect();
        assert_eq!(usernames, vec!["lena", "marco"]);
        assert_eq!(payload.summary.total_members, 2);
    }

    #[tokio::test]
    async fn test_full_report_blends_internal_and_remote() {
        let f = fixture().await;
        // lena: 2/2 activities done (rate 100), remote 10 issues / 8 closed (80)
        log_done(&f.db, f.lead, "2025-01-06").await;
        log_done(&f.db, f.lead, "2025-01-07").await;
        let api = ScriptedApi::empty()
            .with_user(71, "lena", 1, 1, 8)
            .with_user(72, "marco", 0, 0, 6);
        let fetcher = IssueFetcher::new(Arc::new(api));

        let payload = build_report(&f.db, &fetcher, f.team, f.lead, &period())
            .await
            .unwrap();

        let lena = &payload.member_productivity[0];
        assert_eq!(lena.username, "lena");
        assert_eq!(lena.total_tasks, 2);
        assert_eq!(lena.completed_tasks, 2);
        assert_eq!(lena.completion_rate, 100.0);
        assert_eq!(lena.redmine_stats.assigned_issues, 10);
        assert_eq!(lena.redmine_stats.closed_issues, 8);
        assert_eq!(lena.redmine_stats.completion_rate, 80.0);
        // option1 = 80*0.75 + 100*0.25 = 85.0
        assert_eq!(lena.productivity_metrics.option1.score, 85.0);
        assert_eq!(
            lena.productivity_metrics.final_score.score,
            lena.productivity_metrics.option1.score
        );

        // marco: no activities → fallback to pure redmine rate (6/6 = 100)
        let marco = &payload.member_productivity[1];
        assert_eq!(marco.total_tasks, 0);
        assert_eq!(marco.productivity_metrics.option1.score, 100.0);
        assert_eq!(marco.productivity_metrics.option2.score, 100.0);

        // classifier partition invariant on every member
        for m in &payload.member_productivity {
            let s = &m.redmine_stats;
            assert_eq!(
                s.assigned_issues,
                s.new_issues + s.in_progress_issues + s.closed_issues
            );
        }

        // summary: mean of member daylog rates (100 + 0) / 2
        assert_eq!(payload.summary.average_completion_rate, 50.0);
        assert_eq!(payload.summary.total_activities, 2);
        assert_eq!(payload.summary.total_completed, 2);
        assert!(payload.data_completeness.redmine_fetch_succeeded);
    }

    #[tokio::test]
    async fn test_degraded_remote_still_reports_with_blend() {
        let f = fixture().await;
        log_done(&f.db, f.member, "2025-01-08").await;
        let api = ScriptedApi::empty()
            .with_user(71, "lena", 0, 0, 0)
            .with_user(72, "marco", 0, 0, 0)
            .degraded();
        let fetcher = IssueFetcher::new(Arc::new(api));

        let payload = build_report(&f.db, &fetcher, f.team, f.lead, &period())
            .await
            .unwrap();

        let marco = payload
            .member_productivity
            .iter()
            .find(|m| m.username == "marco")
            .unwrap();
        assert_eq!(marco.redmine_stats.assigned_issues, 0);
        assert_eq!(marco.redmine_stats.completion_rate, 0.0);
        // Activities exist, so the blend applies with redmineRate = 0 —
        // never the zero-activity fallback: 0*0.75 + 100*0.25 = 25.0.
        assert_eq!(marco.productivity_metrics.option1.score, 25.0);
        assert_eq!(marco.productivity_metrics.option2.score, 50.0);

        assert!(!payload.data_completeness.redmine_fetch_succeeded);
        assert_eq!(payload.data_completeness.members_with_remote_data, 0);
    }
}
