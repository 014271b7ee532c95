pub mod date_util;
pub mod error;
pub mod period;
pub mod redmine;
pub mod report;
pub mod storage;

pub use error::{Error, Result};
pub use period::Period;
pub use redmine::fetcher::IssueFetcher;
pub use redmine::{Client as RedmineClient, Credentials, RedmineApi};
pub use report::respond::{ReportReply, CACHE_CONTROL};
pub use report::types::ReportPayload;
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::{ActivityRow, ActivityStatus, GlobalRole, MemberRow, TeamRole};

use storage::repository;

/// Main entry point: local activity tracking plus Redmine-backed productivity
/// reporting over one database.
pub struct TeamPulse {
    db: Database,
    fetcher: IssueFetcher,
}

impl TeamPulse {
    pub fn new(db: Database, fetcher: IssueFetcher) -> Self {
        Self { db, fetcher }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub async fn add_user(&self, username: &str, role: GlobalRole) -> Result<i64> {
        let username = username.to_string();
        let id = self
            .db
            .writer()
            .call(move |conn| repository::create_user(conn, &username, role))
            .await?;
        Ok(id)
    }

    pub async fn create_team(&self, name: &str) -> Result<i64> {
        let name = name.to_string();
        let id = self
            .db
            .writer()
            .call(move |conn| repository::create_team(conn, &name))
            .await?;
        Ok(id)
    }

    /// Add a user to a team, or update their role if already a member.
    pub async fn add_member(&self, team_id: i64, user_id: i64, role: TeamRole) -> Result<()> {
        self.require_user(user_id).await?;
        self.require_team(team_id).await?;
        self.db
            .writer()
            .call(move |conn| repository::add_team_member(conn, team_id, user_id, role))
            .await?;
        Ok(())
    }

    pub async fn remove_member(&self, team_id: i64, user_id: i64) -> Result<()> {
        let removed = self
            .db
            .writer()
            .call(move |conn| repository::remove_team_member(conn, team_id, user_id))
            .await?;
        if !removed {
            return Err(Error::NotFound(format!(
                "user {user_id} on team {team_id}"
            )));
        }
        Ok(())
    }

    /// Make `user_id` the team's single lead. Any previous lead is demoted in
    /// the same transaction.
    pub async fn set_lead(&self, team_id: i64, user_id: i64) -> Result<()> {
        let member = self
            .db
            .reader()
            .call(move |conn| repository::membership(conn, team_id, user_id))
            .await?;
        if member.is_none() {
            return Err(Error::NotFound(format!(
                "user {user_id} on team {team_id}"
            )));
        }
        self.db
            .writer()
            .call(move |conn| repository::set_team_lead(conn, team_id, user_id))
            .await?;
        Ok(())
    }

    pub async fn members(&self, team_id: i64) -> Result<Vec<MemberRow>> {
        self.require_team(team_id).await?;
        let members = self
            .db
            .reader()
            .call(move |conn| repository::team_members(conn, team_id))
            .await?;
        Ok(members)
    }

    /// Record a daylog activity. `time` is an optional `HH:MM` start time and
    /// `date` is `YYYY-MM-DD`; both are validated before hitting the database.
    pub async fn log_activity(
        &self,
        user_id: i64,
        date: &str,
        time: Option<&str>,
        description: Option<&str>,
        wfh: bool,
    ) -> Result<i64> {
        self.require_user(user_id).await?;
        date_util::parse_date(date)
            .ok_or_else(|| Error::Other(format!("invalid date (expected YYYY-MM-DD): {date}")))?;
        if let Some(t) = time {
            date_util::parse_clock_time(t)
                .ok_or_else(|| Error::Other(format!("invalid time (expected HH:MM): {t}")))?;
        }
        let date = date.to_string();
        let time = time.map(str::to_string);
        let description = description.map(str::to_string);
        let id = self
            .db
            .writer()
            .call(move |conn| {
                repository::create_activity(
                    conn,
                    user_id,
                    &date,
                    time.as_deref(),
                    description.as_deref(),
                    wfh,
                )
            })
            .await?;
        Ok(id)
    }

    /// Change an activity's status on behalf of `actor_id`. Permitted for the
    /// activity's owner, a lead of a team the owner belongs to, or a global
    /// admin.
    pub async fn set_activity_status(
        &self,
        actor_id: i64,
        activity_id: i64,
        status: ActivityStatus,
        blocked_reason: Option<&str>,
    ) -> Result<()> {
        let activity = self
            .db
            .reader()
            .call(move |conn| repository::get_activity(conn, activity_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("activity {activity_id}")))?;

        if activity.user_id != actor_id {
            let actor = self
                .db
                .reader()
                .call(move |conn| repository::get_user(conn, actor_id))
                .await?
                .ok_or(Error::Unauthenticated)?;
            if actor.role != GlobalRole::Admin {
                let owner_id = activity.user_id;
                let leads = self
                    .db
                    .reader()
                    .call(move |conn| repository::leads_user(conn, actor_id, owner_id))
                    .await?;
                if !leads {
                    return Err(Error::Forbidden(format!(
                        "user {actor_id} may not update activity {activity_id}"
                    )));
                }
            }
        }

        let reason = blocked_reason.map(str::to_string);
        self.db
            .writer()
            .call(move |conn| {
                repository::update_activity_status(conn, activity_id, status, reason.as_deref())
            })
            .await?;
        Ok(())
    }

    /// A user's activities within the period, oldest first.
    pub async fn list_activities(&self, user_id: i64, period: &Period) -> Result<Vec<ActivityRow>> {
        self.require_user(user_id).await?;
        let (from, to) = period.date_range();
        let from = from.to_string();
        let to = to.to_string();
        let activities = self
            .db
            .reader()
            .call(move |conn| repository::list_activities_for_user(conn, user_id, &from, &to))
            .await?;
        Ok(activities)
    }

    /// Team productivity report as a typed payload. Fails with the usual
    /// authorization and not-found errors.
    pub async fn team_report(
        &self,
        team_id: i64,
        requester_id: i64,
        period: &Period,
    ) -> Result<ReportPayload> {
        report::build_report(&self.db, &self.fetcher, team_id, requester_id, period).await
    }

    /// Team productivity report folded into the HTTP-style reply envelope.
    /// Never fails; errors become status codes.
    pub async fn team_report_reply(
        &self,
        team_id: i64,
        requester_id: i64,
        period: &Period,
    ) -> ReportReply {
        report::respond::respond(&self.db, &self.fetcher, team_id, requester_id, period).await
    }

    async fn require_user(&self, user_id: i64) -> Result<()> {
        self.db
            .reader()
            .call(move |conn| repository::get_user(conn, user_id))
            .await?
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }

    async fn require_team(&self, team_id: i64) -> Result<()> {
        self.db
            .reader()
            .call(move |conn| repository::get_team(conn, team_id))
            .await?
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("team {team_id}")))
    }
}
