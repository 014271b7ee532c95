use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::Error;

// ── Row types ──────────────────────────────────────────────────────

/// Global application role. Admins bypass team-level report authorization
/// and are never scored as report subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalRole {
    Admin,
    User,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Admin => "admin",
            GlobalRole::User => "user",
        }
    }
}

impl FromStr for GlobalRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(GlobalRole::Admin),
            "user" => Ok(GlobalRole::User),
            other => Err(Error::Other(format!("unknown global role: {other}"))),
        }
    }
}

/// Role within a team. `TeamAdmin` members manage rosters but are excluded
/// from lead-based report access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Member,
    TeamAdmin,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Member => "member",
            TeamRole::TeamAdmin => "team_admin",
        }
    }
}

impl FromStr for TeamRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "member" => Ok(TeamRole::Member),
            "team_admin" => Ok(TeamRole::TeamAdmin),
            other => Err(Error::Other(format!("unknown team role: {other}"))),
        }
    }
}

/// Activity lifecycle status. Input matching is case-insensitive and accepts
/// the spaced/condensed spellings older clients send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    InProgress,
    Done,
    Blocked,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::InProgress => "in_progress",
            ActivityStatus::Done => "done",
            ActivityStatus::Blocked => "blocked",
        }
    }
}

impl FromStr for ActivityStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "in_progress" | "inprogress" | "in progress" => Ok(ActivityStatus::InProgress),
            "done" => Ok(ActivityStatus::Done),
            "blocked" => Ok(ActivityStatus::Blocked),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub role: GlobalRole,
}

#[derive(Debug, Clone)]
pub struct TeamRow {
    pub team_id: i64,
    pub name: String,
}

/// A team roster entry joined with the member's user account.
#[derive(Debug, Clone)]
pub struct MemberRow {
    pub user_id: i64,
    pub username: String,
    pub user_role: GlobalRole,
    pub team_role: TeamRole,
    pub is_lead: bool,
}

#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub activity_id: i64,
    pub user_id: i64,
    pub status: ActivityStatus,
    pub date: String,
    pub time: Option<String>,
    pub description: Option<String>,
    pub wfh: bool,
    pub blocked_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ── Users ──────────────────────────────────────────────────────────

pub fn create_user(
    conn: &Connection,
    username: &str,
    role: GlobalRole,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (username, role) VALUES (?1, ?2)",
        params![username, role.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<UserRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT user_id, username, role FROM users WHERE user_id = ?1",
        params![user_id],
        user_from_row,
    )
    .optional()
}

pub fn get_user_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<UserRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT user_id, username, role FROM users WHERE username = ?1",
        params![username],
        user_from_row,
    )
    .optional()
}

fn user_from_row(row: &rusqlite::Row) -> Result<UserRow, rusqlite::Error> {
    let role: String = row.get(2)?;
    Ok(UserRow {
        user_id: row.get(0)?,
        username: row.get(1)?,
        role: role.parse().unwrap_or(GlobalRole::User),
    })
}

// ── Teams ──────────────────────────────────────────────────────────

pub fn create_team(conn: &Connection, name: &str) -> Result<i64, rusqlite::Error> {
    conn.execute("INSERT INTO teams (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn get_team(conn: &Connection, team_id: i64) -> Result<Option<TeamRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT team_id, name FROM teams WHERE team_id = ?1",
        params![team_id],
        |row| {
            Ok(TeamRow {
                team_id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )
    .optional()
}

pub fn add_team_member(
    conn: &Connection,
    team_id: i64,
    user_id: i64,
    role: TeamRole,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO team_members (team_id, user_id, role, is_lead)
         VALUES (?1, ?2, ?3, 0)
         ON CONFLICT(team_id, user_id) DO UPDATE SET role = excluded.role",
        params![team_id, user_id, role.as_str()],
    )?;
    Ok(())
}

pub fn remove_team_member(
    conn: &Connection,
    team_id: i64,
    user_id: i64,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "DELETE FROM team_members WHERE team_id = ?1 AND user_id = ?2",
        params![team_id, user_id],
    )?;
    Ok(n > 0)
}

/// Roster for a team, joined with each member's user account.
pub fn team_members(conn: &Connection, team_id: i64) -> Result<Vec<MemberRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT u.user_id, u.username, u.role, tm.role, tm.is_lead
         FROM team_members tm
         JOIN users u ON u.user_id = tm.user_id
         WHERE tm.team_id = ?1
         ORDER BY u.user_id",
    )?;
    let rows = stmt.query_map(params![team_id], member_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// A single membership row, for authorization checks.
pub fn membership(
    conn: &Connection,
    team_id: i64,
    user_id: i64,
) -> Result<Option<MemberRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT u.user_id, u.username, u.role, tm.role, tm.is_lead
         FROM team_members tm
         JOIN users u ON u.user_id = tm.user_id
         WHERE tm.team_id = ?1 AND tm.user_id = ?2",
        params![team_id, user_id],
        member_from_row,
    )
    .optional()
}

/// True when `lead_id` is the lead of some team that `user_id` belongs to.
/// Team admins do not count even when they hold the lead flag.
pub fn leads_user(
    conn: &Connection,
    lead_id: i64,
    user_id: i64,
) -> Result<bool, rusqlite::Error> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM team_members lead
         JOIN team_members member ON member.team_id = lead.team_id
         WHERE lead.user_id = ?1 AND lead.is_lead = 1 AND lead.role != 'team_admin'
           AND member.user_id = ?2",
        params![lead_id, user_id],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

fn member_from_row(row: &rusqlite::Row) -> Result<MemberRow, rusqlite::Error> {
    let user_role: String = row.get(2)?;
    let team_role: String = row.get(3)?;
    let is_lead: i64 = row.get(4)?;
    Ok(MemberRow {
        user_id: row.get(0)?,
        username: row.get(1)?,
        user_role: user_role.parse().unwrap_or(GlobalRole::User),
        team_role: team_role.parse().unwrap_or(TeamRole::Member),
        is_lead: is_lead != 0,
    })
}

/// Atomically transfer the lead flag: clears every lead on the team and sets
/// the new one inside a single transaction, so a crash can never leave two
/// leads. Fails if the user is not on the roster.
pub fn set_team_lead(
    conn: &mut Connection,
    team_id: i64,
    user_id: i64,
) -> Result<(), rusqlite::Error> {
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE team_members SET is_lead = 0 WHERE team_id = ?1",
        params![team_id],
    )?;
    let n = tx.execute(
        "UPDATE team_members SET is_lead = 1 WHERE team_id = ?1 AND user_id = ?2",
        params![team_id, user_id],
    )?;
    if n == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    tx.commit()?;
    Ok(())
}

// ── Activities ─────────────────────────────────────────────────────

pub fn create_activity(
    conn: &Connection,
    user_id: i64,
    date: &str,
    time: Option<&str>,
    description: Option<&str>,
    wfh: bool,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO activities (user_id, activity_date, activity_time, description, wfh)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, date, time, description, wfh as i32],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_activity(
    conn: &Connection,
    activity_id: i64,
) -> Result<Option<ActivityRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT activity_id, user_id, status, activity_date, activity_time,
                description, wfh, blocked_reason, created_at, updated_at
         FROM activities WHERE activity_id = ?1",
        params![activity_id],
        activity_from_row,
    )
    .optional()
}

/// Set an activity's status, bumping `updated_at`. A blocked reason is stored
/// only for the blocked status and cleared otherwise.
pub fn update_activity_status(
    conn: &Connection,
    activity_id: i64,
    status: ActivityStatus,
    blocked_reason: Option<&str>,
) -> Result<bool, rusqlite::Error> {
    let reason = match status {
        ActivityStatus::Blocked => blocked_reason,
        _ => None,
    };
    let n = conn.execute(
        "UPDATE activities
         SET status = ?2, blocked_reason = ?3, updated_at = datetime('now')
         WHERE activity_id = ?1",
        params![activity_id, status.as_str(), reason],
    )?;
    Ok(n > 0)
}

/// Activities for a set of users within `[from, to]` inclusive. The bounds
/// are whole days: only the date column participates in the comparison.
pub fn activities_for_users(
    conn: &Connection,
    user_ids: &[i64],
    from: &str,
    to: &str,
) -> Result<Vec<ActivityRow>, rusqlite::Error> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = user_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT activity_id, user_id, status, activity_date, activity_time,
                description, wfh, blocked_reason, created_at, updated_at
         FROM activities
         WHERE user_id IN ({placeholders})
           AND activity_date >= ? AND activity_date <= ?
         ORDER BY activity_date, activity_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    for (i, uid) in user_ids.iter().enumerate() {
        stmt.raw_bind_parameter(i + 1, uid)?;
    }
    stmt.raw_bind_parameter(user_ids.len() + 1, from)?;
    stmt.raw_bind_parameter(user_ids.len() + 2, to)?;

    let mut activities = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        activities.push(activity_from_row(row)?);
    }
    Ok(activities)
}

pub fn list_activities_for_user(
    conn: &Connection,
    user_id: i64,
    from: &str,
    to: &str,
) -> Result<Vec<ActivityRow>, rusqlite::Error> {
    activities_for_users(conn, &[user_id], from, to)
}

fn activity_from_row(row: &rusqlite::Row) -> Result<ActivityRow, rusqlite::Error> {
    let status: String = row.get(2)?;
    let wfh: i64 = row.get(6)?;
    Ok(ActivityRow {
        activity_id: row.get(0)?,
        user_id: row.get(1)?,
        status: status.parse().unwrap_or(ActivityStatus::InProgress),
        date: row.get(3)?,
        time: row.get(4)?,
        description: row.get(5)?,
        wfh: wfh != 0,
        blocked_reason: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
