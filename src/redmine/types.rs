use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

/// A Redmine account as returned by the paged user lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct RedmineUser {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueStatusRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssigneeRef {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// One issue fetched from the tracker. Ephemeral — fetched per report
/// request, never persisted. `closed_on` is present only once closed.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteIssue {
    pub id: u64,
    pub status: IssueStatusRef,
    #[serde(default)]
    pub assigned_to: Option<AssigneeRef>,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_on: Option<DateTime<Utc>>,
}

/// One page of a paginated listing, with the server-reported grand total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// Parameters of one issue listing: assignee plus a created-on window,
/// optionally narrowed to closed issues.
#[derive(Debug, Clone, Copy)]
pub struct IssueQuery {
    pub assigned_to: u64,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub closed_only: bool,
}

impl IssueQuery {
    pub fn all(assigned_to: u64, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            assigned_to,
            from,
            to,
            closed_only: false,
        }
    }

    pub fn closed(assigned_to: u64, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            assigned_to,
            from,
            to,
            closed_only: true,
        }
    }
}

// Wire envelopes for the two list endpoints.

#[derive(Debug, Deserialize)]
pub(crate) struct UsersEnvelope {
    pub users: Vec<RedmineUser>,
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IssuesEnvelope {
    pub issues: Vec<RemoteIssue>,
    pub total_count: u64,
}
