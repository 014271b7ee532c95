pub mod cache;
pub mod fetcher;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{Error, Result};
use types::{IssueQuery, IssuesEnvelope, Page, RedmineUser, RemoteIssue, UsersEnvelope};

/// Page size for all paginated Redmine requests.
pub const PAGE_SIZE: u32 = 100;

/// Timeout applied to every individual Redmine request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Overall budget for one batch fetch across a whole team.
pub const BATCH_TIMEOUT: Duration = Duration::from_secs(45);

/// Freshness window for the username → remote-id cache.
pub const USER_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default cap on simultaneous in-flight per-member fetch pairs.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Credentials attached to every request: HTTP Basic or an API-key header,
/// whichever is configured.
#[derive(Debug, Clone)]
pub enum Credentials {
    ApiKey(String),
    Basic { username: String, password: String },
}

/// Narrow seam over the two Redmine list endpoints the fetcher consumes.
/// The production implementation is [`Client`]; tests substitute an
/// in-process fake.
#[async_trait]
pub trait RedmineApi: Send + Sync {
    /// One page of users whose login matches the filter.
    async fn users_page(&self, login: &str, offset: u32, limit: u32) -> Result<Page<RedmineUser>>;

    /// One page of issues assigned to a user within a created-on window.
    async fn issues_page(
        &self,
        query: &IssueQuery,
        offset: u32,
        limit: u32,
    ) -> Result<Page<RemoteIssue>>;
}

/// HTTP client for the Redmine REST API.
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl Client {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| Error::Config(format!("invalid Redmine URL: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    /// Build a client from `TEAMPULSE_REDMINE_URL` plus either
    /// `TEAMPULSE_REDMINE_API_KEY` or
    /// `TEAMPULSE_REDMINE_USER`/`TEAMPULSE_REDMINE_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("TEAMPULSE_REDMINE_URL")
            .map_err(|_| Error::Config("TEAMPULSE_REDMINE_URL is not set".into()))?;
        let credentials = if let Ok(key) = std::env::var("TEAMPULSE_REDMINE_API_KEY") {
            Credentials::ApiKey(key)
        } else {
            let username = std::env::var("TEAMPULSE_REDMINE_USER").map_err(|_| {
                Error::Config(
                    "set TEAMPULSE_REDMINE_API_KEY or TEAMPULSE_REDMINE_USER/PASSWORD".into(),
                )
            })?;
            let password = std::env::var("TEAMPULSE_REDMINE_PASSWORD").unwrap_or_default();
            Credentials::Basic { username, password }
        };
        Self::new(&base_url, credentials)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid endpoint {path}: {e}")))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Credentials::ApiKey(key) => req.header("X-Redmine-API-Key", key),
            Credentials::Basic { username, password } => req.basic_auth(username, Some(password)),
        }
    }
}

#[async_trait]
impl RedmineApi for Client {
    async fn users_page(&self, login: &str, offset: u32, limit: u32) -> Result<Page<RedmineUser>> {
        let url = self.endpoint("users.json")?;
        let resp = self
            .authed(self.http.get(url))
            .query(&[("login", login)])
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?
            .error_for_status()?;
        let envelope: UsersEnvelope = resp.json().await?;
        Ok(Page {
            items: envelope.users,
            total_count: envelope.total_count,
        })
    }

    async fn issues_page(
        &self,
        query: &IssueQuery,
        offset: u32,
        limit: u32,
    ) -> Result<Page<RemoteIssue>> {
        let url = self.endpoint("issues.json")?;
        // Redmine range filter syntax: `><from|to`, dates inclusive.
        let created_on = format!("><{}|{}", query.from, query.to);
        let mut req = self
            .authed(self.http.get(url))
            .query(&[("assigned_to_id", query.assigned_to.to_string())])
            .query(&[("created_on", created_on)])
            .query(&[("limit", limit), ("offset", offset)]);
        if query.closed_only {
            req = req.query(&[("status_id", "closed")]);
        }
        let resp = req.send().await?.error_for_status()?;
        let envelope: IssuesEnvelope = resp.json().await?;
        Ok(Page {
            items: envelope.issues,
            total_count: envelope.total_count,
        })
    }
}
