use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::cache::UserIdCache;
use super::types::{IssueQuery, RemoteIssue};
use super::{RedmineApi, BATCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_FETCHES, PAGE_SIZE, REQUEST_TIMEOUT, USER_CACHE_TTL};

/// Both issue lists for one member, plus whether the remote fetch ran to
/// completion. Unresolved usernames and degraded fetches still get an entry
/// so downstream code can rely on every input username being present.
#[derive(Debug, Clone, Default)]
pub struct UserIssues {
    pub issues: Vec<RemoteIssue>,
    pub closed_issues: Vec<RemoteIssue>,
    pub fetch_succeeded: bool,
}

/// Outcome of one username resolution attempt. "Searched everything, no such
/// account" and "the lookup itself broke" feed different completeness
/// signals downstream.
enum Resolution {
    Found(u64),
    NotFound,
    Failed,
}

/// Fetches Redmine issue data for report members: login resolution through a
/// TTL cache, sequential pagination per user, and bounded concurrent fan-out
/// across a team under one deadline.
pub struct IssueFetcher {
    api: Arc<dyn RedmineApi>,
    cache: UserIdCache,
    max_concurrent: usize,
}

impl IssueFetcher {
    pub fn new(api: Arc<dyn RedmineApi>) -> Self {
        Self {
            api,
            cache: UserIdCache::new(USER_CACHE_TTL),
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    pub fn with_cache(mut self, cache: UserIdCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Resolve a login to its remote user id, consulting the cache first.
    /// Pages through the user listing until an exact login match is found or
    /// pages are exhausted. Lookup failures are logged and yield `None` so
    /// the caller can skip the user; they never escalate.
    pub async fn resolve_user_id(&self, username: &str) -> Option<u64> {
        match self.resolve_bounded(username, None).await {
            Resolution::Found(id) => Some(id),
            Resolution::NotFound | Resolution::Failed => None,
        }
    }

    /// Deadline-aware resolution: each user-page request is bounded by
    /// min(8s, remaining budget), the same contract as issue pagination, so
    /// a slow users endpoint cannot run the batch past its deadline.
    async fn resolve_bounded(&self, username: &str, deadline: Option<Instant>) -> Resolution {
        if let Some(id) = self.cache.get(username) {
            log::debug!("user id cache hit for {username}: {id}");
            return Resolution::Found(id);
        }

        let mut offset: u32 = 0;
        loop {
            let call = self.api.users_page(username, offset, PAGE_SIZE);
            let page = match deadline {
                Some(deadline) => {
                    let cutoff = (Instant::now() + REQUEST_TIMEOUT).min(deadline);
                    match tokio::time::timeout_at(cutoff, call).await {
                        Ok(result) => result,
                        Err(_) => {
                            log::warn!(
                                "user lookup for {username} timed out at offset {offset}"
                            );
                            return Resolution::Failed;
                        }
                    }
                }
                None => call.await,
            };
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    log::warn!("user lookup failed for {username}: {e}");
                    return Resolution::Failed;
                }
            };
            if let Some(user) = page.items.iter().find(|u| u.login == username) {
                self.cache.set(username, user.id);
                return Resolution::Found(user.id);
            }
            offset += page.items.len() as u32;
            if page.items.is_empty() || offset as u64 >= page.total_count {
                log::debug!("no exact login match for {username}");
                return Resolution::NotFound;
            }
        }
    }

    /// All issues assigned to the user with `created_on` inside the window.
    /// On a page failure the accumulated prefix is returned as-is — partial
    /// data is acceptable for best-effort reporting.
    pub async fn fetch_all_issues(
        &self,
        remote_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<RemoteIssue> {
        self.fetch_issues(&IssueQuery::all(remote_id, from, to), None)
            .await
            .0
    }

    /// Same pagination contract as [`fetch_all_issues`], narrowed to closed
    /// issues.
    ///
    /// [`fetch_all_issues`]: Self::fetch_all_issues
    pub async fn fetch_closed_issues(
        &self,
        remote_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<RemoteIssue> {
        self.fetch_issues(&IssueQuery::closed(remote_id, from, to), None)
            .await
            .0
    }

    /// Paginate one issue listing to completion. Returns the accumulated
    /// issues and whether the listing ran to the server-reported total.
    async fn fetch_issues(
        &self,
        query: &IssueQuery,
        deadline: Option<Instant>,
    ) -> (Vec<RemoteIssue>, bool) {
        let mut accumulated: Vec<RemoteIssue> = Vec::new();
        let mut offset: u32 = 0;
        loop {
            let call = self.api.issues_page(query, offset, PAGE_SIZE);
            let page = match deadline {
                Some(deadline) => {
                    let cutoff = (Instant::now() + REQUEST_TIMEOUT).min(deadline);
                    match tokio::time::timeout_at(cutoff, call).await {
                        Ok(result) => result,
                        Err(_) => {
                            log::warn!(
                                "issue fetch for user {} timed out at offset {offset}",
                                query.assigned_to
                            );
                            return (accumulated, false);
                        }
                    }
                }
                None => call.await,
            };
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    // Degrade-gracefully policy: treat a failed page as
                    // "no more pages" and keep what we have.
                    log::warn!(
                        "issue fetch for user {} failed at offset {offset}: {e}",
                        query.assigned_to
                    );
                    return (accumulated, false);
                }
            };
            let fetched = page.items.len();
            accumulated.extend(page.items);
            if fetched == 0 || accumulated.len() as u64 >= page.total_count {
                return (accumulated, true);
            }
            offset += fetched as u32;
        }
    }

    /// Resolve every username (sequentially — the cache absorbs repeat cost),
    /// then fetch the all/closed issue pair for each resolved user
    /// concurrently, capped by the configured semaphore. One deadline bounds
    /// the whole batch, resolution included; logins the budget cuts off
    /// degrade to empty failed entries. Every input username gets an entry
    /// in the result.
    pub async fn batch_fetch(
        &self,
        usernames: &[String],
        from: NaiveDate,
        to: NaiveDate,
    ) -> HashMap<String, UserIssues> {
        let deadline = Instant::now() + BATCH_TIMEOUT;

        let mut resolved: Vec<(String, Resolution)> = Vec::with_capacity(usernames.len());
        for username in usernames {
            let resolution = self.resolve_bounded(username, Some(deadline)).await;
            resolved.push((username.clone(), resolution));
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let fetches = resolved.into_iter().map(|(username, resolution)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let remote_id = match resolution {
                    Resolution::Found(remote_id) => remote_id,
                    // No such account: nothing to fetch and nothing failed.
                    Resolution::NotFound => {
                        return (
                            username,
                            UserIssues {
                                fetch_succeeded: true,
                                ..UserIssues::default()
                            },
                        )
                    }
                    Resolution::Failed => return (username, UserIssues::default()),
                };
                // The semaphore is never closed; a failed acquire just means
                // we proceed uncapped rather than dropping the member.
                let _permit = semaphore.acquire().await.ok();
                let all_query = IssueQuery::all(remote_id, from, to);
                let closed_query = IssueQuery::closed(remote_id, from, to);
                let (all, closed) = tokio::join!(
                    self.fetch_issues(&all_query, Some(deadline)),
                    self.fetch_issues(&closed_query, Some(deadline)),
                );
                let (issues, all_complete) = all;
                let (closed_issues, closed_complete) = closed;
                (
                    username,
                    UserIssues {
                        issues,
                        closed_issues,
                        fetch_succeeded: all_complete && closed_complete,
                    },
                )
            }
        });

        futures::future::join_all(fetches).await.into_iter().collect()
    }
}
