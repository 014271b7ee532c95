use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Clock seam so cache expiry is testable with a fake.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock used in production.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// TTL cache mapping a Redmine login to its remote user id. Owned by one
/// fetcher instance; concurrent read-then-write races are benign because
/// writes for a given username are idempotent.
pub struct UserIdCache {
    ttl: Duration,
    clock: Box<dyn Clock>,
    entries: Mutex<HashMap<String, (u64, Instant)>>,
}

impl UserIdCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Box::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Box<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a fresh entry. Expired entries are evicted on the way out.
    pub fn get(&self, username: &str) -> Option<u64> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().ok()?;
        match entries.get(username) {
            Some(&(id, written_at)) if now.duration_since(written_at) < self.ttl => Some(id),
            Some(_) => {
                entries.remove(username);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, username: &str, remote_id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(username.to_string(), (remote_id, self.clock.now()));
        }
    }

    pub fn evict(&self, username: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(username);
        }
    }
}
