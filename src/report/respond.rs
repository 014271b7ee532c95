use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use crate::error::Error;
use crate::period::Period;
use crate::redmine::fetcher::IssueFetcher;
use crate::storage::Database;

/// Successful reports are client-cacheable for five minutes.
pub const CACHE_CONTROL: &str = "private, max-age=300";

/// The report boundary's envelope: an HTTP-style status, the cache header
/// value for successful responses, and a JSON body (payload or
/// `{error, details}`).
#[derive(Debug, Clone, Serialize)]
pub struct ReportReply {
    pub status: u16,
    pub cache_control: Option<&'static str>,
    pub body: serde_json::Value,
}

impl ReportReply {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Run the report and fold the outcome into a `ReportReply`, logging elapsed
/// time either way. Authorization and not-found failures map to their own
/// statuses; anything unexpected becomes a 500 with the original message in
/// `details`.
pub async fn respond(
    db: &Database,
    fetcher: &IssueFetcher,
    team_id: i64,
    requester_id: i64,
    period: &Period,
) -> ReportReply {
    let started = Instant::now();
    match super::build_report(db, fetcher, team_id, requester_id, period).await {
        Ok(payload) => {
            log::info!(
                "team {team_id} report built in {}ms",
                started.elapsed().as_millis()
            );
            match serde_json::to_value(&payload) {
                Ok(body) => ReportReply {
                    status: 200,
                    cache_control: Some(CACHE_CONTROL),
                    body,
                },
                Err(e) => error_reply(&Error::Other(e.to_string())),
            }
        }
        Err(e) => {
            log::error!(
                "team {team_id} report failed after {}ms: {e}",
                started.elapsed().as_millis()
            );
            error_reply(&e)
        }
    }
}

fn error_reply(e: &Error) -> ReportReply {
    let status = e.status_code();
    let error = match status {
        401 => "unauthenticated",
        403 => "forbidden",
        404 => "not_found",
        _ => "internal_error",
    };
    ReportReply {
        status,
        cache_control: None,
        body: json!({ "error": error, "details": e.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reply_shape() {
        let reply = error_reply(&Error::NotFound("team 7".into()));
        assert_eq!(reply.status, 404);
        assert!(reply.cache_control.is_none());
        assert_eq!(reply.body["error"], "not_found");
        assert_eq!(reply.body["details"], "not found: team 7");
        assert!(!reply.is_success());
    }

    #[test]
    fn test_unexpected_errors_keep_their_message() {
        let reply = error_reply(&Error::Database("disk I/O error".into()));
        assert_eq!(reply.status, 500);
        assert_eq!(reply.body["error"], "internal_error");
        assert_eq!(reply.body["details"], "Database error: disk I/O error");
    }
}
