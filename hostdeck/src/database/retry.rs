//! Busy-database retries for repository writes.
//!
//! Every write in the SQLite repositories names the row it touches through a
//! [`WriteTarget`], so a contended write shows up in the logs as
//! `table=metrics action=prune id=<server>` rather than an anonymous retry.

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::runtime::{RandomSource, ThreadRandom};
use crate::{Error, Result};

/// Attempts after the first before a busy write is given up.
const MAX_BUSY_RETRIES: u32 = 8;
const BASE_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Kind of write being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Insert,
    Update,
    Delete,
    Prune,
}

impl WriteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Prune => "prune",
        }
    }
}

/// Table, action and entity id of a repository write.
#[derive(Debug, Clone, Copy)]
pub struct WriteTarget<'a> {
    pub table: &'static str,
    pub action: WriteAction,
    pub id: &'a str,
}

impl<'a> WriteTarget<'a> {
    pub fn server(action: WriteAction, id: &'a str) -> Self {
        Self {
            table: "servers",
            action,
            id,
        }
    }

    pub fn deployment(action: WriteAction, id: &'a str) -> Self {
        Self {
            table: "deployments",
            action,
            id,
        }
    }

    /// Metric writes are keyed by the owning server.
    pub fn metrics(action: WriteAction, server_id: &'a str) -> Self {
        Self {
            table: "metrics",
            action,
            id: server_id,
        }
    }
}

/// SQLITE_BUSY (5) / SQLITE_LOCKED (6), or a driver message saying the same.
fn is_busy(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx_err) = err else {
        return false;
    };
    let message = match sqlx_err {
        sqlx::Error::Database(db_err) => {
            if matches!(db_err.code().as_deref(), Some("5") | Some("6")) {
                return true;
            }
            Cow::Borrowed(db_err.message())
        }
        other => Cow::Owned(other.to_string()),
    };
    let message = message.to_ascii_lowercase();
    message.contains("database is locked") || message.contains("database is busy")
}

/// Delay before retry number `attempt` (zero-based): doubling from the base,
/// plus up to a quarter of jitter, capped at the maximum.
fn backoff(attempt: u32, random: &dyn RandomSource) -> Duration {
    let base_ms = BASE_BACKOFF.as_millis() as u64;
    let max_ms = MAX_BACKOFF.as_millis() as u64;
    let step_ms = base_ms.saturating_mul(1u64 << attempt.min(20)).min(max_ms);
    let jitter_ms = random.range_u64(0, step_ms / 4 + 1);
    Duration::from_millis((step_ms + jitter_ms).min(max_ms))
}

/// Run a repository write, retrying while SQLite reports the database busy.
pub async fn retry_on_sqlite_busy<T, F, Fut>(target: WriteTarget<'_>, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with(target, &ThreadRandom, op).await
}

async fn retry_with<T, F, Fut>(target: WriteTarget<'_>, random: &dyn RandomSource, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_busy(&err) => err,
            Err(err) => return Err(err),
        };

        if attempt >= MAX_BUSY_RETRIES {
            warn!(
                table = target.table,
                action = target.action.as_str(),
                id = %target.id,
                attempts = attempt + 1,
                error = %err,
                "Database still busy, giving up"
            );
            return Err(err);
        }

        let delay = backoff(attempt, random);
        debug!(
            table = target.table,
            action = target.action.as_str(),
            id = %target.id,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "Database busy, retrying write"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FixedRandom;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn busy() -> Error {
        Error::DatabaseSqlx(sqlx::Error::Protocol("database is locked".to_string()))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let no_jitter = FixedRandom(0.0);
        assert_eq!(backoff(0, &no_jitter), Duration::from_millis(10));
        assert_eq!(backoff(3, &no_jitter), Duration::from_millis(80));
        assert_eq!(backoff(12, &no_jitter), MAX_BACKOFF);
        assert!(backoff(2, &FixedRandom(0.99)) <= Duration::from_millis(50));
    }

    #[test]
    fn test_busy_detection() {
        assert!(is_busy(&busy()));
        assert!(!is_busy(&Error::DatabaseSqlx(sqlx::Error::RowNotFound)));
        assert!(!is_busy(&Error::validation("nope")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_write_is_retried_until_it_succeeds() {
        let calls = AtomicU32::new(0);
        let value = retry_with(
            WriteTarget::metrics(WriteAction::Insert, "server-1"),
            &FixedRandom(0.0),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err(busy()) } else { Ok(n) } }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_write_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with(
            WriteTarget::server(WriteAction::Update, "server-1"),
            &FixedRandom(0.0),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(busy()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_BUSY_RETRIES + 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_sqlite_busy(
            WriteTarget::deployment(WriteAction::Delete, "deployment-1"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::validation("nope")) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
