// crates/db/src/lib.rs
//! PostgreSQL store adapter.
//!
//! One [`Database`] handle wraps the connection pool shared by every task.
//! The adapter is the only serialization seam in the system: JSON-typed
//! columns are encoded on write and parsed on read in `value.rs`, and the
//! rest of the workspace deals in typed rows (`rows.rs`) or domain values.

pub mod migrations;
pub mod ops;
pub mod rows;
pub mod rpc;
pub mod value;

pub use ops::{Fetch, QueryOutput, Table};
pub use rows::{
    FlagStatus, FlaggedQuestionRow, GameDataRow, GameQaHistoryRow, GameSessionRow,
    GameSessionStatus, PastWrongWordRow, QuestionRow, SessionRow, TaskRow, TaskStatus, UserRow,
    UserSettingsRow, WordRow,
};
pub use rpc::{CleanupCounts, ExperienceUpdate, QuestionStatsUpdate, TaskProgressResult, WrongWordDetail};
pub use value::SqlValue;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Pool sizing and per-connection session settings.
const POOL_MIN_CONNECTIONS: u32 = 1;
const POOL_MAX_CONNECTIONS: u32 = 6;
const POOL_IDLE_LIFETIME: Duration = Duration::from_secs(5 * 60);
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
/// Outer wall-clock budget wrapped around every adapter operation.
pub(crate) const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECTION_SETUP: &str = "\
SET statement_timeout = '60s';
SET idle_in_transaction_session_timeout = '30s';
SET lock_timeout = '30s';
SET tcp_keepalives_idle = '300';
SET tcp_keepalives_interval = '30';
SET tcp_keepalives_count = '3';
";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database unreachable: {0}")]
    Connectivity(String),

    #[error("database operation timed out: {0}")]
    Timeout(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("bad query: {0}")]
    Query(String),

    #[error("row decode failed: {0}")]
    Decode(String),
}

pub type DbResult<T> = Result<T, DbError>;

pub(crate) fn map_sqlx_err(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::PoolTimedOut => DbError::Timeout("pool acquire timed out".into()),
        sqlx::Error::PoolClosed => DbError::Connectivity("pool closed".into()),
        sqlx::Error::Io(err) => DbError::Connectivity(err.to_string()),
        sqlx::Error::Tls(err) => DbError::Connectivity(err.to_string()),
        sqlx::Error::Database(db) => {
            if let Some(code) = db.code() {
                // 23xxx: integrity constraint violations.
                if code.starts_with("23") {
                    return DbError::Constraint(db.to_string());
                }
                // 57014: statement cancelled by statement_timeout.
                if code == "57014" {
                    return DbError::Timeout(db.to_string());
                }
            }
            DbError::Query(db.to_string())
        }
        sqlx::Error::RowNotFound => DbError::Query("row not found".into()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            DbError::Decode(e.to_string())
        }
        other => DbError::Connectivity(other.to_string()),
    }
}

/// Main database handle wrapping the PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database and run migrations.
    pub async fn connect(dsn: &str) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .idle_timeout(POOL_IDLE_LIFETIME)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute(CONNECTION_SETUP).await?;
                    Ok(())
                })
            })
            .connect(dsn)
            .await
            .map_err(map_sqlx_err)?;

        let db = Self { pool };
        db.run_migrations().await?;
        info!("database pool ready");
        Ok(db)
    }

    /// Run pending inline migrations (see `migrations.rs`).
    ///
    /// A `_migrations` table tracks the highest applied version so that
    /// non-idempotent statements run exactly once.
    pub async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version BIGINT PRIMARY KEY)")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let (current,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i as i64 + 1;
            if version <= current {
                continue;
            }
            sqlx::raw_sql(migration)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
            sqlx::query("INSERT INTO _migrations (version) VALUES ($1)")
                .bind(version)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
            info!(version, "applied migration");
        }
        Ok(())
    }

    /// Round-trip a trivial query to confirm the pool is healthy.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    /// Wait up to `timeout` for in-flight operations to hand their
    /// connections back to the pool.
    pub async fn prepare_for_shutdown(&self, timeout: Duration) {
        let started = tokio::time::Instant::now();
        loop {
            let total = self.pool.size() as usize;
            let idle = self.pool.num_idle();
            let active = total.saturating_sub(idle);
            if active == 0 {
                return;
            }
            if started.elapsed() >= timeout {
                warn!(active, "active connections remain after shutdown grace period");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Close the pool; outstanding borrows are terminated as they return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_sqlx_err(sqlx::Error::PoolTimedOut),
            DbError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_err(sqlx::Error::PoolClosed),
            DbError::Connectivity(_)
        ));
        assert!(matches!(
            map_sqlx_err(sqlx::Error::RowNotFound),
            DbError::Query(_)
        ));
    }

    #[test]
    fn test_connection_setup_sets_required_timeouts() {
        assert!(CONNECTION_SETUP.contains("statement_timeout = '60s'"));
        assert!(CONNECTION_SETUP.contains("idle_in_transaction_session_timeout = '30s'"));
        assert!(CONNECTION_SETUP.contains("tcp_keepalives_idle = '300'"));
        assert!(CONNECTION_SETUP.contains("tcp_keepalives_interval = '30'"));
        assert!(CONNECTION_SETUP.contains("tcp_keepalives_count = '3'"));
    }
}
