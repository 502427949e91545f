// crates/server/src/jobs/mod.rs
//! Periodic maintenance jobs.
//!
//! Each job runs in its own task around a `tokio::time::interval` with
//! skipped missed ticks (no backfill) and stops on cancellation. Sweeps go
//! through the cleanup stored functions; the pool refresh is a bare
//! round-trip that keeps idle connections honest.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use zixue_db::Database;

const GAME_SWEEP_EVERY: Duration = Duration::from_secs(6 * 3600);
const AUTH_SWEEP_EVERY: Duration = Duration::from_secs(12 * 3600);
const POOL_REFRESH_EVERY: Duration = Duration::from_secs(10 * 60);

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    run: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // skip the immediate tick
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(job = name, "job stopped");
                    break;
                }
                _ = interval.tick() => run().await,
            }
        }
    })
}

/// Spawn the three maintenance jobs; they run until the token is cancelled.
pub fn spawn_jobs(db: Database, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    let game_db = db.clone();
    let game = spawn_periodic(
        "clean_game_sessions",
        GAME_SWEEP_EVERY,
        shutdown.clone(),
        move || {
            let db = game_db.clone();
            async move {
                match db.cleanup_game_sessions().await {
                    Ok(counts) => info!(
                        abandoned = counts.transitioned,
                        deleted = counts.deleted,
                        "game session sweep"
                    ),
                    Err(e) => error!(error = %e, "game session sweep failed"),
                }
            }
        },
    );

    let auth_db = db.clone();
    let auth = spawn_periodic(
        "clean_auth_sessions",
        AUTH_SWEEP_EVERY,
        shutdown.clone(),
        move || {
            let db = auth_db.clone();
            async move {
                match db.cleanup_auth_sessions().await {
                    Ok(counts) => info!(
                        expired = counts.transitioned,
                        deleted = counts.deleted,
                        "auth session sweep"
                    ),
                    Err(e) => error!(error = %e, "auth session sweep failed"),
                }
            }
        },
    );

    let refresh = spawn_periodic(
        "refresh_connections",
        POOL_REFRESH_EVERY,
        shutdown,
        move || {
            let db = db.clone();
            async move {
                if let Err(e) = db.ping().await {
                    error!(error = %e, "connection refresh failed");
                }
            }
        },
    );

    vec![game, auth, refresh]
}
