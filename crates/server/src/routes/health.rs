// crates/server/src/routes/health.rs
//! Health endpoints.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::process::Command;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health - liveness, version, uptime.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
    })
}

/// GET /health/database - round-trips the pool.
async fn health_database(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, (StatusCode, String)> {
    match state.db.ping().await {
        Ok(()) => Ok(Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.uptime_secs(),
        })),
        Err(e) => Err((StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct GitRevisionResponse {
    pub main: String,
}

/// The deployed revision, resolved once and cached for the process
/// lifetime.
fn git_revision() -> &'static Result<String, String> {
    static REVISION: OnceLock<Result<String, String>> = OnceLock::new();
    REVISION.get_or_init(|| {
        let output = Command::new("git")
            .args(["describe", "--always", "--dirty"])
            .output()
            .map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    })
}

/// GET /health/git - the revision the server was started from.
async fn health_git() -> Result<Json<GitRevisionResponse>, (StatusCode, String)> {
    match git_revision() {
        Ok(revision) => Ok(Json(GitRevisionResponse {
            main: revision.clone(),
        })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to resolve git revision: {e}"),
        )),
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/health/database", get(health_database))
        .route("/health/git", get(health_git))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".into(),
            version: "0.4.0".into(),
            uptime_secs: 17,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":17"));
    }

    #[test]
    fn test_git_revision_is_cached() {
        // Whatever the first resolution yields, repeat calls return the
        // same cached value.
        let first = git_revision();
        let second = git_revision();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_git_revision_response_serialization() {
        let response = GitRevisionResponse {
            main: "v0.4.0-3-gabc1234-dirty".into(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"main\":\"v0.4.0-3-gabc1234-dirty\""));
    }
}
