// crates/server/src/routes/mod.rs
//! Route modules and the composed application router.

pub mod game;
pub mod health;
pub mod user;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// The full application router.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(game::router())
        .merge(user::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
