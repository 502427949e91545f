// crates/server/src/lib.rs
//! The zixue server: services, periodic jobs, routes, and shared state
//! around the store adapter, the batching generator queue, and the external
//! collaborators.

pub mod collaborators;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod services;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use state::AppState;
