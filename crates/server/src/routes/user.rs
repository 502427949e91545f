// crates/server/src/routes/user.rs
//! User routes: profile/status, registration, tasks, wrong words, settings.

use crate::error::ApiResult;
use crate::services::{SettingsPatch, WrongWordEntry};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use zixue_core::{level_for_exp, ScannedChar};
use zixue_db::{PastWrongWordRow, TaskProgressResult, TaskRow, UserRow, UserSettingsRow, WrongWordDetail};

#[derive(Debug, Deserialize)]
struct UserParams {
    user_id: Uuid,
}

/// GET /user/profile?user_id=
async fn profile(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserParams>,
) -> ApiResult<Json<UserRow>> {
    Ok(Json(state.users.get(params.user_id).await?))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    user_id: Uuid,
    name: String,
    exp: i64,
    level: i64,
    wrong_word_count: i64,
}

/// GET /user/status?user_id= - profile summary plus dictionary size.
async fn status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserParams>,
) -> ApiResult<Json<StatusResponse>> {
    let user = state.users.get(params.user_id).await?;
    let wrong_word_count = state.wrong_words.count(params.user_id).await?;
    Ok(Json(StatusResponse {
        user_id: user.user_id,
        name: user.name,
        exp: user.exp,
        // The stored level is authoritative; recompute defensively only
        // when the row predates the level function.
        level: user.level.max(level_for_exp(user.exp)),
        wrong_word_count,
    }))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    #[serde(flatten)]
    user: UserRow,
    existed: bool,
}

/// POST /user/register - idempotent on email.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let (user, existed) = state.users.register(&body.name, &body.email).await?;
    let code = if existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((code, Json(RegisterResponse { user, existed })))
}

/// GET /user/tasks/current?user_id=
async fn current_tasks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserParams>,
) -> ApiResult<Json<Vec<TaskRow>>> {
    Ok(Json(state.tasks.current(params.user_id).await?))
}

#[derive(Debug, Deserialize)]
struct TaskProgressRequest {
    user_id: Uuid,
    task_id: Uuid,
    progress: i64,
}

/// POST /user/tasks/progress
async fn task_progress(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TaskProgressRequest>,
) -> ApiResult<Json<TaskProgressResult>> {
    Ok(Json(
        state
            .tasks
            .set_progress(body.user_id, body.task_id, body.progress)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct WrongWordPageParams {
    user_id: Uuid,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    no_paging: bool,
}

fn default_limit() -> i64 {
    50
}

/// GET /user/wrong-words?user_id=&limit=&offset=
async fn wrong_words(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WrongWordPageParams>,
) -> ApiResult<Json<Vec<WrongWordDetail>>> {
    Ok(Json(
        state
            .wrong_words
            .page(params.user_id, params.limit, params.offset, params.no_paging)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: i64,
}

/// GET /user/wrong-words/count?user_id=
async fn wrong_word_count(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserParams>,
) -> ApiResult<Json<CountResponse>> {
    Ok(Json(CountResponse {
        count: state.wrong_words.count(params.user_id).await?,
    }))
}

#[derive(Debug, Deserialize)]
struct AddWrongWordsRequest {
    user_id: Uuid,
    words: Vec<WrongWordEntry>,
}

/// POST /user/wrong-words - batch upsert.
async fn add_wrong_words(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddWrongWordsRequest>,
) -> ApiResult<Json<Vec<PastWrongWordRow>>> {
    Ok(Json(
        state.wrong_words.batch_add(body.user_id, body.words).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct ScanRequest {
    user_id: Uuid,
    image_url: String,
}

#[derive(Debug, Serialize)]
struct ScanResponse {
    added: Vec<PastWrongWordRow>,
    not_found: Vec<ScannedChar>,
}

/// POST /user/wrong-words/scanning - run the page scanner and record every
/// recognized character as a wrong word.
async fn scan_wrong_words(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScanRequest>,
) -> ApiResult<Json<ScanResponse>> {
    let scan = state
        .recognizer
        .scan_page(&body.image_url, body.user_id)
        .await?;
    if scan.items.is_empty() && scan.not_found.is_empty() {
        return Err(crate::error::ApiError::Unprocessable(
            "no characters recognized on the page".into(),
        ));
    }
    let entries = scan
        .items
        .iter()
        .map(|item| WrongWordEntry {
            word: item.word,
            wrong_image_url: item.wrong_image_url.clone(),
        })
        .collect();
    let added = state.wrong_words.batch_add(body.user_id, entries).await?;
    Ok(Json(ScanResponse {
        added,
        not_found: scan.not_found,
    }))
}

/// GET /user/settings?user_id=
async fn get_settings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserParams>,
) -> ApiResult<Json<UserSettingsRow>> {
    Ok(Json(state.settings.get(params.user_id).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateSettingsRequest {
    user_id: Uuid,
    #[serde(flatten)]
    patch: SettingsPatch,
}

/// POST /user/settings - partial upsert.
async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<UserSettingsRow>> {
    Ok(Json(state.settings.upsert(body.user_id, body.patch).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/user/profile", get(profile))
        .route("/user/status", get(status))
        .route("/user/register", post(register))
        .route("/user/tasks/current", get(current_tasks))
        .route("/user/tasks/progress", post(task_progress))
        .route("/user/wrong-words", get(wrong_words).post(add_wrong_words))
        .route("/user/wrong-words/count", get(wrong_word_count))
        .route("/user/wrong-words/scanning", post(scan_wrong_words))
        .route("/user/settings", get(get_settings).post(update_settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_word_page_params_defaults() {
        let params: WrongWordPageParams = serde_json::from_value(serde_json::json!({
            "user_id": "7f8a4ea2-58d6-4f52-9a07-8f7f4f3f2a10"
        }))
        .unwrap();
        assert_eq!(params.limit, 50);
        assert_eq!(params.offset, 0);
        assert!(!params.no_paging);
    }

    #[test]
    fn test_update_settings_request_flattens_patch() {
        let body: UpdateSettingsRequest = serde_json::from_value(serde_json::json!({
            "user_id": "7f8a4ea2-58d6-4f52-9a07-8f7f4f3f2a10",
            "language": "zh-tw",
            "settings": {"volume": 0.5}
        }))
        .unwrap();
        assert_eq!(body.patch.language.as_deref(), Some("zh-tw"));
        assert!(body.patch.theme.is_none());
        assert_eq!(body.patch.settings.unwrap()["volume"], 0.5);
    }
}
