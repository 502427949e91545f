// crates/server/src/routes/game.rs
//! Game routes: start, submit, flag, handwriting check.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use zixue_core::{now_ts, HandwriteVerdict, Question};
use zixue_db::{FlagStatus, GameDataRow};

const MAX_QUESTION_COUNT: usize = 20;

#[derive(Debug, Deserialize)]
struct StartParams {
    #[serde(rename = "qCount", default = "default_q_count")]
    q_count: i64,
}

fn default_q_count() -> i64 {
    1
}

/// The game payload: the selected questions plus identifiers, echoed back
/// on submit with the submitted answers filled in.
#[derive(Debug, Serialize, Deserialize)]
pub struct GameObject {
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub timestamp: i64,
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_hearts: Option<i64>,
}

/// GET /game/start/{user_id}?qCount=N
async fn start_game(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<StartParams>,
) -> ApiResult<Json<GameObject>> {
    if !(1..=MAX_QUESTION_COUNT as i64).contains(&params.q_count) {
        return Err(ApiError::Validation(format!(
            "qCount must be between 1 and {MAX_QUESTION_COUNT}"
        )));
    }
    let count = params.q_count as usize;

    let questions = match state.engine.select_for_user(user_id, count).await {
        Ok(questions) => questions,
        Err(ApiError::NoQuestions) => {
            return Err(ApiError::NotFound("no questions generated for the user".into()))
        }
        Err(other) => return Err(other),
    };
    let question_ids = questions.iter().map(|q| q.question_id).collect();
    let game_id = state.games.create_session(user_id, question_ids).await?;

    Ok(Json(GameObject {
        game_id,
        user_id,
        timestamp: now_ts(),
        questions,
        time_spent: None,
        remaining_hearts: None,
    }))
}

/// POST /game/submit-result
async fn submit_result(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GameObject>,
) -> ApiResult<Json<GameDataRow>> {
    let data = state
        .games
        .submit(body.game_id, body.questions, body.time_spent, body.remaining_hearts)
        .await?;
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
struct FlagRequest {
    question_id: Uuid,
    user_id: Uuid,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct FlagResponse {
    flag_id: Uuid,
    status: FlagStatus,
}

/// POST /game/flag-questions - 201 on success.
async fn flag_question(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FlagRequest>,
) -> ApiResult<(StatusCode, Json<FlagResponse>)> {
    let flag = state
        .games
        .flag(body.question_id, body.user_id, body.reason, body.notes)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(FlagResponse {
            flag_id: flag.flag_id,
            status: flag.status,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct CheckHandwriteRequest {
    user_id: Uuid,
    target_word: char,
    image_url: String,
}

/// POST /game/check-handwrite-answer - delegate to the recognizer.
async fn check_handwrite(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckHandwriteRequest>,
) -> ApiResult<Json<HandwriteVerdict>> {
    let verdict = state
        .recognizer
        .check_handwrite(&body.image_url, body.target_word, body.user_id)
        .await?;
    Ok(Json(verdict))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/game/start/{user_id}", get(start_game))
        .route("/game/submit-result", post(submit_result))
        .route("/game/flag-questions", post(flag_question))
        .route("/game/check-handwrite-answer", post(check_handwrite))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_object_round_trip() {
        let raw = serde_json::json!({
            "game_id": "7f8a4ea2-58d6-4f52-9a07-8f7f4f3f2a10",
            "user_id": "7f8a4ea2-58d6-4f52-9a07-8f7f4f3f2a11",
            "timestamp": 1_700_000_000,
            "questions": [],
        });
        let game: GameObject = serde_json::from_value(raw).unwrap();
        assert!(game.questions.is_empty());
        assert!(game.time_spent.is_none());
    }

    #[test]
    fn test_default_q_count() {
        let params: StartParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.q_count, 1);
        let params: StartParams = serde_json::from_str(r#"{"qCount": 8}"#).unwrap();
        assert_eq!(params.q_count, 8);
    }
}
