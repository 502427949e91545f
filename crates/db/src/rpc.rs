// crates/db/src/rpc.rs
//! Typed wrappers over the stored functions in `migrations.rs`.
//!
//! Level, XP, task, and session transitions go exclusively through these so
//! the single-row atomicity lives server-side.

use crate::rows::{PastWrongWordRow, TaskRow, UserRow, WordRow};
use crate::value::SqlValue;
use crate::{Database, DbError, DbResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct ExperienceUpdate {
    pub new_exp: i64,
    pub new_level: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskProgressResult {
    pub updated: bool,
    pub granted_exp: i64,
}

/// Counts from a cleanup sweep: rows transitioned out of their live state
/// and rows deleted outright.
#[derive(Debug, Clone, Copy)]
pub struct CleanupCounts {
    pub transitioned: i64,
    pub deleted: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionStatsUpdate {
    pub answered_count: i64,
    pub wrong_count: i64,
}

/// Wrong-word edge joined with its catalog entry (paged dictionary view).
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct WrongWordDetail {
    pub word_id: i64,
    pub word: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub pronunciation_url: Option<String>,
    pub strokes_url: Option<String>,
    pub wrong_count: i64,
    pub wrong_image_url: Option<String>,
    pub last_wrong_at: i64,
    pub created_at: i64,
}

fn decode_one<T: DeserializeOwned>(rows: Vec<Json>, what: &str) -> DbResult<T> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| DbError::Query(format!("{what} returned no rows")))?;
    serde_json::from_value(row).map_err(|e| DbError::Decode(format!("{what}: {e}")))
}

fn decode_many<T: DeserializeOwned>(rows: Vec<Json>, what: &str) -> DbResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| DbError::Decode(format!("{what}: {e}"))))
        .collect()
}

fn count_field(row: &Json, field: &str) -> i64 {
    row.get(field).and_then(Json::as_i64).unwrap_or(0)
}

impl Database {
    /// Atomically add XP and recompute the level.
    pub async fn update_user_experience(
        &self,
        user_id: Uuid,
        delta: i64,
    ) -> DbResult<ExperienceUpdate> {
        let rows = self
            .call_function_named(
                "update_user_experience",
                &[
                    ("p_user_id", SqlValue::from(user_id)),
                    ("p_gained_exp", SqlValue::from(delta)),
                ],
            )
            .await?;
        decode_one(rows, "update_user_experience")
    }

    /// Current tasks for the user, creating today's daily task if absent.
    pub async fn get_or_create_today_tasks(&self, user_id: Uuid) -> DbResult<Vec<TaskRow>> {
        let rows = self
            .call_function_named(
                "get_or_create_today_tasks",
                &[("p_user_id", SqlValue::from(user_id))],
            )
            .await?;
        decode_many(rows, "get_or_create_today_tasks")
    }

    /// Update task progress; XP is granted exactly once on the
    /// ongoing→completed transition.
    pub async fn set_task_progress(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        progress: i64,
    ) -> DbResult<TaskProgressResult> {
        let rows = self
            .call_function_named(
                "set_task_progress",
                &[
                    ("p_user_id", SqlValue::from(user_id)),
                    ("p_task_id", SqlValue::from(task_id)),
                    ("p_progress", SqlValue::from(progress)),
                ],
            )
            .await?;
        decode_one(rows, "set_task_progress")
    }

    /// +1 wrong count (and fresh `last_wrong_at`) for existing edges only.
    /// Returns the number of rows bumped.
    pub async fn increment_wrong_count(&self, user_id: Uuid, word_ids: &[i64]) -> DbResult<i64> {
        let rows = self
            .call_function_named(
                "increment_wrong_count_for_user",
                &[
                    ("p_user_id", SqlValue::from(user_id)),
                    ("p_word_ids", SqlValue::from(word_ids.to_vec())),
                ],
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Query("increment_wrong_count_for_user returned nothing".into()))?;
        Ok(count_field(&row, "increment_wrong_count_for_user"))
    }

    /// Idempotent user creation keyed on email.
    pub async fn add_new_user(&self, name: &str, email: &str) -> DbResult<(UserRow, bool)> {
        let rows = self
            .call_function_named(
                "add_new_user",
                &[
                    ("p_name", SqlValue::from(name)),
                    ("p_email", SqlValue::from(email)),
                ],
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Query("add_new_user returned no rows".into()))?;
        let existed = row.get("existed").and_then(Json::as_bool).unwrap_or(false);
        let user: UserRow = serde_json::from_value(row)
            .map_err(|e| DbError::Decode(format!("add_new_user: {e}")))?;
        Ok((user, existed))
    }

    /// Abandon stale in-progress games and purge finished ones past
    /// retention.
    pub async fn cleanup_game_sessions(&self) -> DbResult<CleanupCounts> {
        let rows = self.call_function("cleanup_game_sessions", &[]).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Query("cleanup_game_sessions returned nothing".into()))?;
        Ok(CleanupCounts {
            transitioned: count_field(&row, "abandoned_count"),
            deleted: count_field(&row, "deleted_count"),
        })
    }

    /// Deactivate expired auth sessions and purge long-inactive ones.
    pub async fn cleanup_auth_sessions(&self) -> DbResult<CleanupCounts> {
        let rows = self.call_function("cleanup_auth_sessions", &[]).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Query("cleanup_auth_sessions returned nothing".into()))?;
        Ok(CleanupCounts {
            transitioned: count_field(&row, "expired_count"),
            deleted: count_field(&row, "deleted_count"),
        })
    }

    /// Paged wrong-word dictionary joined with catalog metadata.
    pub async fn past_wrong_words_page(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<WrongWordDetail>> {
        let rows = self
            .call_function_named(
                "get_past_wrong_words_by_user",
                &[
                    ("p_user_id", SqlValue::from(user_id)),
                    ("p_limit", SqlValue::from(limit)),
                    ("p_offset", SqlValue::from(offset)),
                ],
            )
            .await?;
        decode_many(rows, "get_past_wrong_words_by_user")
    }

    /// Wrong-word edges newer than a timestamp, optionally narrowed to one
    /// word (0 means all words).
    pub async fn wrong_words_after(
        &self,
        user_id: Uuid,
        since_ts: i64,
        word_id: i64,
    ) -> DbResult<Vec<Json>> {
        self.call_function_named(
            "get_wrong_words_by_user_after",
            &[
                ("provided_user_id", SqlValue::from(user_id)),
                ("provided_timestamp", SqlValue::from(since_ts)),
                ("target_word_id", SqlValue::from(word_id)),
            ],
        )
        .await
    }

    /// Bump use/correct counters for a submitted batch.
    pub async fn update_question_stats(
        &self,
        answered: &[Uuid],
        wrong: &[Uuid],
    ) -> DbResult<QuestionStatsUpdate> {
        let rows = self
            .call_function_named(
                "update_question_stats",
                &[
                    ("p_answered", SqlValue::from(answered.to_vec())),
                    ("p_wrong", SqlValue::from(wrong.to_vec())),
                ],
            )
            .await?;
        decode_one(rows, "update_question_stats")
    }

    /// Grouped question counts for a word (0 means the whole bank).
    pub async fn count_question_types(&self, word_id: i64) -> DbResult<Vec<(String, i64)>> {
        let rows = self
            .call_function_named(
                "count_question_types",
                &[("p_word_id", SqlValue::from(word_id))],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get("question_type")
                        .and_then(Json::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    count_field(row, "count"),
                )
            })
            .collect())
    }

    /// Uniformly random catalog words.
    pub async fn get_random_words(&self, count: i64) -> DbResult<Vec<WordRow>> {
        let rows = self
            .call_function_named("get_random_words", &[("p_count", SqlValue::from(count))])
            .await?;
        decode_many(rows, "get_random_words")
    }

    /// The subset of `word_ids` present in the catalog.
    pub async fn get_existing_words(&self, word_ids: &[i64]) -> DbResult<Vec<WordRow>> {
        let rows = self
            .call_function_named(
                "get_existing_words",
                &[("p_word_ids", SqlValue::from(word_ids.to_vec()))],
            )
            .await?;
        decode_many(rows, "get_existing_words")
    }

    /// The subset of `word_ids` the user already has wrong-word edges for.
    pub async fn get_existing_wrong_word_ids(
        &self,
        user_id: Uuid,
        word_ids: &[i64],
    ) -> DbResult<Vec<PastWrongWordRow>> {
        let rows = self
            .call_function_named(
                "get_existing_wrong_word_ids",
                &[
                    ("p_user_id", SqlValue::from(user_id)),
                    ("p_word_ids", SqlValue::from(word_ids.to_vec())),
                ],
            )
            .await?;
        decode_many(rows, "get_existing_wrong_word_ids")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_one_rejects_empty() {
        let result: DbResult<ExperienceUpdate> = decode_one(vec![], "update_user_experience");
        assert!(matches!(result, Err(DbError::Query(_))));
    }

    #[test]
    fn test_decode_experience_update() {
        let rows = vec![serde_json::json!({"new_exp": 120, "new_level": 5})];
        let update: ExperienceUpdate = decode_one(rows, "update_user_experience").unwrap();
        assert_eq!(update.new_exp, 120);
        assert_eq!(update.new_level, 5);
    }

    #[test]
    fn test_decode_task_progress() {
        let rows = vec![serde_json::json!({"updated": true, "granted_exp": 10})];
        let result: TaskProgressResult = decode_one(rows, "set_task_progress").unwrap();
        assert!(result.updated);
        assert_eq!(result.granted_exp, 10);
    }

    #[test]
    fn test_count_field_defaults_to_zero() {
        let row = serde_json::json!({"abandoned_count": 4});
        assert_eq!(count_field(&row, "abandoned_count"), 4);
        assert_eq!(count_field(&row, "deleted_count"), 0);
    }
}
