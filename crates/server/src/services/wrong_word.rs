// crates/server/src/services/wrong_word.rs
//! Per-user wrong-word tracking.
//!
//! Single adds upsert one (user, word) edge; batch adds use the atomic
//! increment function for the existing subset plus parallel inserts for the
//! new subset. A race between two first sightings of the same edge is
//! settled by the unique constraint: the loser retries as an increment.

use crate::error::{ApiError, ApiResult};
use crate::services::word::WordService;
use futures_util::future::join_all;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use zixue_core::{codepoint, now_ts};
use zixue_db::{Database, DbError, PastWrongWordRow, SqlValue, Table, WrongWordDetail};

/// One entry of a batch add.
#[derive(Debug, Clone, Deserialize)]
pub struct WrongWordEntry {
    pub word: char,
    #[serde(default)]
    pub wrong_image_url: Option<String>,
}

const PAGE_LIMIT_MAX: i64 = 100;
/// Cap applied when the caller wants the whole dictionary in one read.
const NO_PAGING_LIMIT: i64 = 6000;

#[derive(Clone)]
pub struct WrongWordService {
    db: Database,
    words: WordService,
}

impl WrongWordService {
    pub fn new(db: Database, words: WordService) -> Self {
        Self { db, words }
    }

    /// Every wrong-word edge for a user (the engine's Stage-1 input).
    pub async fn list(&self, user_id: Uuid) -> ApiResult<Vec<PastWrongWordRow>> {
        let rows = self
            .db
            .select(
                Table::PastWrongWords,
                &[("user_id", SqlValue::from(user_id))],
                None,
            )
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| ApiError::Internal(e.to_string())))
            .collect()
    }

    /// Paged dictionary view joined with catalog metadata.
    pub async fn page(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
        no_paging: bool,
    ) -> ApiResult<Vec<WrongWordDetail>> {
        let (limit, offset) = if no_paging {
            (NO_PAGING_LIMIT, 0)
        } else {
            if !(1..=PAGE_LIMIT_MAX).contains(&limit) {
                return Err(ApiError::Validation(format!(
                    "limit must be between 1 and {PAGE_LIMIT_MAX}"
                )));
            }
            if offset < 0 {
                return Err(ApiError::Validation("offset must be non-negative".into()));
            }
            (limit, offset)
        };
        Ok(self.db.past_wrong_words_page(user_id, limit, offset).await?)
    }

    pub async fn count(&self, user_id: Uuid) -> ApiResult<i64> {
        Ok(self
            .db
            .count(
                Table::PastWrongWords,
                &[("user_id", SqlValue::from(user_id))],
            )
            .await?)
    }

    /// Upsert one edge: insert with count 1, or bump count and timestamp.
    pub async fn add(&self, user_id: Uuid, word: char) -> ApiResult<PastWrongWordRow> {
        self.words.create_if_missing(word).await?;
        let word_id = codepoint(word).map_err(|e| ApiError::Validation(e.to_string()))?;

        let existing = self
            .db
            .select(
                Table::PastWrongWords,
                &[
                    ("user_id", SqlValue::from(user_id)),
                    ("word_id", SqlValue::from(word_id)),
                ],
                None,
            )
            .await?;

        if existing.is_empty() {
            match self.insert_edge(user_id, word_id, None).await {
                Ok(row) => return Ok(row),
                // Lost a first-sighting race; fall through to the increment.
                Err(ApiError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.db.increment_wrong_count(user_id, &[word_id]).await?;
        let rows = self
            .db
            .select(
                Table::PastWrongWords,
                &[
                    ("user_id", SqlValue::from(user_id)),
                    ("word_id", SqlValue::from(word_id)),
                ],
                None,
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("wrong-word edge vanished after increment".into()))?;
        serde_json::from_value(row).map_err(|e| ApiError::Internal(e.to_string()))
    }

    async fn insert_edge(
        &self,
        user_id: Uuid,
        word_id: i64,
        wrong_image_url: Option<String>,
    ) -> ApiResult<PastWrongWordRow> {
        let inserted = self
            .db
            .insert(
                Table::PastWrongWords,
                &[
                    ("user_id", SqlValue::from(user_id)),
                    ("word_id", SqlValue::from(word_id)),
                    ("wrong_count", SqlValue::from(1i64)),
                    ("wrong_image_url", SqlValue::from(wrong_image_url)),
                    ("last_wrong_at", SqlValue::from(now_ts())),
                ],
            )
            .await
            .map_err(|e| match e {
                DbError::Constraint(msg) => ApiError::Conflict(msg),
                other => other.into(),
            })?;
        serde_json::from_value(inserted).map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// Batch upsert: one stored-procedure increment over the existing
    /// subset, parallel inserts for the new subset, merged post-state back.
    ///
    /// Per-edge insert failures are logged without failing the batch; the
    /// batch fails only when nothing succeeded.
    pub async fn batch_add(
        &self,
        user_id: Uuid,
        entries: Vec<WrongWordEntry>,
    ) -> ApiResult<Vec<PastWrongWordRow>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let mut word_ids = Vec::with_capacity(entries.len());
        for entry in &entries {
            word_ids
                .push(codepoint(entry.word).map_err(|e| ApiError::Validation(e.to_string()))?);
        }

        // Make sure every word exists in the catalog first.
        let existing_words: Vec<i64> = self
            .words
            .get_existing(&word_ids)
            .await?
            .iter()
            .map(|w| w.word_id)
            .collect();
        let creations = entries
            .iter()
            .filter(|e| !existing_words.contains(&codepoint(e.word).unwrap_or_default()))
            .map(|e| self.words.create_if_missing(e.word));
        for result in join_all(creations).await {
            result?;
        }

        // Split edges into existing (atomic increment) and new (inserts).
        let existing_edges: Vec<i64> = self
            .db
            .get_existing_wrong_word_ids(user_id, &word_ids)
            .await?
            .iter()
            .map(|e| e.word_id)
            .collect();

        if !existing_edges.is_empty() {
            self.db
                .increment_wrong_count(user_id, &existing_edges)
                .await?;
            // Refresh the latest wrong-image URL where the batch carries one.
            let image_updates = entries.iter().filter_map(|entry| {
                let word_id = codepoint(entry.word).ok()?;
                let url = entry.wrong_image_url.clone()?;
                if !existing_edges.contains(&word_id) {
                    return None;
                }
                let db = self.db.clone();
                Some(async move {
                    db.update(
                        Table::PastWrongWords,
                        &[("wrong_image_url", SqlValue::from(url))],
                        &[
                            ("user_id", SqlValue::from(user_id)),
                            ("word_id", SqlValue::from(word_id)),
                        ],
                    )
                    .await
                })
            });
            for result in join_all(image_updates).await {
                if let Err(e) = result {
                    warn!(error = %e, "failed to refresh wrong-image url");
                }
            }
        }

        let inserts = entries.iter().filter_map(|entry| {
            let word_id = codepoint(entry.word).ok()?;
            if existing_edges.contains(&word_id) {
                return None;
            }
            Some(self.insert_edge(user_id, word_id, entry.wrong_image_url.clone()))
        });
        let insert_results = join_all(inserts).await;
        let attempted = insert_results.len();
        let mut failed = 0usize;
        for result in &insert_results {
            if let Err(e) = result {
                failed += 1;
                error!(error = %e, %user_id, "wrong-word insert failed");
            }
        }
        if attempted > 0 && failed == attempted && existing_edges.is_empty() {
            return Err(ApiError::Internal(
                "every wrong-word insert in the batch failed".into(),
            ));
        }

        // Merged post-state for all requested edges.
        let merged = self
            .db
            .get_existing_wrong_word_ids(user_id, &word_ids)
            .await?;
        info!(
            %user_id,
            incremented = existing_edges.len(),
            inserted = attempted - failed,
            "batch-added wrong words"
        );
        Ok(merged)
    }
}
