// crates/server/src/services/word.rs
//! Word catalog service: resolve characters to catalog entries, creating
//! them from the dictionary scraper on first sighting.

use crate::error::{ApiError, ApiResult};
use std::sync::Arc;
use tracing::info;
use zixue_core::{codepoint, DictionaryScraper};
use zixue_db::{Database, DbError, SqlValue, Table, WordRow};

#[derive(Clone)]
pub struct WordService {
    db: Database,
    scraper: Arc<dyn DictionaryScraper>,
}

impl WordService {
    pub fn new(db: Database, scraper: Arc<dyn DictionaryScraper>) -> Self {
        Self { db, scraper }
    }

    async fn lookup(&self, word_id: i64) -> ApiResult<Option<WordRow>> {
        let rows = self
            .db
            .select(Table::Words, &[("word_id", SqlValue::from(word_id))], None)
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(
                serde_json::from_value(row).map_err(|e| ApiError::Internal(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Resolve a character to its catalog row, scraping and inserting it on
    /// first sighting.
    pub async fn create_if_missing(&self, word: char) -> ApiResult<WordRow> {
        let word_id =
            codepoint(word).map_err(|e| ApiError::Validation(e.to_string()))?;

        if let Some(existing) = self.lookup(word_id).await? {
            return Ok(existing);
        }

        let info = self.scraper.word_info(word).await?;
        let inserted = self
            .db
            .insert(
                Table::Words,
                &[
                    ("word_id", SqlValue::from(word_id)),
                    ("word", SqlValue::from(word.to_string())),
                    ("description", SqlValue::from(info.description)),
                    ("image_url", SqlValue::from(info.image_url)),
                    ("pronunciation_url", SqlValue::from(info.pronunciation_url)),
                    ("strokes_url", SqlValue::from(info.strokes_url)),
                ],
            )
            .await;

        match inserted {
            Ok(row) => {
                info!(word = %word, word_id, "created catalog entry");
                serde_json::from_value(row).map_err(|e| ApiError::Internal(e.to_string()))
            }
            // Another first-sighting won the insert race; read their row.
            Err(DbError::Constraint(_)) => self
                .lookup(word_id)
                .await?
                .ok_or_else(|| ApiError::Internal(format!("word {word_id} vanished after conflict"))),
            Err(e) => Err(e.into()),
        }
    }

    /// Uniformly random catalog entries.
    pub async fn get_random(&self, count: i64) -> ApiResult<Vec<WordRow>> {
        Ok(self.db.get_random_words(count).await?)
    }

    /// The subset of `word_ids` present in the catalog.
    pub async fn get_existing(&self, word_ids: &[i64]) -> ApiResult<Vec<WordRow>> {
        if word_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.db.get_existing_words(word_ids).await?)
    }
}
