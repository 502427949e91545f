// crates/server/src/services/generator.rs
//! Stateless question generation, one routine per kind: copy_stroke is
//! synchronous, listening reads pronunciation metadata, and the AI kinds go
//! through the batching request manager.

use crate::error::{ApiError, ApiResult};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use zixue_core::{
    codepoint, BlobStore, McqBuilder, Question, QuestionKind, WritingBuilder,
};
use zixue_db::{Database, Fetch, QuestionRow, SqlValue, Table};
use zixue_llm::AiRequestManager;

/// Fixed distractors for listening questions.
const LISTENING_DISTRACTORS: [char; 3] = ['的', '是', '草'];

#[derive(Clone)]
pub struct QuestionGeneratorService {
    db: Database,
    ai: Arc<AiRequestManager>,
    blob: Arc<dyn BlobStore>,
}

impl QuestionGeneratorService {
    pub fn new(db: Database, ai: Arc<AiRequestManager>, blob: Arc<dyn BlobStore>) -> Self {
        Self { db, ai, blob }
    }

    /// Per-user endpoint for handwriting uploads.
    pub fn submit_url_for(&self, user_id: Uuid) -> String {
        self.blob.submit_url_for(user_id)
    }

    /// copy_stroke: the target character doubles as the handwrite target.
    pub fn create_copy_stroke(
        &self,
        target: char,
        user_id: Uuid,
        background_image: Option<String>,
    ) -> ApiResult<Question> {
        let mut builder = WritingBuilder::new(QuestionKind::CopyStroke)
            .prompt("跟著筆順寫一次")
            .target_word(target)
            .handwrite_target(target)
            .submit_url(self.blob.submit_url_for(user_id));
        if let Some(url) = background_image {
            builder = builder.background_image(url);
        }
        builder
            .build()
            .map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// listening: pronunciation audio plus four choices, one correct.
    pub async fn create_listening(&self, target: char) -> ApiResult<Question> {
        let word_id = codepoint(target).map_err(|e| ApiError::Validation(e.to_string()))?;
        let rows = self
            .db
            .select(
                Table::Words,
                &[("word_id", SqlValue::from(word_id))],
                Some(&["word_id", "pronunciation_url"]),
            )
            .await?;
        let pronunciation_url = rows
            .first()
            .and_then(|row| row.get("pronunciation_url"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::Unprocessable(format!("no pronunciation recorded for '{target}'"))
            })?;

        let mut choices: Vec<String> = vec![target.to_string()];
        choices.extend(LISTENING_DISTRACTORS.iter().map(char::to_string));
        let mask: Vec<bool> = choices
            .iter()
            .enumerate()
            .map(|(i, _)| i == 0)
            .collect();

        McqBuilder::new(QuestionKind::Listening)
            .prompt("聽一聽，選出正確的字")
            .target_word(target)
            .given_sound(pronunciation_url)
            .text_choices(&choices, &mask)
            .randomize(true)
            .build()
            .map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// AI kinds: enqueue on the kind's processor and await the question.
    pub async fn create_ai(&self, target: char, kind: QuestionKind) -> ApiResult<Question> {
        if !kind.is_ai_generated() {
            return Err(ApiError::Validation(format!(
                "kind {} is not generator-backed",
                kind.as_str()
            )));
        }
        debug!(target = %target, kind = kind.as_str(), "enqueueing generation");
        Ok(self.ai.enqueue(kind, target).await?)
    }

    /// Route to the matching per-kind routine.
    pub async fn generate(
        &self,
        target: char,
        user_id: Uuid,
        kind: QuestionKind,
    ) -> ApiResult<Question> {
        match kind {
            QuestionKind::CopyStroke => self.create_copy_stroke(target, user_id, None),
            QuestionKind::Listening => self.create_listening(target).await,
            kind if kind.is_ai_generated() => self.create_ai(target, kind).await,
            other => Err(ApiError::Validation(format!(
                "unsupported generation kind {}",
                other.as_str()
            ))),
        }
    }

    /// Generate, persist, and bind the store-assigned id. A failed insert
    /// discards the generated object.
    pub async fn generate_and_save(
        &self,
        target: char,
        user_id: Uuid,
        kind: QuestionKind,
    ) -> ApiResult<Question> {
        let mut question = self.generate(target, user_id, kind).await?;
        let row = QuestionRow::from_question(&question)?;
        let values = row.insert_values()?;
        let inserted = self
            .db
            .insert_many(
                Table::Questions,
                &QuestionRow::INSERT_COLUMNS,
                vec![values],
            )
            .await
            .map_err(|e| ApiError::Internal(format!("failed to persist question: {e}")))?;
        let stored_id = inserted
            .first()
            .and_then(|row| row.get("question_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ApiError::Internal("insert returned no question id".into()))?;
        question.question_id = stored_id;
        Ok(question)
    }

    /// Random non-flagged bank question for a word, optionally narrowed to
    /// one kind.
    pub async fn from_bank(
        &self,
        target: char,
        user_id: Uuid,
        kind: Option<QuestionKind>,
    ) -> ApiResult<Option<Question>> {
        let word_id = codepoint(target).map_err(|e| ApiError::Validation(e.to_string()))?;
        let mut query = String::from(
            "SELECT q.* FROM questions q \
             WHERE q.target_word_id = $word_id \
             AND q.question_id NOT IN (SELECT fq.question_id FROM flagged_questions fq)",
        );
        let mut params = vec![("word_id", SqlValue::from(word_id))];
        if let Some(kind) = kind {
            query.push_str(" AND q.question_type = $question_type");
            params.push(("question_type", SqlValue::from(kind.as_str())));
        }

        let rows = self
            .db
            .execute_complex_query(&query, &params, Fetch::All)
            .await?
            .into_rows();
        let Some(choice) = rows.choose(&mut rand::thread_rng()).cloned() else {
            return Ok(None);
        };
        let row: QuestionRow =
            serde_json::from_value(choice).map_err(|e| ApiError::Internal(e.to_string()))?;
        let submit_url = self.blob.submit_url_for(user_id);
        Ok(Some(row.into_question(Some(&submit_url))?))
    }
}
