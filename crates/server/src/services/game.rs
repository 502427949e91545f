// crates/server/src/services/game.rs
//! Game session lifecycle: start, submit, flag.

use crate::error::{ApiError, ApiResult};
use serde_json::{json, Value as Json};
use tracing::{info, warn};
use uuid::Uuid;
use zixue_core::{AnswerPayload, Question};
use zixue_db::{
    Database, FlagStatus, FlaggedQuestionRow, GameDataRow, GameSessionRow, GameSessionStatus,
    SqlValue, Table,
};

/// Defaults applied when the client omits the bookkeeping fields.
const DEFAULT_HEARTS: i64 = 3;

#[derive(Clone)]
pub struct GameService {
    db: Database,
}

impl GameService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist an in-progress session owning the ordered question ids.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        question_ids: Vec<Uuid>,
    ) -> ApiResult<Uuid> {
        if question_ids.is_empty() {
            return Err(ApiError::Validation(
                "a game session needs at least one question".into(),
            ));
        }
        let ids_json = json!(question_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>());
        let inserted = self
            .db
            .insert(
                Table::GameSessions,
                &[
                    ("user_id", SqlValue::from(user_id)),
                    ("question_ids", SqlValue::from(ids_json)),
                    (
                        "status",
                        SqlValue::from(GameSessionStatus::InProgress.as_str()),
                    ),
                ],
            )
            .await?;
        let session: GameSessionRow =
            serde_json::from_value(inserted).map_err(|e| ApiError::Internal(e.to_string()))?;
        info!(game_id = %session.game_id, %user_id, questions = question_ids.len(), "game session created");
        Ok(session.game_id)
    }

    async fn load_session(&self, game_id: Uuid) -> ApiResult<GameSessionRow> {
        let rows = self
            .db
            .select(
                Table::GameSessions,
                &[("game_id", SqlValue::from(game_id))],
                None,
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("game session {game_id}")))?;
        serde_json::from_value(row).map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// Evaluate a submitted game: per-question correctness, XP credit,
    /// question statistics, the result record, per-question history, and the
    /// session's completed transition.
    pub async fn submit(
        &self,
        game_id: Uuid,
        questions: Vec<Question>,
        time_spent: Option<i64>,
        remaining_hearts: Option<i64>,
    ) -> ApiResult<GameDataRow> {
        let session = self.load_session(game_id).await?;
        if session.status == GameSessionStatus::Completed {
            return Err(ApiError::Conflict(format!(
                "game session {game_id} was already submitted"
            )));
        }
        let user_id = session.user_id;

        let mut earned_exp: i64 = 0;
        let mut correct_count: i64 = 0;
        let mut answered = Vec::with_capacity(questions.len());
        let mut wrong = Vec::new();
        let mut verdicts = Vec::with_capacity(questions.len());
        for question in &questions {
            let correct = question.is_correct();
            answered.push(question.question_id);
            if correct {
                correct_count += 1;
                earned_exp += question.exp as i64;
            } else {
                wrong.push(question.question_id);
            }
            verdicts.push(correct);
        }

        self.db.update_question_stats(&answered, &wrong).await?;
        if earned_exp > 0 {
            let update = self.db.update_user_experience(user_id, earned_exp).await?;
            info!(%user_id, earned_exp, new_level = update.new_level, "credited game XP");
        }

        let inserted = self
            .db
            .insert(
                Table::GameData,
                &[
                    ("game_id", SqlValue::from(game_id)),
                    ("user_id", SqlValue::from(user_id)),
                    ("earned_exp", SqlValue::from(earned_exp)),
                    ("time_spent", SqlValue::from(time_spent.unwrap_or(0))),
                    ("total_score", SqlValue::from(earned_exp)),
                    ("question_count", SqlValue::from(questions.len() as i64)),
                    (
                        "remaining_hearts",
                        SqlValue::from(remaining_hearts.unwrap_or(DEFAULT_HEARTS)),
                    ),
                    ("correct_count", SqlValue::from(correct_count)),
                ],
            )
            .await?;
        let game_data: GameDataRow =
            serde_json::from_value(inserted).map_err(|e| ApiError::Internal(e.to_string()))?;

        // One history row per question, inserted as a single batch.
        let history_rows: Vec<Vec<SqlValue>> = questions
            .iter()
            .zip(&verdicts)
            .enumerate()
            .map(|(index, (question, correct))| {
                vec![
                    SqlValue::from(game_id),
                    SqlValue::from(user_id),
                    SqlValue::from(question.question_id),
                    SqlValue::from(index as i64),
                    SqlValue::from(submitted_answer_json(question)),
                    SqlValue::from(*correct),
                ]
            })
            .collect();
        if let Err(e) = self
            .db
            .insert_many(
                Table::GameQaHistory,
                &[
                    "game_id",
                    "user_id",
                    "question_id",
                    "question_index",
                    "answer",
                    "is_correct",
                ],
                history_rows,
            )
            .await
        {
            // History is best-effort; the result record already exists.
            warn!(%game_id, error = %e, "failed to record game history");
        }

        self.db
            .update(
                Table::GameSessions,
                &[(
                    "status",
                    SqlValue::from(GameSessionStatus::Completed.as_str()),
                )],
                &[("game_id", SqlValue::from(game_id))],
            )
            .await?;
        info!(%game_id, %user_id, correct_count, earned_exp, "game submitted");
        Ok(game_data)
    }

    /// Flag a question for review; flagged questions stop being selected.
    pub async fn flag(
        &self,
        question_id: Uuid,
        user_id: Uuid,
        reason: Option<String>,
        notes: Option<String>,
    ) -> ApiResult<FlaggedQuestionRow> {
        let exists = self
            .db
            .count(
                Table::Questions,
                &[("question_id", SqlValue::from(question_id))],
            )
            .await?;
        if exists == 0 {
            return Err(ApiError::NotFound(format!("question {question_id}")));
        }

        let inserted = self
            .db
            .insert(
                Table::FlaggedQuestions,
                &[
                    ("question_id", SqlValue::from(question_id)),
                    ("user_id", SqlValue::from(user_id)),
                    ("reason", SqlValue::from(reason)),
                    ("notes", SqlValue::from(notes)),
                    ("status", SqlValue::from(FlagStatus::Pending.as_str())),
                ],
            )
            .await?;
        let flag: FlaggedQuestionRow =
            serde_json::from_value(inserted).map_err(|e| ApiError::Internal(e.to_string()))?;
        info!(flag_id = %flag.flag_id, %question_id, %user_id, "question flagged");
        Ok(flag)
    }
}

/// The submitted part of a question's payload, shaped for the history row.
fn submitted_answer_json(question: &Question) -> Json {
    match &question.payload {
        AnswerPayload::MultiChoice(mcq) => json!({
            "answer_type": "mcq",
            "mc_answers": mcq.submitted_answers,
        }),
        AnswerPayload::Pairing(pairing) => json!({
            "answer_type": "pairing",
            "pairing_answers": pairing.submitted_pairs,
        }),
        AnswerPayload::Writing(writing) => json!({
            "answer_type": "writing",
            "handwriting_answer": writing.submitted_image,
            "is_correct": writing.is_correct,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zixue_core::{ChoiceAnswer, McqBuilder, QuestionKind};

    #[test]
    fn test_submitted_answer_json_shapes() {
        let mut q = McqBuilder::new(QuestionKind::FillInVocab)
            .target_word('請')
            .text_choices(&["情", "請"], &[false, true])
            .build()
            .unwrap();
        if let AnswerPayload::MultiChoice(m) = &mut q.payload {
            m.submitted_answers = Some(vec![ChoiceAnswer {
                answer_id: 1,
                choices: vec![2],
            }]);
        }
        let json = submitted_answer_json(&q);
        assert_eq!(json["answer_type"], "mcq");
        assert_eq!(json["mc_answers"][0]["choices"][0], 2);
    }
}
