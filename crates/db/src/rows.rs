// crates/db/src/rows.rs
//! Typed row shapes for the twelve tables, deserialized from the JSON
//! objects the adapter produces, plus the conversions between the
//! denormalized question row and the canonical domain question.

use crate::value::SqlValue;
use crate::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;
use zixue_core::{
    char_for_codepoint, codepoint, AnswerKind, AnswerPayload, ChoiceAnswer, ChoiceDisplay,
    ChoiceOption, GivenMaterial, MultiChoice, Pairing, PairingGroup, Question, QuestionKind,
    Writing,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameSessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl GameSessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameSessionStatus::InProgress => "in_progress",
            GameSessionStatus::Completed => "completed",
            GameSessionStatus::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Ongoing,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagStatus {
    Pending,
    Reviewed,
    Rejected,
    Resolved,
    Error,
}

impl FlagStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagStatus::Pending => "pending",
            FlagStatus::Reviewed => "reviewed",
            FlagStatus::Rejected => "rejected",
            FlagStatus::Resolved => "resolved",
            FlagStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub level: i64,
    pub exp: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub session_id: String,
    pub user_id: Uuid,
    pub created_at: i64,
    pub expires_at: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordRow {
    pub word_id: i64,
    pub word: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub pronunciation_url: Option<String>,
    pub strokes_url: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

impl WordRow {
    /// The catalog character, derived from the key.
    pub fn character(&self) -> DbResult<char> {
        char_for_codepoint(self.word_id)
            .map_err(|e| DbError::Decode(format!("word row {}: {e}", self.word_id)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PastWrongWordRow {
    pub item_id: Uuid,
    pub user_id: Uuid,
    pub word_id: i64,
    pub wrong_count: i64,
    pub wrong_image_url: Option<String>,
    pub last_wrong_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSessionRow {
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub question_ids: Vec<Uuid>,
    pub start_time: i64,
    pub status: GameSessionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDataRow {
    pub game_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub created_at: i64,
    pub earned_exp: i64,
    pub time_spent: i64,
    pub total_score: i64,
    pub question_count: i64,
    pub remaining_hearts: i64,
    pub correct_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameQaHistoryRow {
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub question_index: i64,
    /// Submitted answer payload, opaque at this layer.
    pub answer: Json,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub task_class: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub created_at: i64,
    pub until: Option<i64>,
    pub status: TaskStatus,
    pub title: String,
    pub content: Option<Json>,
    pub priority: i64,
    pub completed_at: Option<i64>,
    pub exp: i64,
    pub target: Option<i64>,
    pub progress: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettingsRow {
    pub user_id: Uuid,
    pub language: String,
    pub theme: Option<String>,
    pub settings: Json,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedQuestionRow {
    pub flag_id: Uuid,
    pub question_id: Uuid,
    pub user_id: Uuid,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub status: FlagStatus,
    #[serde(default)]
    pub created_at: i64,
}

/// The denormalized question row: one column per payload family, JSONB for
/// the structured parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRow {
    pub question_id: Uuid,
    pub question_type: QuestionKind,
    pub answer_type: AnswerKind,
    pub given_material: Option<Vec<GivenMaterial>>,
    pub target_word_id: i64,
    pub prompt: String,
    pub mc_choices: Option<Vec<ChoiceOption>>,
    pub mc_answers: Option<Vec<ChoiceAnswer>>,
    pub pairs: Option<Vec<PairingGroup>>,
    pub pairing_display: Option<ChoiceDisplay>,
    pub handwrite_target: Option<String>,
    pub background_image_url: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub use_count: i64,
    #[serde(default)]
    pub correct_count: i64,
}

fn to_json<T: Serialize>(value: &Option<T>) -> DbResult<SqlValue> {
    match value {
        Some(v) => serde_json::to_value(v)
            .map(|j| SqlValue::Json(Some(j)))
            .map_err(|e| DbError::Decode(e.to_string())),
        None => Ok(SqlValue::Json(None)),
    }
}

impl QuestionRow {
    /// Columns for the batch-insert path, in `insert_values` order.
    pub const INSERT_COLUMNS: [&'static str; 13] = [
        "question_id",
        "question_type",
        "answer_type",
        "given_material",
        "target_word_id",
        "prompt",
        "mc_choices",
        "mc_answers",
        "pairs",
        "pairing_display",
        "handwrite_target",
        "background_image_url",
        "created_at",
    ];

    /// Bind values matching [`Self::INSERT_COLUMNS`].
    pub fn insert_values(&self) -> DbResult<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::from(self.question_id),
            SqlValue::from(self.question_type.as_str()),
            serde_json::to_value(self.answer_type)
                .ok()
                .and_then(|j| j.as_str().map(|s| SqlValue::from(s.to_string())))
                .ok_or_else(|| DbError::Decode("answer_type encoding failed".into()))?,
            to_json(&self.given_material)?,
            SqlValue::from(self.target_word_id),
            SqlValue::from(self.prompt.clone()),
            to_json(&self.mc_choices)?,
            to_json(&self.mc_answers)?,
            to_json(&self.pairs)?,
            to_json(&self.pairing_display)?,
            SqlValue::from(self.handwrite_target.clone()),
            SqlValue::from(self.background_image_url.clone()),
            SqlValue::from(self.created_at),
        ])
    }

    /// Flatten a domain question into the row shape.
    pub fn from_question(question: &Question) -> DbResult<Self> {
        let target_word_id = codepoint(question.target_word)
            .map_err(|e| DbError::Decode(format!("question target word: {e}")))?;

        let mut row = Self {
            question_id: question.question_id,
            question_type: question.question_type,
            answer_type: question.answer_type,
            given_material: question.given.clone(),
            target_word_id,
            prompt: question.prompt.clone(),
            mc_choices: None,
            mc_answers: None,
            pairs: None,
            pairing_display: None,
            handwrite_target: None,
            background_image_url: None,
            created_at: zixue_core::now_ts(),
            use_count: 0,
            correct_count: 0,
        };

        match &question.payload {
            AnswerPayload::MultiChoice(mcq) => {
                row.mc_choices = Some(mcq.choices.clone());
                row.mc_answers = Some(mcq.answers.clone());
            }
            AnswerPayload::Pairing(pairing) => {
                row.pairs = Some(pairing.pairs.clone());
                row.pairing_display = Some(pairing.display.clone());
            }
            AnswerPayload::Writing(writing) => {
                row.handwrite_target = Some(writing.handwrite_target.to_string());
                row.background_image_url = writing.background_image.clone();
            }
        }
        Ok(row)
    }

    /// Rebuild the domain question.
    ///
    /// Writing rows need `submit_url` because the upload endpoint is
    /// per-user and not persisted.
    pub fn into_question(self, submit_url: Option<&str>) -> DbResult<Question> {
        let target_word = char_for_codepoint(self.target_word_id)
            .map_err(|e| DbError::Decode(format!("question {}: {e}", self.question_id)))?;

        let payload = match self.question_type.answer_kind() {
            AnswerKind::MultiChoice => {
                let choices = self.mc_choices.ok_or_else(|| {
                    DbError::Decode(format!("question {} has no mc_choices", self.question_id))
                })?;
                let answers = self.mc_answers.ok_or_else(|| {
                    DbError::Decode(format!("question {} has no mc_answers", self.question_id))
                })?;
                let strict_order = matches!(
                    self.question_type,
                    QuestionKind::CombineRadical | QuestionKind::CombineRadicalWithHint
                );
                let max_choices = answers
                    .iter()
                    .map(|a| a.choices.len() as u32)
                    .max()
                    .unwrap_or(1)
                    .max(1);
                AnswerPayload::MultiChoice(MultiChoice {
                    time_limit: 0,
                    min_choices: 1,
                    max_choices,
                    choices,
                    strict_order,
                    randomize: true,
                    display: ChoiceDisplay::grid(2, 2),
                    answers,
                    submitted_answers: None,
                })
            }
            AnswerKind::Pairing => {
                let pairs = self.pairs.ok_or_else(|| {
                    DbError::Decode(format!("question {} has no pairs", self.question_id))
                })?;
                let display = self.pairing_display.ok_or_else(|| {
                    DbError::Decode(format!("question {} has no pairing display", self.question_id))
                })?;
                AnswerPayload::Pairing(Pairing {
                    time_limit: 0,
                    pairs,
                    randomize: true,
                    display,
                    submitted_pairs: None,
                })
            }
            AnswerKind::Writing => {
                let target = self
                    .handwrite_target
                    .as_ref()
                    .and_then(|s| s.chars().next())
                    .ok_or_else(|| {
                        DbError::Decode(format!(
                            "question {} has no handwrite target",
                            self.question_id
                        ))
                    })?;
                let submit_url = submit_url.ok_or_else(|| {
                    DbError::Query(format!(
                        "question {} needs a submit URL to materialize",
                        self.question_id
                    ))
                })?;
                AnswerPayload::Writing(Writing {
                    time_limit: 0,
                    handwrite_target: target,
                    submit_url: submit_url.to_string(),
                    background_image: self.background_image_url,
                    submitted_image: None,
                    is_correct: None,
                })
            }
        };

        let question = Question {
            question_id: self.question_id,
            question_type: self.question_type,
            answer_type: self.question_type.answer_kind(),
            exp: 10,
            target_word,
            prompt: self.prompt,
            given: self.given_material,
            payload,
        };
        question
            .validate()
            .map_err(|e| DbError::Decode(format!("question {}: {e}", question.question_id)))?;
        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zixue_core::{McqBuilder, PairingBuilder, WritingBuilder};

    #[test]
    fn test_mcq_row_round_trip() {
        let q = McqBuilder::new(QuestionKind::FillInVocab)
            .prompt("Fill in the blank")
            .target_word('請')
            .given_text("？求", zixue_core::MaterialKind::TextLong)
            .text_choices(&["情", "清", "精", "請"], &[false, false, false, true])
            .build()
            .unwrap();

        let row = QuestionRow::from_question(&q).unwrap();
        assert_eq!(row.target_word_id, 0x8ACB);
        assert_eq!(row.question_type, QuestionKind::FillInVocab);
        assert!(row.pairs.is_none());
        assert!(row.handwrite_target.is_none());

        let back = row.clone().into_question(None).unwrap();
        assert_eq!(back.target_word, '請');
        assert_eq!(back.question_id, q.question_id);
        let mcq = back.payload.as_mcq().unwrap();
        assert_eq!(mcq.choices.len(), 4);
        assert_eq!(mcq.answers[0].choices, vec![4]);

        // Row → question → row is stable on all persisted fields.
        let row2 = QuestionRow::from_question(&back).unwrap();
        assert_eq!(row2.target_word_id, row.target_word_id);
        assert_eq!(
            serde_json::to_value(&row2.mc_choices).unwrap(),
            serde_json::to_value(&row.mc_choices).unwrap()
        );
        assert_eq!(
            serde_json::to_value(&row2.mc_answers).unwrap(),
            serde_json::to_value(&row.mc_answers).unwrap()
        );
    }

    #[test]
    fn test_pairing_row_round_trip() {
        let q = PairingBuilder::new(QuestionKind::PairingCards)
            .prompt("Match the items below")
            .target_word('蘋')
            .text_pair("蘋", "果")
            .text_pair("香", "蕉")
            .build()
            .unwrap();

        let row = QuestionRow::from_question(&q).unwrap();
        assert!(row.pairs.is_some());
        assert!(row.pairing_display.is_some());
        assert!(row.mc_choices.is_none());

        let back = row.into_question(None).unwrap();
        let pairing = back.payload.as_pairing().unwrap();
        assert_eq!(pairing.pairs.len(), 2);
    }

    #[test]
    fn test_writing_row_requires_submit_url() {
        let q = WritingBuilder::new(QuestionKind::CopyStroke)
            .prompt("Copy the character")
            .target_word('中')
            .handwrite_target('中')
            .submit_url("https://files.example/upload")
            .build()
            .unwrap();

        let row = QuestionRow::from_question(&q).unwrap();
        assert_eq!(row.handwrite_target.as_deref(), Some("中"));

        assert!(row.clone().into_question(None).is_err());
        let back = row
            .into_question(Some("https://files.example/upload"))
            .unwrap();
        let writing = back.payload.as_writing().unwrap();
        assert_eq!(writing.handwrite_target, '中');
        assert_eq!(writing.submit_url, "https://files.example/upload");
    }

    #[test]
    fn test_insert_values_align_with_columns() {
        let q = McqBuilder::new(QuestionKind::Listening)
            .target_word('馬')
            .text_choices(&["馬", "的", "是", "草"], &[true, false, false, false])
            .build()
            .unwrap();
        let row = QuestionRow::from_question(&q).unwrap();
        let values = row.insert_values().unwrap();
        assert_eq!(values.len(), QuestionRow::INSERT_COLUMNS.len());
        assert_eq!(values[1], SqlValue::Text(Some("listening".into())));
        assert_eq!(values[2], SqlValue::Text(Some("mcq".into())));
        assert!(matches!(values[6], SqlValue::Json(Some(_)))); // mc_choices
        assert_eq!(values[8], SqlValue::Json(None)); // pairs
    }

    #[test]
    fn test_row_deserializes_from_adapter_json() {
        // Shape produced by row_to_json for a questions row.
        let json = serde_json::json!({
            "question_id": "7f8a4ea2-58d6-4f52-9a07-8f7f4f3f2a10",
            "question_type": "fill_in_vocab",
            "answer_type": "mcq",
            "given_material": [
                {"material_type": "text_long", "material_id": 1, "text": "？果"}
            ],
            "target_word_id": 0x860B,
            "prompt": "Fill in the blank",
            "mc_choices": [
                {"option_id": 1, "text": "平"},
                {"option_id": 2, "text": "蘋"}
            ],
            "mc_answers": [{"answer_id": 1, "choices": [2]}],
            "pairs": null,
            "pairing_display": null,
            "handwrite_target": null,
            "background_image_url": null,
            "created_at": 1_700_000_000,
            "use_count": 3,
            "correct_count": 2
        });
        let row: QuestionRow = serde_json::from_value(json).unwrap();
        assert_eq!(row.use_count, 3);
        let q = row.into_question(None).unwrap();
        assert_eq!(q.target_word, '蘋');
        assert!(q.payload.as_mcq().is_some());
    }

    #[test]
    fn test_task_row_type_field_rename() {
        let json = serde_json::json!({
            "task_id": "7f8a4ea2-58d6-4f52-9a07-8f7f4f3f2a10",
            "user_id": "7f8a4ea2-58d6-4f52-9a07-8f7f4f3f2a11",
            "task_class": "daily",
            "type": "daily_adventure",
            "created_at": 1_700_000_000,
            "until": null,
            "status": "ongoing",
            "title": "每日任務",
            "content": {"description": "每日任務"},
            "priority": 100,
            "completed_at": null,
            "exp": 10,
            "target": 1,
            "progress": 0
        });
        let task: TaskRow = serde_json::from_value(json).unwrap();
        assert_eq!(task.task_type, "daily_adventure");
        assert_eq!(task.status, TaskStatus::Ongoing);
    }
}
