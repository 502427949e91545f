// crates/core/src/question/model.rs
//! The canonical in-memory question representation.
//!
//! A question is a kind discriminator plus exactly one answer-shape payload
//! (multi-choice, pairing, or handwriting). The payload enum is flattened
//! into the question object on the wire, so a serialized multi-choice
//! question carries an `mcq` key and nothing for the other two shapes.
//! Correctness predicates are implemented per payload variant and are pure:
//! the submitted answer travels inside the payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

/// Question kinds. The kind decides the answer shape (see [`QuestionKind::answer_kind`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    PairingCards,
    MatchPic,
    CombineRadical,
    CombineRadicalWithHint,
    FillInSentence,
    Listening,
    FillInVocab,
    IdentMirrored,
    IdentWrong,
    CopyStroke,
    FillInRadical,
}

impl QuestionKind {
    /// The answer shape this kind uses.
    pub fn answer_kind(self) -> AnswerKind {
        match self {
            QuestionKind::PairingCards => AnswerKind::Pairing,
            QuestionKind::CopyStroke | QuestionKind::FillInRadical => AnswerKind::Writing,
            _ => AnswerKind::MultiChoice,
        }
    }

    /// Kinds whose age does not reduce their suitability for selection.
    pub fn is_never_outdated(self) -> bool {
        matches!(self, QuestionKind::CopyStroke)
    }

    /// Kinds produced by the external generator.
    pub fn is_ai_generated(self) -> bool {
        matches!(
            self,
            QuestionKind::FillInVocab | QuestionKind::FillInSentence | QuestionKind::PairingCards
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::PairingCards => "pairing_cards",
            QuestionKind::MatchPic => "match_pic",
            QuestionKind::CombineRadical => "combine_radical",
            QuestionKind::CombineRadicalWithHint => "combine_radical_with_hint",
            QuestionKind::FillInSentence => "fill_in_sentence",
            QuestionKind::Listening => "listening",
            QuestionKind::FillInVocab => "fill_in_vocab",
            QuestionKind::IdentMirrored => "ident_mirrored",
            QuestionKind::IdentWrong => "ident_wrong",
            QuestionKind::CopyStroke => "copy_stroke",
            QuestionKind::FillInRadical => "fill_in_radical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerKind {
    #[serde(rename = "mcq")]
    MultiChoice,
    #[serde(rename = "writing")]
    Writing,
    #[serde(rename = "pairing")]
    Pairing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    TextLong,
    TextShort,
    Image,
    Sound,
}

/// A material shown alongside the prompt (text, image, or sound).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GivenMaterial {
    pub material_type: MaterialKind,
    pub material_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl GivenMaterial {
    pub fn text(material_id: i32, text: impl Into<String>, kind: MaterialKind) -> Self {
        Self {
            material_type: kind,
            material_id,
            image_url: None,
            alt_text: None,
            sound_url: None,
            text: Some(text.into()),
        }
    }

    pub fn image(material_id: i32, url: impl Into<String>, alt: Option<String>) -> Self {
        Self {
            material_type: MaterialKind::Image,
            material_id,
            image_url: Some(url.into()),
            alt_text: alt,
            sound_url: None,
            text: None,
        }
    }

    pub fn sound(material_id: i32, url: impl Into<String>) -> Self {
        Self {
            material_type: MaterialKind::Sound,
            material_id,
            image_url: None,
            alt_text: None,
            sound_url: Some(url.into()),
            text: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    Grid,
    List,
}

/// How choices are laid out client-side. Grid requires a column count,
/// list forbids one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceDisplay {
    pub display_type: DisplayKind,
    pub rows: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
}

impl ChoiceDisplay {
    pub fn grid(rows: u32, columns: u32) -> Self {
        Self {
            display_type: DisplayKind::Grid,
            rows,
            columns: Some(columns),
        }
    }

    pub fn list(rows: u32) -> Self {
        Self {
            display_type: DisplayKind::List,
            rows,
            columns: None,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self.display_type {
            DisplayKind::Grid => match self.columns {
                Some(c) if c > 0 => Ok(()),
                _ => Err(ValidationError::Display(
                    "grid display requires a positive column count".into(),
                )),
            },
            DisplayKind::List => {
                if self.columns.is_some() {
                    Err(ValidationError::Display(
                        "list display must not set columns".into(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// One selectable option. Needs text or an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub option_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// One valid combination of selected option ids. Ordering matters when the
/// owning payload has `strict_order` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceAnswer {
    pub answer_id: u32,
    pub choices: Vec<u32>,
}

/// Two options that belong together. Option ids are unique across the whole
/// question, so a submitted grouping is identified purely by its ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingGroup {
    pub pair_id: u32,
    pub items: Vec<ChoiceOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiChoice {
    #[serde(default)]
    pub time_limit: u32,
    pub min_choices: u32,
    pub max_choices: u32,
    pub choices: Vec<ChoiceOption>,
    pub strict_order: bool,
    pub randomize: bool,
    pub display: ChoiceDisplay,
    pub answers: Vec<ChoiceAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_answers: Option<Vec<ChoiceAnswer>>,
}

impl MultiChoice {
    /// Whether the submitted answer matches any valid answer.
    ///
    /// Strict order compares the choice sequence exactly; otherwise the
    /// selected set must equal one answer's set.
    pub fn is_correct(&self) -> bool {
        let Some(submitted) = self.submitted_answers.as_ref().and_then(|s| s.first()) else {
            return false;
        };
        if self.strict_order {
            self.answers.iter().any(|a| a.choices == submitted.choices)
        } else {
            let picked: BTreeSet<u32> = submitted.choices.iter().copied().collect();
            self.answers
                .iter()
                .any(|a| a.choices.iter().copied().collect::<BTreeSet<u32>>() == picked)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pairing {
    #[serde(default)]
    pub time_limit: u32,
    pub pairs: Vec<PairingGroup>,
    pub randomize: bool,
    pub display: ChoiceDisplay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_pairs: Option<Vec<PairingGroup>>,
}

impl Pairing {
    /// Whether the submitted groupings match the canonical ones.
    ///
    /// Pair ids and pair order are ignored; only the multiset of option-id
    /// groupings counts.
    pub fn is_correct(&self) -> bool {
        let Some(submitted) = self.submitted_pairs.as_ref() else {
            return false;
        };
        if submitted.len() != self.pairs.len() {
            return false;
        }
        let mut expected: Vec<BTreeSet<u32>> = self.pairs.iter().map(group_ids).collect();
        let mut got: Vec<BTreeSet<u32>> = submitted.iter().map(group_ids).collect();
        expected.sort();
        got.sort();
        expected == got
    }
}

fn group_ids(pair: &PairingGroup) -> BTreeSet<u32> {
    pair.items.iter().map(|i| i.option_id).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Writing {
    #[serde(default)]
    pub time_limit: u32,
    pub handwrite_target: char,
    /// Endpoint the client uploads the handwritten image to.
    pub submit_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    /// URL of the uploaded image, set after submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_image: Option<String>,
    /// Verdict from the handwriting-recognition collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

impl Writing {
    /// Correct only when an image was submitted and the recognizer agreed.
    pub fn is_correct(&self) -> bool {
        self.submitted_image.is_some() && self.is_correct.unwrap_or(false)
    }
}

/// Exactly one payload per question; the variant tag doubles as the wire key
/// (`mcq` / `pairing` / `writing`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnswerPayload {
    #[serde(rename = "mcq")]
    MultiChoice(MultiChoice),
    #[serde(rename = "pairing")]
    Pairing(Pairing),
    #[serde(rename = "writing")]
    Writing(Writing),
}

impl AnswerPayload {
    pub fn answer_kind(&self) -> AnswerKind {
        match self {
            AnswerPayload::MultiChoice(_) => AnswerKind::MultiChoice,
            AnswerPayload::Pairing(_) => AnswerKind::Pairing,
            AnswerPayload::Writing(_) => AnswerKind::Writing,
        }
    }

    pub fn as_mcq(&self) -> Option<&MultiChoice> {
        match self {
            AnswerPayload::MultiChoice(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_pairing(&self) -> Option<&Pairing> {
        match self {
            AnswerPayload::Pairing(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_writing(&self) -> Option<&Writing> {
        match self {
            AnswerPayload::Writing(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_writing_mut(&mut self) -> Option<&mut Writing> {
        match self {
            AnswerPayload::Writing(w) => Some(w),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("answer payload does not match answer kind for {0:?}")]
    PayloadMismatch(QuestionKind),

    #[error("{0}")]
    Display(String),

    #[error("duplicate option id {0}")]
    DuplicateOptionId(u32),

    #[error("duplicate pair id {0}")]
    DuplicatePairId(u32),

    #[error("answer {answer_id} references unknown option id {option_id}")]
    UnknownAnswerOption { answer_id: u32, option_id: u32 },

    #[error("max_choices {max} below min_choices {min}")]
    ChoiceBounds { min: u32, max: u32 },

    #[error("option {0} needs text or an image")]
    EmptyOption(u32),

    #[error("{kind:?} requires strict choice ordering")]
    StrictOrderRequired { kind: QuestionKind },

    #[error("{kind:?} requires at least {required} given images, found {found}")]
    NotEnoughImages {
        kind: QuestionKind,
        required: usize,
        found: usize,
    },

    #[error("{kind:?} requires exactly one given image, found {found}")]
    ExactlyOneImage { kind: QuestionKind, found: usize },

    #[error("pairing question needs at least one pair")]
    NoPairs,

    #[error("target word missing")]
    MissingTargetWord,
}

/// The canonical question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: Uuid,
    pub question_type: QuestionKind,
    pub answer_type: AnswerKind,
    /// Experience points awarded for a correct answer.
    pub exp: i32,
    pub target_word: char,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<Vec<GivenMaterial>>,
    #[serde(flatten)]
    pub payload: AnswerPayload,
}

impl Question {
    /// Evaluate the submitted answer carried inside the payload.
    pub fn is_correct(&self) -> bool {
        match &self.payload {
            AnswerPayload::MultiChoice(m) => m.is_correct(),
            AnswerPayload::Pairing(p) => p.is_correct(),
            AnswerPayload::Writing(w) => w.is_correct(),
        }
    }

    fn given_image_count(&self) -> usize {
        self.given
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .filter(|m| m.material_type == MaterialKind::Image)
            .count()
    }

    /// Check every structural invariant of the question shape.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.answer_type != self.payload.answer_kind()
            || self.answer_type != self.question_type.answer_kind()
        {
            return Err(ValidationError::PayloadMismatch(self.question_type));
        }

        match &self.payload {
            AnswerPayload::MultiChoice(mcq) => {
                mcq.display.validate()?;
                if mcq.max_choices < mcq.min_choices || mcq.min_choices < 1 {
                    return Err(ValidationError::ChoiceBounds {
                        min: mcq.min_choices,
                        max: mcq.max_choices,
                    });
                }
                let mut seen = BTreeSet::new();
                for opt in &mcq.choices {
                    if opt.text.is_none() && opt.image.is_none() {
                        return Err(ValidationError::EmptyOption(opt.option_id));
                    }
                    if !seen.insert(opt.option_id) {
                        return Err(ValidationError::DuplicateOptionId(opt.option_id));
                    }
                }
                for answer in &mcq.answers {
                    for option_id in &answer.choices {
                        if !seen.contains(option_id) {
                            return Err(ValidationError::UnknownAnswerOption {
                                answer_id: answer.answer_id,
                                option_id: *option_id,
                            });
                        }
                    }
                }
                if matches!(
                    self.question_type,
                    QuestionKind::CombineRadical | QuestionKind::CombineRadicalWithHint
                ) && !mcq.strict_order
                {
                    return Err(ValidationError::StrictOrderRequired {
                        kind: self.question_type,
                    });
                }
            }
            AnswerPayload::Pairing(pairing) => {
                pairing.display.validate()?;
                if pairing.pairs.is_empty() {
                    return Err(ValidationError::NoPairs);
                }
                let mut pair_ids = BTreeSet::new();
                let mut option_ids = BTreeSet::new();
                for pair in &pairing.pairs {
                    if !pair_ids.insert(pair.pair_id) {
                        return Err(ValidationError::DuplicatePairId(pair.pair_id));
                    }
                    for item in &pair.items {
                        if item.text.is_none() && item.image.is_none() {
                            return Err(ValidationError::EmptyOption(item.option_id));
                        }
                        if !option_ids.insert(item.option_id) {
                            return Err(ValidationError::DuplicateOptionId(item.option_id));
                        }
                    }
                }
            }
            AnswerPayload::Writing(_) => {}
        }

        // Per-kind given-material requirements.
        match self.question_type {
            QuestionKind::CombineRadicalWithHint | QuestionKind::IdentMirrored => {
                let found = self.given_image_count();
                if found < 2 {
                    return Err(ValidationError::NotEnoughImages {
                        kind: self.question_type,
                        required: 2,
                        found,
                    });
                }
            }
            QuestionKind::FillInRadical => {
                let found = self.given_image_count();
                if found != 1 {
                    return Err(ValidationError::ExactlyOneImage {
                        kind: self.question_type,
                        found,
                    });
                }
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq_question(strict: bool, answers: Vec<ChoiceAnswer>) -> Question {
        Question {
            question_id: Uuid::new_v4(),
            question_type: QuestionKind::FillInVocab,
            answer_type: AnswerKind::MultiChoice,
            exp: 10,
            target_word: '請',
            prompt: "Fill in the blank".into(),
            given: None,
            payload: AnswerPayload::MultiChoice(MultiChoice {
                time_limit: 30,
                min_choices: 1,
                max_choices: 1,
                choices: (1..=4)
                    .map(|i| ChoiceOption {
                        option_id: i,
                        text: Some(format!("c{i}")),
                        image: None,
                    })
                    .collect(),
                strict_order: strict,
                randomize: true,
                display: ChoiceDisplay::grid(2, 2),
                answers,
                submitted_answers: None,
            }),
        }
    }

    fn submit(q: &mut Question, choices: Vec<u32>) {
        if let AnswerPayload::MultiChoice(m) = &mut q.payload {
            m.submitted_answers = Some(vec![ChoiceAnswer {
                answer_id: 1,
                choices,
            }]);
        }
    }

    #[test]
    fn test_mcq_no_submission_is_wrong() {
        let q = mcq_question(
            false,
            vec![ChoiceAnswer {
                answer_id: 1,
                choices: vec![2],
            }],
        );
        assert!(!q.is_correct());
    }

    #[test]
    fn test_mcq_non_strict_ignores_order() {
        let mut q = mcq_question(
            false,
            vec![ChoiceAnswer {
                answer_id: 1,
                choices: vec![1, 3],
            }],
        );
        submit(&mut q, vec![3, 1]);
        assert!(q.is_correct());
        submit(&mut q, vec![3, 2]);
        assert!(!q.is_correct());
    }

    #[test]
    fn test_mcq_strict_requires_exact_sequence() {
        let mut q = mcq_question(
            true,
            vec![ChoiceAnswer {
                answer_id: 1,
                choices: vec![1, 3],
            }],
        );
        submit(&mut q, vec![1, 3]);
        assert!(q.is_correct());
        submit(&mut q, vec![3, 1]);
        assert!(!q.is_correct());
        submit(&mut q, vec![1]);
        assert!(!q.is_correct());
    }

    fn pairing_question() -> Question {
        let pair = |pair_id, a: u32, b: u32| PairingGroup {
            pair_id,
            items: vec![
                ChoiceOption {
                    option_id: a,
                    text: Some(format!("o{a}")),
                    image: None,
                },
                ChoiceOption {
                    option_id: b,
                    text: Some(format!("o{b}")),
                    image: None,
                },
            ],
        };
        Question {
            question_id: Uuid::new_v4(),
            question_type: QuestionKind::PairingCards,
            answer_type: AnswerKind::Pairing,
            exp: 10,
            target_word: '請',
            prompt: "Match the items below".into(),
            given: None,
            payload: AnswerPayload::Pairing(Pairing {
                time_limit: 0,
                pairs: vec![pair(1, 1, 2), pair(2, 3, 4)],
                randomize: true,
                display: ChoiceDisplay::grid(2, 2),
                submitted_pairs: None,
            }),
        }
    }

    #[test]
    fn test_pairing_ignores_pair_ids_and_order() {
        let mut q = pairing_question();
        // Submitted with swapped pair order, swapped item order, bogus pair ids.
        let submitted = vec![
            PairingGroup {
                pair_id: 9,
                items: vec![
                    ChoiceOption {
                        option_id: 4,
                        text: None,
                        image: Some("x".into()),
                    },
                    ChoiceOption {
                        option_id: 3,
                        text: None,
                        image: Some("y".into()),
                    },
                ],
            },
            PairingGroup {
                pair_id: 7,
                items: vec![
                    ChoiceOption {
                        option_id: 1,
                        text: Some("a".into()),
                        image: None,
                    },
                    ChoiceOption {
                        option_id: 2,
                        text: Some("b".into()),
                        image: None,
                    },
                ],
            },
        ];
        if let AnswerPayload::Pairing(p) = &mut q.payload {
            p.submitted_pairs = Some(submitted);
        }
        assert!(q.is_correct());
    }

    #[test]
    fn test_pairing_wrong_grouping() {
        let mut q = pairing_question();
        let submitted = vec![
            PairingGroup {
                pair_id: 1,
                items: vec![
                    ChoiceOption {
                        option_id: 1,
                        text: Some("a".into()),
                        image: None,
                    },
                    ChoiceOption {
                        option_id: 3,
                        text: Some("c".into()),
                        image: None,
                    },
                ],
            },
            PairingGroup {
                pair_id: 2,
                items: vec![
                    ChoiceOption {
                        option_id: 2,
                        text: Some("b".into()),
                        image: None,
                    },
                    ChoiceOption {
                        option_id: 4,
                        text: Some("d".into()),
                        image: None,
                    },
                ],
            },
        ];
        if let AnswerPayload::Pairing(p) = &mut q.payload {
            p.submitted_pairs = Some(submitted);
        }
        assert!(!q.is_correct());
    }

    #[test]
    fn test_writing_requires_image_and_verdict() {
        let mut w = Writing {
            time_limit: 0,
            handwrite_target: '中',
            submit_url: "https://files.example/upload".into(),
            background_image: None,
            submitted_image: None,
            is_correct: Some(true),
        };
        assert!(!w.is_correct());
        w.submitted_image = Some("https://files.example/abc.png".into());
        assert!(w.is_correct());
        w.is_correct = Some(false);
        assert!(!w.is_correct());
        w.is_correct = None;
        assert!(!w.is_correct());
    }

    #[test]
    fn test_validate_duplicate_option_ids() {
        let mut q = mcq_question(
            false,
            vec![ChoiceAnswer {
                answer_id: 1,
                choices: vec![1],
            }],
        );
        if let AnswerPayload::MultiChoice(m) = &mut q.payload {
            m.choices[1].option_id = 1;
        }
        assert!(matches!(
            q.validate(),
            Err(ValidationError::DuplicateOptionId(1))
        ));
    }

    #[test]
    fn test_validate_answer_references_existing_options() {
        let q = mcq_question(
            false,
            vec![ChoiceAnswer {
                answer_id: 1,
                choices: vec![99],
            }],
        );
        assert!(matches!(
            q.validate(),
            Err(ValidationError::UnknownAnswerOption { option_id: 99, .. })
        ));
    }

    #[test]
    fn test_validate_ok() {
        let q = mcq_question(
            false,
            vec![ChoiceAnswer {
                answer_id: 1,
                choices: vec![2],
            }],
        );
        q.validate().unwrap();
        pairing_question().validate().unwrap();
    }

    #[test]
    fn test_serialized_payload_uses_shape_key() {
        let q = mcq_question(
            false,
            vec![ChoiceAnswer {
                answer_id: 1,
                choices: vec![2],
            }],
        );
        let json = serde_json::to_value(&q).unwrap();
        assert!(json.get("mcq").is_some());
        assert!(json.get("pairing").is_none());
        assert!(json.get("writing").is_none());
        assert_eq!(json["answer_type"], "mcq");
        assert_eq!(json["question_type"], "fill_in_vocab");
        assert_eq!(json["target_word"], "請");

        let back: Question = serde_json::from_value(json).unwrap();
        assert!(matches!(back.payload, AnswerPayload::MultiChoice(_)));
    }
}
