// crates/core/src/question/builder.rs
//! Typed question builders, one per answer shape.
//!
//! The builders share a common [`BuilderBase`] by composition and produce a
//! validated [`Question`] value from `build()`. Option, answer, pair, and
//! material ids are assigned sequentially while building, which keeps the
//! uniqueness invariants true by construction; `build()` still runs the full
//! validator as a backstop.

use uuid::Uuid;

use super::model::{
    AnswerPayload, ChoiceAnswer, ChoiceDisplay, ChoiceOption, GivenMaterial, MaterialKind,
    MultiChoice, Pairing, PairingGroup, Question, QuestionKind, ValidationError, Writing,
};

const DEFAULT_EXP: i32 = 10;

#[derive(Debug, Clone)]
struct BuilderBase {
    question_id: Uuid,
    kind: QuestionKind,
    exp: i32,
    prompt: String,
    target_word: Option<char>,
    time_limit: u32,
    given: Vec<GivenMaterial>,
}

impl BuilderBase {
    fn new(kind: QuestionKind) -> Self {
        Self {
            question_id: Uuid::new_v4(),
            kind,
            exp: DEFAULT_EXP,
            prompt: String::new(),
            target_word: None,
            time_limit: 0,
            given: Vec::new(),
        }
    }

    fn next_material_id(&self) -> i32 {
        self.given.len() as i32 + 1
    }

    fn finish(self, payload: AnswerPayload) -> Result<Question, ValidationError> {
        let target_word = self.target_word.ok_or(ValidationError::MissingTargetWord)?;
        let question = Question {
            question_id: self.question_id,
            question_type: self.kind,
            answer_type: self.kind.answer_kind(),
            exp: self.exp,
            target_word,
            prompt: self.prompt,
            given: if self.given.is_empty() {
                None
            } else {
                Some(self.given)
            },
            payload,
        };
        question.validate()?;
        Ok(question)
    }
}

macro_rules! base_setters {
    () => {
        pub fn question_id(mut self, id: Uuid) -> Self {
            self.base.question_id = id;
            self
        }

        pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
            self.base.prompt = prompt.into();
            self
        }

        pub fn target_word(mut self, c: char) -> Self {
            self.base.target_word = Some(c);
            self
        }

        pub fn exp(mut self, exp: i32) -> Self {
            self.base.exp = exp;
            self
        }

        pub fn time_limit(mut self, secs: u32) -> Self {
            self.base.time_limit = secs;
            self
        }

        pub fn given_image(mut self, url: impl Into<String>, alt: Option<String>) -> Self {
            let id = self.base.next_material_id();
            self.base.given.push(GivenMaterial::image(id, url, alt));
            self
        }
    };
}

/// Builder for multi-choice questions.
pub struct McqBuilder {
    base: BuilderBase,
    choices: Vec<ChoiceOption>,
    correct: Vec<u32>,
    min_choices: u32,
    max_choices: u32,
    strict_order: bool,
    randomize: bool,
    display: ChoiceDisplay,
}

impl McqBuilder {
    pub fn new(kind: QuestionKind) -> Self {
        Self {
            base: BuilderBase::new(kind),
            choices: Vec::new(),
            correct: Vec::new(),
            min_choices: 1,
            max_choices: 1,
            strict_order: false,
            randomize: true,
            display: ChoiceDisplay::grid(2, 2),
        }
    }

    base_setters!();

    pub fn given_text(mut self, text: impl Into<String>, kind: MaterialKind) -> Self {
        let id = self.base.next_material_id();
        self.base.given.push(GivenMaterial::text(id, text, kind));
        self
    }

    pub fn given_sound(mut self, url: impl Into<String>) -> Self {
        let id = self.base.next_material_id();
        self.base.given.push(GivenMaterial::sound(id, url));
        self
    }

    /// Append one option. Correct options are recorded in insertion order,
    /// which is the answer sequence when `strict_order` is set.
    pub fn choice(mut self, text: Option<String>, image: Option<String>, is_answer: bool) -> Self {
        let option_id = self.choices.len() as u32 + 1;
        self.choices.push(ChoiceOption {
            option_id,
            text,
            image,
        });
        if is_answer {
            self.correct.push(option_id);
        }
        self
    }

    /// Append text options with a parallel correctness mask.
    pub fn text_choices<S: AsRef<str>>(mut self, choices: &[S], is_answers: &[bool]) -> Self {
        for (text, is_answer) in choices.iter().zip(is_answers) {
            self = self.choice(Some(text.as_ref().to_string()), None, *is_answer);
        }
        self
    }

    pub fn choice_bounds(mut self, min: u32, max: u32) -> Self {
        self.min_choices = min;
        self.max_choices = max;
        self
    }

    pub fn strict_order(mut self, strict: bool) -> Self {
        self.strict_order = strict;
        self
    }

    pub fn randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    pub fn display(mut self, display: ChoiceDisplay) -> Self {
        self.display = display;
        self
    }

    pub fn build(self) -> Result<Question, ValidationError> {
        let answers = vec![ChoiceAnswer {
            answer_id: 1,
            choices: self.correct,
        }];
        let payload = AnswerPayload::MultiChoice(MultiChoice {
            time_limit: self.base.time_limit,
            min_choices: self.min_choices,
            max_choices: self.max_choices,
            choices: self.choices,
            strict_order: self.strict_order,
            randomize: self.randomize,
            display: self.display,
            answers,
            submitted_answers: None,
        });
        self.base.finish(payload)
    }
}

/// Builder for pairing questions. Option ids are unique across all pairs.
pub struct PairingBuilder {
    base: BuilderBase,
    pairs: Vec<PairingGroup>,
    next_option_id: u32,
    randomize: bool,
    display: ChoiceDisplay,
}

impl PairingBuilder {
    pub fn new(kind: QuestionKind) -> Self {
        Self {
            base: BuilderBase::new(kind),
            pairs: Vec::new(),
            next_option_id: 1,
            randomize: true,
            display: ChoiceDisplay::grid(2, 2),
        }
    }

    base_setters!();

    pub fn pair(
        mut self,
        text1: Option<String>,
        image1: Option<String>,
        text2: Option<String>,
        image2: Option<String>,
    ) -> Self {
        let pair_id = self.pairs.len() as u32 + 1;
        let first = ChoiceOption {
            option_id: self.next_option_id,
            text: text1,
            image: image1,
        };
        let second = ChoiceOption {
            option_id: self.next_option_id + 1,
            text: text2,
            image: image2,
        };
        self.next_option_id += 2;
        self.pairs.push(PairingGroup {
            pair_id,
            items: vec![first, second],
        });
        self
    }

    pub fn text_pair(self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.pair(Some(first.into()), None, Some(second.into()), None)
    }

    pub fn randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    pub fn display(mut self, display: ChoiceDisplay) -> Self {
        self.display = display;
        self
    }

    pub fn build(self) -> Result<Question, ValidationError> {
        let payload = AnswerPayload::Pairing(Pairing {
            time_limit: self.base.time_limit,
            pairs: self.pairs,
            randomize: self.randomize,
            display: self.display,
            submitted_pairs: None,
        });
        self.base.finish(payload)
    }
}

/// Builder for handwriting questions.
pub struct WritingBuilder {
    base: BuilderBase,
    handwrite_target: Option<char>,
    submit_url: Option<String>,
    background_image: Option<String>,
}

impl WritingBuilder {
    pub fn new(kind: QuestionKind) -> Self {
        Self {
            base: BuilderBase::new(kind),
            handwrite_target: None,
            submit_url: None,
            background_image: None,
        }
    }

    base_setters!();

    pub fn handwrite_target(mut self, c: char) -> Self {
        self.handwrite_target = Some(c);
        self
    }

    pub fn submit_url(mut self, url: impl Into<String>) -> Self {
        self.submit_url = Some(url.into());
        self
    }

    pub fn background_image(mut self, url: impl Into<String>) -> Self {
        self.background_image = Some(url.into());
        self
    }

    pub fn build(self) -> Result<Question, ValidationError> {
        let handwrite_target = self
            .handwrite_target
            .ok_or(ValidationError::MissingTargetWord)?;
        let submit_url = self
            .submit_url
            .ok_or_else(|| ValidationError::Display("writing question needs a submit URL".into()))?;
        let payload = AnswerPayload::Writing(Writing {
            time_limit: self.base.time_limit,
            handwrite_target,
            submit_url,
            background_image: self.background_image,
            submitted_image: None,
            is_correct: None,
        });
        self.base.finish(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::model::{AnswerKind, DisplayKind};

    #[test]
    fn test_mcq_builder_assigns_option_ids_and_answer() {
        let q = McqBuilder::new(QuestionKind::FillInVocab)
            .prompt("Fill in the blank")
            .target_word('請')
            .given_text("？求", MaterialKind::TextLong)
            .text_choices(&["情", "清", "精", "請"], &[false, false, false, true])
            .time_limit(30)
            .build()
            .unwrap();

        assert_eq!(q.answer_type, AnswerKind::MultiChoice);
        let mcq = q.payload.as_mcq().unwrap();
        assert_eq!(mcq.choices.len(), 4);
        assert_eq!(
            mcq.choices.iter().map(|c| c.option_id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(mcq.answers.len(), 1);
        assert_eq!(mcq.answers[0].choices, vec![4]);
        assert_eq!(mcq.time_limit, 30);
    }

    #[test]
    fn test_mcq_builder_requires_target_word() {
        let err = McqBuilder::new(QuestionKind::Listening)
            .text_choices(&["一"], &[true])
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingTargetWord));
    }

    #[test]
    fn test_combine_radical_requires_strict_order() {
        let err = McqBuilder::new(QuestionKind::CombineRadical)
            .target_word('明')
            .given_image("https://img.example/ming.png", None)
            .text_choices(&["日", "月"], &[true, true])
            .strict_order(false)
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::StrictOrderRequired { .. }));

        McqBuilder::new(QuestionKind::CombineRadical)
            .target_word('明')
            .given_image("https://img.example/ming.png", None)
            .text_choices(&["日", "月"], &[true, true])
            .strict_order(true)
            .choice_bounds(2, 2)
            .build()
            .unwrap();
    }

    #[test]
    fn test_pairing_builder_globally_unique_option_ids() {
        let q = PairingBuilder::new(QuestionKind::PairingCards)
            .prompt("Match the items below")
            .target_word('蘋')
            .text_pair("蘋", "果")
            .text_pair("香", "蕉")
            .build()
            .unwrap();

        let pairing = q.payload.as_pairing().unwrap();
        assert_eq!(pairing.pairs.len(), 2);
        let ids: Vec<u32> = pairing
            .pairs
            .iter()
            .flat_map(|p| p.items.iter().map(|i| i.option_id))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_pairing_builder_rejects_empty() {
        let err = PairingBuilder::new(QuestionKind::PairingCards)
            .target_word('蘋')
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::NoPairs));
    }

    #[test]
    fn test_writing_builder() {
        let q = WritingBuilder::new(QuestionKind::CopyStroke)
            .prompt("Copy the character")
            .target_word('中')
            .handwrite_target('中')
            .submit_url("https://files.example/upload")
            .build()
            .unwrap();

        assert_eq!(q.answer_type, AnswerKind::Writing);
        let writing = q.payload.as_writing().unwrap();
        assert_eq!(writing.handwrite_target, '中');
        assert!(writing.submitted_image.is_none());
    }

    #[test]
    fn test_writing_builder_requires_submit_url() {
        let err = WritingBuilder::new(QuestionKind::CopyStroke)
            .target_word('中')
            .handwrite_target('中')
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::Display(_)));
    }

    #[test]
    fn test_display_override() {
        let q = McqBuilder::new(QuestionKind::Listening)
            .target_word('馬')
            .text_choices(&["馬", "的", "是", "草"], &[true, false, false, false])
            .display(ChoiceDisplay::list(4))
            .build()
            .unwrap();
        let mcq = q.payload.as_mcq().unwrap();
        assert_eq!(mcq.display.display_type, DisplayKind::List);
        assert!(mcq.display.columns.is_none());
    }
}
