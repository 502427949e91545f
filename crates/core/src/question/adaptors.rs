// crates/core/src/question/adaptors.rs
//! Adaptors from the external generator's structured response shapes to
//! canonical questions.
//!
//! Each adaptor is pure except for the `Rng` it draws from, and guarantees
//! that the produced question targets the requested character and (for the
//! multi-choice shapes) that the target appears as a choice exactly once.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::builder::{McqBuilder, PairingBuilder};
use super::model::{MaterialKind, Question, QuestionKind, ValidationError};
use crate::chars::is_cjk;

/// Distractor count for the four-choice shapes.
const SIMILAR_CHOICES: usize = 3;
const MCQ_TIME_LIMIT_SECS: u32 = 30;

#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("generator returned '{0}' where a single CJK character was expected")]
    BadTargetChar(String),

    #[error("no vocabulary contains the target character '{0}'")]
    VocabMissingTarget(char),

    #[error("the sentence does not contain the target character '{0}'")]
    SentenceMissingTarget(char),

    #[error("no usable two-character words for '{0}'")]
    NoPairs(char),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Generator output for a fill-in-vocab question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillInVocabFormat {
    pub given_char: String,
    pub vocabularies: Vec<String>,
    pub similar_characters: Vec<String>,
}

/// Generator output for a fill-in-sentence question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillInSentenceFormat {
    pub given_char: String,
    pub sentence: String,
    pub similar_characters: Vec<String>,
}

/// Generator output for a pairing-cards question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingCardsFormat {
    pub target_char: String,
    #[serde(default)]
    pub n: Option<u32>,
    pub words: Vec<String>,
}

fn single_cjk(s: &str) -> Result<char, AdaptError> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if is_cjk(c) => Ok(c),
        _ => Err(AdaptError::BadTargetChar(s.to_string())),
    }
}

/// Assemble the four-choice list: up to three distinct similar characters
/// plus the target, which must end up in the list exactly once.
fn four_choices(target: char, similar: &[String]) -> (Vec<String>, Vec<bool>) {
    let mut choices: Vec<String> = Vec::with_capacity(SIMILAR_CHOICES + 1);
    for s in similar {
        if choices.len() == SIMILAR_CHOICES {
            break;
        }
        let Some(c) = s.chars().next() else { continue };
        if s.chars().count() != 1 || !is_cjk(c) || c == target {
            continue;
        }
        if choices.iter().any(|existing| existing == s) {
            continue;
        }
        choices.push(s.clone());
    }
    choices.push(target.to_string());
    let mask: Vec<bool> = choices.iter().map(|c| *c == target.to_string()).collect();
    (choices, mask)
}

/// Replace the first occurrence of `target` in `text` with `?`.
fn blank_first(text: &str, target: char) -> String {
    let mut replaced = false;
    text.chars()
        .map(|c| {
            if c == target && !replaced {
                replaced = true;
                '?'
            } else {
                c
            }
        })
        .collect()
}

/// Replace every occurrence of `target` in `text` with `?`.
fn blank_all(text: &str, target: char) -> String {
    text.chars()
        .map(|c| if c == target { '?' } else { c })
        .collect()
}

/// Build a fill-in-vocab question: pick a random vocabulary containing the
/// target, blank its first occurrence, and offer four choices.
pub fn adapt_fill_in_vocab(
    format: &FillInVocabFormat,
    rng: &mut impl Rng,
) -> Result<Question, AdaptError> {
    let target = single_cjk(&format.given_char)?;

    let valid: Vec<&String> = format
        .vocabularies
        .iter()
        .filter(|v| v.chars().any(|c| c == target))
        .collect();
    let vocab = valid
        .choose(rng)
        .ok_or(AdaptError::VocabMissingTarget(target))?;
    let blanked = blank_first(vocab, target);

    let (choices, mask) = four_choices(target, &format.similar_characters);

    let question = McqBuilder::new(QuestionKind::FillInVocab)
        .prompt("Fill in the blank")
        .target_word(target)
        .given_text(blanked, MaterialKind::TextLong)
        .text_choices(&choices, &mask)
        .randomize(true)
        .time_limit(MCQ_TIME_LIMIT_SECS)
        .build()?;
    Ok(question)
}

/// Build a fill-in-sentence question: blank every occurrence of the target
/// in the sentence and offer four choices.
pub fn adapt_fill_in_sentence(format: &FillInSentenceFormat) -> Result<Question, AdaptError> {
    let target = single_cjk(&format.given_char)?;

    if !format.sentence.chars().any(|c| c == target) {
        return Err(AdaptError::SentenceMissingTarget(target));
    }
    let blanked = blank_all(&format.sentence, target);

    let (choices, mask) = four_choices(target, &format.similar_characters);

    let question = McqBuilder::new(QuestionKind::FillInSentence)
        .prompt("Fill in the sentence")
        .target_word(target)
        .given_text(blanked, MaterialKind::TextLong)
        .text_choices(&choices, &mask)
        .randomize(true)
        .time_limit(MCQ_TIME_LIMIT_SECS)
        .build()?;
    Ok(question)
}

/// Build a pairing-cards question: every two-character word is split into a
/// pair of halves; words of any other length are discarded.
pub fn adapt_pairing_cards(format: &PairingCardsFormat) -> Result<Question, AdaptError> {
    let target = single_cjk(&format.target_char)?;

    let mut builder = PairingBuilder::new(QuestionKind::PairingCards)
        .prompt("Match the items below")
        .target_word(target)
        .randomize(true);

    let mut added = 0usize;
    for word in &format.words {
        let halves: Vec<char> = word.chars().collect();
        if halves.len() != 2 {
            continue;
        }
        builder = builder.text_pair(halves[0].to_string(), halves[1].to_string());
        added += 1;
    }
    if added == 0 {
        return Err(AdaptError::NoPairs(target));
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn vocab_format() -> FillInVocabFormat {
        FillInVocabFormat {
            given_char: "請".into(),
            vocabularies: vec!["請求".into(), "邀請".into(), "早安".into()],
            similar_characters: vec!["情".into(), "清".into(), "精".into()],
        }
    }

    #[test]
    fn test_fill_in_vocab_blanks_target() {
        let q = adapt_fill_in_vocab(&vocab_format(), &mut rng()).unwrap();
        assert_eq!(q.target_word, '請');
        assert_eq!(q.question_type, QuestionKind::FillInVocab);

        let text = q.given.as_ref().unwrap()[0].text.as_deref().unwrap();
        assert!(text.contains('?'), "blanked text: {text}");
        assert!(!text.contains('請'));
    }

    #[test]
    fn test_fill_in_vocab_target_is_a_choice_exactly_once() {
        let q = adapt_fill_in_vocab(&vocab_format(), &mut rng()).unwrap();
        let mcq = q.payload.as_mcq().unwrap();
        let target_count = mcq
            .choices
            .iter()
            .filter(|c| c.text.as_deref() == Some("請"))
            .count();
        assert_eq!(target_count, 1);
        assert_eq!(mcq.choices.len(), 4);
        // The marked answer is the target.
        let answer_id = mcq.answers[0].choices[0];
        let answer = mcq.choices.iter().find(|c| c.option_id == answer_id);
        assert_eq!(answer.unwrap().text.as_deref(), Some("請"));
    }

    #[test]
    fn test_fill_in_vocab_dedupes_target_from_similars() {
        let mut format = vocab_format();
        // Generator disobeyed and echoed the target among the similars.
        format.similar_characters = vec!["請".into(), "情".into(), "清".into(), "精".into()];
        let q = adapt_fill_in_vocab(&format, &mut rng()).unwrap();
        let mcq = q.payload.as_mcq().unwrap();
        let target_count = mcq
            .choices
            .iter()
            .filter(|c| c.text.as_deref() == Some("請"))
            .count();
        assert_eq!(target_count, 1);
    }

    #[test]
    fn test_fill_in_vocab_rejects_missing_target() {
        let mut format = vocab_format();
        format.vocabularies = vec!["早安".into()];
        assert!(matches!(
            adapt_fill_in_vocab(&format, &mut rng()),
            Err(AdaptError::VocabMissingTarget('請'))
        ));
    }

    #[test]
    fn test_fill_in_sentence_blanks_every_occurrence() {
        let format = FillInSentenceFormat {
            given_char: "上".into(),
            sentence: "他上樓又上車".into(),
            similar_characters: vec!["尚".into(), "卜".into(), "卡".into()],
        };
        let q = adapt_fill_in_sentence(&format).unwrap();
        let text = q.given.as_ref().unwrap()[0].text.as_deref().unwrap();
        assert_eq!(text, "他?樓又?車");
    }

    #[test]
    fn test_fill_in_sentence_rejects_absent_target() {
        let format = FillInSentenceFormat {
            given_char: "上".into(),
            sentence: "完全無關的句子".into(),
            similar_characters: vec![],
        };
        assert!(matches!(
            adapt_fill_in_sentence(&format),
            Err(AdaptError::SentenceMissingTarget('上'))
        ));
    }

    #[test]
    fn test_pairing_cards_splits_two_char_words() {
        let format = PairingCardsFormat {
            target_char: "蘋".into(),
            n: Some(2),
            words: vec!["蘋果".into(), "香蕉".into(), "三個字".into(), "橘子".into()],
        };
        let q = adapt_pairing_cards(&format).unwrap();
        let pairing = q.payload.as_pairing().unwrap();
        // The three-character word is discarded.
        assert_eq!(pairing.pairs.len(), 3);
        assert_eq!(pairing.pairs[0].items[0].text.as_deref(), Some("蘋"));
        assert_eq!(pairing.pairs[0].items[1].text.as_deref(), Some("果"));
    }

    #[test]
    fn test_pairing_cards_rejects_no_usable_words() {
        let format = PairingCardsFormat {
            target_char: "蘋".into(),
            n: Some(2),
            words: vec!["三個字".into()],
        };
        assert!(matches!(
            adapt_pairing_cards(&format),
            Err(AdaptError::NoPairs('蘋'))
        ));
    }

    #[test]
    fn test_bad_target_char() {
        let format = PairingCardsFormat {
            target_char: "abc".into(),
            n: None,
            words: vec![],
        };
        assert!(matches!(
            adapt_pairing_cards(&format),
            Err(AdaptError::BadTargetChar(_))
        ));
    }
}
