// crates/llm/src/generator.rs
//! Batch generation of AI-backed questions: one generator round trip per
//! batch of characters, adapted into canonical questions.

use crate::client::{GenerateError, GeneratorClient};
use crate::prompts;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use zixue_core::{
    adapt_fill_in_sentence, adapt_fill_in_vocab, adapt_pairing_cards, FillInSentenceFormat,
    FillInVocabFormat, PairingCardsFormat, Question,
};

#[derive(Debug, Deserialize)]
struct FillInVocabList {
    questions: Vec<FillInVocabFormat>,
}

#[derive(Debug, Deserialize)]
struct FillInSentenceList {
    questions: Vec<FillInSentenceFormat>,
}

#[derive(Debug, Deserialize)]
struct PairingCardsList {
    questions: Vec<PairingCardsFormat>,
}

/// Generator for the AI-backed question kinds. Stateless apart from the
/// shared client handle.
pub struct AiQuestionGenerator {
    client: Arc<GeneratorClient>,
}

impl AiQuestionGenerator {
    pub fn new(client: Arc<GeneratorClient>) -> Self {
        Self { client }
    }

    fn join_chars(chars: &[char]) -> String {
        chars
            .iter()
            .map(char::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// One fill-in-vocab question per character.
    pub async fn batch_fill_in_vocab(
        &self,
        chars: Vec<char>,
        max_tokens: u32,
    ) -> Result<Vec<Question>, GenerateError> {
        let user_prompt = Self::join_chars(&chars);
        let list: FillInVocabList = self
            .client
            .generate_structured(
                prompts::PROMPT_FILL_IN_VOCAB,
                &user_prompt,
                &prompts::fill_in_vocab_schema(),
                max_tokens,
            )
            .await?;
        debug!(requested = chars.len(), received = list.questions.len(), "fill_in_vocab batch");

        let mut rng = rand::thread_rng();
        list.questions
            .iter()
            .map(|format| {
                adapt_fill_in_vocab(format, &mut rng)
                    .map_err(|e| GenerateError::Schema(e.to_string()))
            })
            .collect()
    }

    /// One fill-in-sentence question per character.
    pub async fn batch_fill_in_sentence(
        &self,
        chars: Vec<char>,
        max_tokens: u32,
    ) -> Result<Vec<Question>, GenerateError> {
        let user_prompt = Self::join_chars(&chars);
        let list: FillInSentenceList = self
            .client
            .generate_structured(
                prompts::PROMPT_FILL_IN_SENTENCE,
                &user_prompt,
                &prompts::fill_in_sentence_schema(),
                max_tokens,
            )
            .await?;
        debug!(requested = chars.len(), received = list.questions.len(), "fill_in_sentence batch");

        list.questions
            .iter()
            .map(|format| {
                adapt_fill_in_sentence(format).map_err(|e| GenerateError::Schema(e.to_string()))
            })
            .collect()
    }

    /// One pairing-cards question per character.
    pub async fn batch_pairing_cards(
        &self,
        chars: Vec<char>,
        max_tokens: u32,
    ) -> Result<Vec<Question>, GenerateError> {
        let user_prompt = chars
            .iter()
            .map(|c| format!("({c}, n=2, k=4)"))
            .collect::<Vec<_>>()
            .join(", ");
        let list: PairingCardsList = self
            .client
            .generate_structured(
                prompts::PROMPT_PAIRING_CARDS,
                &user_prompt,
                &prompts::pairing_cards_schema(),
                max_tokens,
            )
            .await?;
        debug!(requested = chars.len(), received = list.questions.len(), "pairing_cards batch");

        list.questions
            .iter()
            .map(|format| {
                adapt_pairing_cards(format).map_err(|e| GenerateError::Schema(e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_chars() {
        assert_eq!(AiQuestionGenerator::join_chars(&['請', '蘋']), "請, 蘋");
        assert_eq!(AiQuestionGenerator::join_chars(&[]), "");
    }

    #[test]
    fn test_list_shapes_deserialize() {
        let raw = r#"{"questions":[
            {"given_char":"請","vocabularies":["請求"],"similar_characters":["情","清","精"]}
        ]}"#;
        let list: FillInVocabList = serde_json::from_str(raw).unwrap();
        assert_eq!(list.questions.len(), 1);
        assert_eq!(list.questions[0].given_char, "請");

        let raw = r#"{"questions":[
            {"target_char":"蘋","n":2,"words":["蘋果","香蕉"]}
        ]}"#;
        let list: PairingCardsList = serde_json::from_str(raw).unwrap();
        assert_eq!(list.questions[0].words.len(), 2);
    }
}
