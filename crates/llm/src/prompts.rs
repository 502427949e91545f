// crates/llm/src/prompts.rs
//! System prompts and response schemas for the three AI question kinds.
//!
//! Each prompt asks for a Traditional-Chinese question batch and a strict
//! JSON object; the matching schema is handed to the generator's
//! structured-output mode.

use serde_json::{json, Value as Json};

pub const PROMPT_FILL_IN_VOCAB: &str = r#"
Generate "fill in the vocabulary" material for a list of Chinese characters.
For each given character:
1. Produce up to 5 two-character Traditional Chinese vocabularies that contain the character.
2. Produce 3 other characters similar to it, all distinct from each other and from the given
   character. Similar means: sharing radicals or visual shape, similar Cantonese (Jyutping)
   pronunciation (NOT Mandarin), or similar meaning that still yields a nonsensical word when
   substituted.
If no similar characters exist, pick 3 arbitrary distinct characters instead.
NEVER include the given character among the similar characters.
Respond with a single JSON object, double-quoted property names, no code fences.

Example input:
請, 蘋
Example output:
{"questions":[
  {"given_char":"請","vocabularies":["請求","請假","請客","請教","請安"],"similar_characters":["情","清","精"]},
  {"given_char":"蘋","vocabularies":["蘋果"],"similar_characters":["平","評","拼"]}
]}
"#;

pub const PROMPT_FILL_IN_SENTENCE: &str = r#"
Generate "fill in the sentence" material for a list of Chinese characters.
For each given character:
1. Write one complete, child-friendly Traditional Chinese sentence containing the character
   exactly once, at most 15 characters, no punctuation besides commas.
2. Produce 3 other characters similar to it, all distinct from each other and from the given
   character. Similar means: sharing radicals or visual shape, similar Cantonese (Jyutping)
   pronunciation (NOT Mandarin), or similar meaning that makes the sentence nonsensical when
   substituted.
If no similar characters exist, pick 3 arbitrary distinct characters instead.
NEVER include the given character among the similar characters.
Respond with a single JSON object, double-quoted property names, no code fences.

Example input:
請, 上
Example output:
{"questions":[
  {"given_char":"請","sentence":"他們正在請客","similar_characters":["情","清","精"]},
  {"given_char":"上","sentence":"他站在樓上看風景","similar_characters":["尚","卜","卡"]}
]}
"#;

pub const PROMPT_PAIRING_CARDS: &str = r#"
Generate vocabulary lists for a card-pairing game from tuples (target_char, n, k).
For each tuple:
1. Produce one valid Traditional Chinese word of length n containing target_char.
2. Produce k-1 other words of the same length and similar difficulty that do NOT contain
   target_char, do not overlap with the correct word in meaning, pronunciation, or radicals,
   and are unrelated to each other.
3. Make sure the halves of different words cannot recombine into other valid words.
Respond with a single JSON object whose "questions" array holds objects with target_char, n,
and words (the correct word first). Double-quoted property names, no code fences.

Example input:
(請, n=2, k=4), (蘋, n=2, k=3)
Example output:
{"questions":[
  {"target_char":"請","n":2,"words":["邀請","出發","動物","經理"]},
  {"target_char":"蘋","n":2,"words":["蘋果","香蕉","橘子"]}
]}
"#;

fn questions_schema(item: Json) -> Json {
    json!({
        "type": "object",
        "properties": {
            "questions": {"type": "array", "items": item}
        },
        "required": ["questions"]
    })
}

/// Schema for the fill-in-vocab batch response.
pub fn fill_in_vocab_schema() -> Json {
    questions_schema(json!({
        "type": "object",
        "properties": {
            "given_char": {"type": "string"},
            "vocabularies": {"type": "array", "items": {"type": "string"}},
            "similar_characters": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["given_char", "vocabularies", "similar_characters"]
    }))
}

/// Schema for the fill-in-sentence batch response.
pub fn fill_in_sentence_schema() -> Json {
    questions_schema(json!({
        "type": "object",
        "properties": {
            "given_char": {"type": "string"},
            "sentence": {"type": "string"},
            "similar_characters": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["given_char", "sentence", "similar_characters"]
    }))
}

/// Schema for the pairing-cards batch response.
pub fn pairing_cards_schema() -> Json {
    questions_schema(json!({
        "type": "object",
        "properties": {
            "target_char": {"type": "string"},
            "n": {"type": "integer"},
            "words": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["target_char", "words"]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_declare_questions_array() {
        for schema in [
            fill_in_vocab_schema(),
            fill_in_sentence_schema(),
            pairing_cards_schema(),
        ] {
            assert_eq!(schema["type"], "object");
            assert_eq!(schema["properties"]["questions"]["type"], "array");
        }
    }

    #[test]
    fn test_prompts_forbid_echoing_target() {
        assert!(PROMPT_FILL_IN_VOCAB.contains("NEVER include the given character"));
        assert!(PROMPT_FILL_IN_SENTENCE.contains("NEVER include the given character"));
    }
}
