// crates/core/src/lib.rs
//! Domain model for the zixue practice backend: the polymorphic question
//! shape, typed builders, generator-output adaptors, character helpers,
//! level math, engine tuning knobs, and collaborator traits.

pub mod chars;
pub mod collab;
pub mod config;
pub mod level;
pub mod question;

pub use chars::{char_for_codepoint, codepoint, is_cjk, CharError};
pub use collab::{
    BlobStore, CollabError, DictionaryScraper, HandwriteVerdict, HandwritingRecognizer,
    ScanResult, ScannedChar, StoredFile, WordInfo,
};
pub use config::{BatchConfig, EngineConfig};
pub use level::level_for_exp;
pub use question::adaptors::{
    adapt_fill_in_sentence, adapt_fill_in_vocab, adapt_pairing_cards, AdaptError,
    FillInSentenceFormat, FillInVocabFormat, PairingCardsFormat,
};
pub use question::builder::{McqBuilder, PairingBuilder, WritingBuilder};
pub use question::model::{
    AnswerKind, AnswerPayload, ChoiceAnswer, ChoiceDisplay, ChoiceOption, DisplayKind,
    GivenMaterial, MaterialKind, MultiChoice, Pairing, PairingGroup, Question, QuestionKind,
    ValidationError, Writing,
};

/// Current wall-clock time as a UNIX timestamp in seconds.
///
/// All persisted timestamps in the system use this representation.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
