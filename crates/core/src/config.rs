// crates/core/src/config.rs
//! Tuning knobs for the selection engine and generator batching.
//!
//! Every knob has a production default and can be overridden through a
//! `ZIXUE_`-prefixed environment variable. Values that fail to parse fall
//! back to the default with a warning rather than aborting startup.

use crate::question::model::QuestionKind;
use std::time::Duration;

/// Selection-engine configuration (§ stage weights, thresholds, caps).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Weight of hours-since-last-wrong in revision priority.
    pub time_weight: f64,
    /// Weight of wrong-count in revision priority.
    pub count_weight: f64,
    /// Mean of the normal jitter added to revision priority.
    pub revision_jitter_mean: f64,
    /// Std-dev of the normal jitter added to revision priority.
    pub revision_jitter_sigma: f64,
    /// Maximum revision words fetched per request.
    pub max_words: usize,
    /// Most-recent questions fetched per word (lateral-join limit).
    pub max_questions_per_word: i64,
    /// Score threshold θ of the good/not-good sigmoid.
    pub goodness_threshold: f64,
    /// Steepness k of the good/not-good sigmoid.
    pub classify_sigmoid_steepness: f64,
    /// Age-decay constant H in hours for the score's age factor.
    pub age_decay_hours: f64,
    /// Cap on never-outdated questions per returned batch.
    pub max_never_outdated: usize,
    /// When false the accuracy factor is clamped to 1.0 (the stored
    /// use/correct counters are not yet trustworthy enough to bias scores).
    pub use_accuracy_factor: bool,
    /// Kinds the engine may dispatch for generation.
    pub available_kinds: Vec<QuestionKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_weight: 1.0,
            count_weight: 2.0,
            revision_jitter_mean: 50.0,
            revision_jitter_sigma: 10.0,
            max_words: 20,
            max_questions_per_word: 50,
            goodness_threshold: 0.6,
            classify_sigmoid_steepness: 10.0,
            age_decay_hours: 168.0,
            max_never_outdated: 3,
            use_accuracy_factor: false,
            available_kinds: vec![
                QuestionKind::CopyStroke,
                QuestionKind::FillInVocab,
                QuestionKind::FillInSentence,
                QuestionKind::Listening,
            ],
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with any `ZIXUE_ENGINE_*` environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        read_env("ZIXUE_ENGINE_TIME_WEIGHT", &mut cfg.time_weight);
        read_env("ZIXUE_ENGINE_COUNT_WEIGHT", &mut cfg.count_weight);
        read_env("ZIXUE_ENGINE_JITTER_MEAN", &mut cfg.revision_jitter_mean);
        read_env("ZIXUE_ENGINE_JITTER_SIGMA", &mut cfg.revision_jitter_sigma);
        read_env("ZIXUE_ENGINE_MAX_WORDS", &mut cfg.max_words);
        read_env(
            "ZIXUE_ENGINE_MAX_QUESTIONS_PER_WORD",
            &mut cfg.max_questions_per_word,
        );
        read_env(
            "ZIXUE_ENGINE_GOODNESS_THRESHOLD",
            &mut cfg.goodness_threshold,
        );
        read_env(
            "ZIXUE_ENGINE_SIGMOID_STEEPNESS",
            &mut cfg.classify_sigmoid_steepness,
        );
        read_env("ZIXUE_ENGINE_AGE_DECAY_HOURS", &mut cfg.age_decay_hours);
        read_env(
            "ZIXUE_ENGINE_MAX_NEVER_OUTDATED",
            &mut cfg.max_never_outdated,
        );
        read_env(
            "ZIXUE_ENGINE_USE_ACCURACY_FACTOR",
            &mut cfg.use_accuracy_factor,
        );
        cfg
    }
}

/// Batching configuration for the generator queue processors.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Items per batch before a batch fires early.
    pub batch_size: usize,
    /// Longest time the head item may wait before the batch fires.
    pub max_wait: Duration,
    /// Token budget per generator call.
    pub max_tokens: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_wait: Duration::from_secs(6),
            max_tokens: 300,
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        read_env("ZIXUE_BATCH_SIZE", &mut cfg.batch_size);
        read_env("ZIXUE_BATCH_MAX_TOKENS", &mut cfg.max_tokens);
        let mut wait_secs = cfg.max_wait.as_secs_f64();
        read_env("ZIXUE_BATCH_MAX_WAIT_SECS", &mut wait_secs);
        cfg.max_wait = Duration::from_secs_f64(wait_secs);
        cfg
    }
}

fn read_env<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => {
                tracing::warn!(key, raw, "ignoring unparsable engine config override");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_words, 20);
        assert_eq!(cfg.max_questions_per_word, 50);
        assert_eq!(cfg.max_never_outdated, 3);
        assert!(!cfg.use_accuracy_factor);
        assert_eq!(cfg.available_kinds.len(), 4);
    }

    #[test]
    fn test_batch_defaults() {
        let cfg = BatchConfig::default();
        assert_eq!(cfg.batch_size, 5);
        assert_eq!(cfg.max_tokens, 300);
        assert_eq!(cfg.max_wait, Duration::from_secs(6));
    }
}
