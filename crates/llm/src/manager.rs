// crates/llm/src/manager.rs
//! The request manager: one batching queue processor per AI question kind.
//!
//! Callers enqueue a single character and await a single question; the
//! processors coalesce characters into generator batches. Exactly one
//! processor exists per kind, created idempotently at startup.

use crate::generator::AiQuestionGenerator;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use zixue_core::{BatchConfig, Question, QuestionKind};
use zixue_queue::{BatchFn, ProcessorStats, QueueError, QueueManager};

/// Per-item options. Note the batching caveat: the head item's options are
/// applied to the whole batch (see `BatchProcessor::submit`).
#[derive(Debug, Clone, Copy)]
pub struct GenOptions {
    pub max_tokens: u32,
}

/// The AI question kinds with a processor.
pub const AI_KINDS: [QuestionKind; 3] = [
    QuestionKind::FillInVocab,
    QuestionKind::FillInSentence,
    QuestionKind::PairingCards,
];

/// Owns the queue manager and the generator; the application holds this by
/// handle and passes it to the question generator service.
pub struct AiRequestManager {
    queues: QueueManager<char, Question, GenOptions>,
    config: BatchConfig,
}

impl AiRequestManager {
    /// Build the manager and create the per-kind processors.
    pub async fn new(generator: Arc<AiQuestionGenerator>, config: BatchConfig) -> Self {
        let queues = QueueManager::new();

        for kind in AI_KINDS {
            let batch_fn = Self::batch_fn_for(kind, Arc::clone(&generator));
            queues
                .create_processor(kind.as_str(), batch_fn, config.batch_size, config.max_wait)
                .await;
        }
        info!(
            batch_size = config.batch_size,
            max_wait_ms = config.max_wait.as_millis() as u64,
            "created generator processors for {} kinds",
            AI_KINDS.len()
        );
        Self { queues, config }
    }

    fn batch_fn_for(
        kind: QuestionKind,
        generator: Arc<AiQuestionGenerator>,
    ) -> BatchFn<char, Question, GenOptions> {
        Arc::new(move |chars, options: GenOptions| {
            let generator = Arc::clone(&generator);
            Box::pin(async move {
                let result = match kind {
                    QuestionKind::FillInVocab => {
                        generator.batch_fill_in_vocab(chars, options.max_tokens).await
                    }
                    QuestionKind::FillInSentence => {
                        generator
                            .batch_fill_in_sentence(chars, options.max_tokens)
                            .await
                    }
                    QuestionKind::PairingCards => {
                        generator.batch_pairing_cards(chars, options.max_tokens).await
                    }
                    other => {
                        return Err(format!("kind {} has no generator batch", other.as_str()))
                    }
                };
                result.map_err(|e| e.to_string())
            })
        })
    }

    /// Enqueue one character for the kind's processor and await the
    /// generated question.
    pub async fn enqueue(&self, kind: QuestionKind, target: char) -> Result<Question, QueueError> {
        self.enqueue_with_options(
            kind,
            target,
            GenOptions {
                max_tokens: self.config.max_tokens,
            },
        )
        .await
    }

    /// Same as [`Self::enqueue`] with explicit options. The head item's
    /// options govern the whole batch.
    pub async fn enqueue_with_options(
        &self,
        kind: QuestionKind,
        target: char,
        options: GenOptions,
    ) -> Result<Question, QueueError> {
        self.queues.submit(kind.as_str(), target, options).await
    }

    /// Immediately dispatch whatever is queued for a kind.
    pub async fn flush(&self, kind: QuestionKind) -> Result<(), QueueError> {
        self.queues.flush(kind.as_str()).await
    }

    pub async fn stats(&self) -> HashMap<String, ProcessorStats> {
        self.queues.stats().await
    }

    /// Drain and stop all processors; later enqueues fail with
    /// [`QueueError::Shutdown`].
    pub async fn shutdown(&self) {
        self.queues.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{GeneratorClient, GeneratorConfig};
    use std::time::Duration;

    fn offline_manager_parts() -> Arc<AiQuestionGenerator> {
        let client = GeneratorClient::new(GeneratorConfig {
            base_url: "http://127.0.0.1:1".into(),
            api_key: "test".into(),
            model: "test-model".into(),
            default_max_tokens: 300,
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        Arc::new(AiQuestionGenerator::new(Arc::new(client)))
    }

    #[tokio::test]
    async fn test_processors_exist_for_all_ai_kinds() {
        let manager = AiRequestManager::new(offline_manager_parts(), BatchConfig::default()).await;
        let stats = manager.stats().await;
        for kind in AI_KINDS {
            assert!(stats.contains_key(kind.as_str()), "missing {}", kind.as_str());
            assert_eq!(stats[kind.as_str()].batch_size, 5);
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let manager = AiRequestManager::new(offline_manager_parts(), BatchConfig::default()).await;
        manager.shutdown().await;
        let result = manager.enqueue(QuestionKind::FillInVocab, '請').await;
        assert!(matches!(result, Err(QueueError::Shutdown)));
    }

    #[tokio::test]
    async fn test_unreachable_generator_fails_batch_not_processor() {
        let manager = AiRequestManager::new(
            offline_manager_parts(),
            BatchConfig {
                batch_size: 1,
                max_wait: Duration::from_millis(50),
                max_tokens: 50,
            },
        )
        .await;
        // batch_size 1 dispatches immediately; the unreachable endpoint
        // surfaces as a Batch error on this waiter only.
        let result = manager.enqueue(QuestionKind::FillInVocab, '請').await;
        assert!(matches!(result, Err(QueueError::Batch(_))));
        // The processor is still alive.
        let stats = manager.stats().await;
        assert!(stats.contains_key("fill_in_vocab"));
        manager.shutdown().await;
    }
}
