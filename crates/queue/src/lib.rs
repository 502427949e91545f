// crates/queue/src/lib.rs
//! Coalescing batch queue.
//!
//! A [`QueueManager`] owns named [`BatchProcessor`]s. Callers submit one
//! item and await one result; the processor's background task coalesces
//! items into batches that fire when the queue reaches `batch_size` or when
//! the head item has waited `max_wait`, whichever comes first. The batch
//! function receives the whole batch plus the *head item's* auxiliary
//! arguments (see [`BatchProcessor::submit`] for the caveat) and must return
//! one result per input.

use futures_util::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Errors surfaced to individual waiters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The batch function failed; every waiter of that batch sees the same
    /// message. The processor itself stays operational.
    #[error("batch failed: {0}")]
    Batch(String),

    /// The batch function returned fewer results than inputs; this waiter's
    /// slot was beyond the returned prefix.
    #[error("batch returned {received} results for {expected} inputs")]
    ShortBatch { expected: usize, received: usize },

    /// The processor (or the whole manager) was shut down before this item's
    /// batch fired.
    #[error("queue shut down")]
    Shutdown,

    /// No processor registered under that name.
    #[error("unknown processor '{0}'")]
    UnknownProcessor(String),
}

/// The function a processor is bound to: a whole batch in, one result per
/// item out. Errors are plain strings; the processor clones them out to
/// every waiter of the failed batch.
pub type BatchFn<T, R, A> =
    Arc<dyn Fn(Vec<T>, A) -> BoxFuture<'static, Result<Vec<R>, String>> + Send + Sync>;

struct Pending<T, R, A> {
    item: T,
    aux: A,
    reply: oneshot::Sender<Result<R, QueueError>>,
    enqueued_at: Instant,
}

enum Command<T, R, A> {
    Submit(Pending<T, R, A>),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Point-in-time counters for one processor.
#[derive(Debug, Clone)]
pub struct ProcessorStats {
    pub queued: usize,
    pub batch_size: usize,
    pub max_wait: Duration,
}

/// Handle to one named processor. Cheap to clone through the manager's
/// `Arc`; the background task lives until shutdown.
pub struct BatchProcessor<T, R, A> {
    name: String,
    batch_size: usize,
    max_wait: Duration,
    tx: mpsc::UnboundedSender<Command<T, R, A>>,
    queued: Arc<AtomicUsize>,
    shut_down: Arc<AtomicBool>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<T, R, A> BatchProcessor<T, R, A>
where
    T: Send + 'static,
    R: Send + 'static,
    A: Send + 'static,
{
    fn spawn(name: String, batch_fn: BatchFn<T, R, A>, batch_size: usize, max_wait: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(run_processor(
            name.clone(),
            rx,
            batch_fn,
            batch_size,
            max_wait,
            Arc::clone(&queued),
        ));
        Self {
            name,
            batch_size,
            max_wait,
            tx,
            queued,
            shut_down: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit one item and await its result.
    ///
    /// Caveat carried over from the source system: `aux` of the item at the
    /// *head* of the queue is applied to the entire batch. Callers that pass
    /// differing auxiliary arguments for the same processor silently inherit
    /// the head item's.
    pub async fn submit(&self, item: T, aux: A) -> Result<R, QueueError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(QueueError::Shutdown);
        }
        let (reply, rx) = oneshot::channel();
        let pending = Pending {
            item,
            aux,
            reply,
            enqueued_at: Instant::now(),
        };
        self.queued.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(Command::Submit(pending)).is_err() {
            self.queued.fetch_sub(1, Ordering::Relaxed);
            return Err(QueueError::Shutdown);
        }
        // A dropped reply sender means the worker went away mid-flight.
        rx.await.unwrap_or(Err(QueueError::Shutdown))
    }

    /// Dispatch everything currently queued without waiting for size or age.
    pub async fn flush(&self) -> Result<(), QueueError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack))
            .map_err(|_| QueueError::Shutdown)?;
        rx.await.map_err(|_| QueueError::Shutdown)
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            queued: self.queued.load(Ordering::Relaxed),
            batch_size: self.batch_size,
            max_wait: self.max_wait,
        }
    }

    /// Stop accepting items, dispatch the remaining queue once, and wait for
    /// the background task to finish.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let _ = self.tx.send(Command::Shutdown);
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(processor = %self.name, error = %e, "processor worker ended abnormally");
            }
        }
    }
}

async fn run_processor<T, R, A>(
    name: String,
    mut rx: mpsc::UnboundedReceiver<Command<T, R, A>>,
    batch_fn: BatchFn<T, R, A>,
    batch_size: usize,
    max_wait: Duration,
    queued: Arc<AtomicUsize>,
) where
    T: Send + 'static,
    R: Send + 'static,
    A: Send + 'static,
{
    let mut buffer: VecDeque<Pending<T, R, A>> = VecDeque::new();

    loop {
        let deadline = buffer.front().map(|p| p.enqueued_at + max_wait);
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Submit(pending)) => {
                    buffer.push_back(pending);
                    if buffer.len() >= batch_size {
                        dispatch(&name, &mut buffer, batch_size, &batch_fn, &queued);
                    }
                }
                Some(Command::Flush(ack)) => {
                    while !buffer.is_empty() {
                        dispatch(&name, &mut buffer, batch_size, &batch_fn, &queued);
                    }
                    let _ = ack.send(());
                }
                Some(Command::Shutdown) | None => break,
            },
            _ = sleep_until_opt(deadline), if deadline.is_some() => {
                dispatch(&name, &mut buffer, batch_size, &batch_fn, &queued);
            }
        }
    }

    // Final drain: pending items get one more batch before the task ends.
    while !buffer.is_empty() {
        dispatch(&name, &mut buffer, batch_size, &batch_fn, &queued);
    }
    debug!(processor = %name, "processor worker stopped");
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Take up to one batch off the buffer and run the batch function in its own
/// task so the processor keeps accepting while the batch is in flight.
fn dispatch<T, R, A>(
    name: &str,
    buffer: &mut VecDeque<Pending<T, R, A>>,
    batch_size: usize,
    batch_fn: &BatchFn<T, R, A>,
    queued: &Arc<AtomicUsize>,
) where
    T: Send + 'static,
    R: Send + 'static,
    A: Send + 'static,
{
    let take = buffer.len().min(batch_size);
    let mut batch: Vec<Pending<T, R, A>> = Vec::with_capacity(take);
    for _ in 0..take {
        let Some(pending) = buffer.pop_front() else {
            break;
        };
        queued.fetch_sub(1, Ordering::Relaxed);
        // A closed reply channel means the caller was cancelled while the
        // item sat in the queue; drop it from the batch.
        if pending.reply.is_closed() {
            continue;
        }
        batch.push(pending);
    }
    if batch.is_empty() {
        return;
    }

    let mut items = Vec::with_capacity(batch.len());
    let mut aux = None;
    let mut waiters = Vec::with_capacity(batch.len());
    for pending in batch {
        items.push(pending.item);
        if aux.is_none() {
            aux = Some(pending.aux);
        }
        waiters.push(pending.reply);
    }
    let Some(aux) = aux else {
        return;
    };

    debug!(processor = %name, count = items.len(), "dispatching batch");
    let fut = (batch_fn)(items, aux);
    let name = name.to_string();
    tokio::spawn(async move {
        match fut.await {
            Ok(results) => {
                let expected = waiters.len();
                let received = results.len();
                if received != expected {
                    warn!(
                        processor = %name,
                        expected,
                        received,
                        "batch result length mismatch, truncating"
                    );
                }
                let mut results = results.into_iter();
                for (i, reply) in waiters.into_iter().enumerate() {
                    let outcome = match results.next() {
                        Some(r) if i < expected => Ok(r),
                        _ => Err(QueueError::ShortBatch { expected, received }),
                    };
                    let _ = reply.send(outcome);
                }
            }
            Err(message) => {
                warn!(processor = %name, error = %message, "batch failed");
                for reply in waiters {
                    let _ = reply.send(Err(QueueError::Batch(message.clone())));
                }
            }
        }
    });
}

/// Registry of named processors sharing one (T, R, A) signature.
pub struct QueueManager<T, R, A> {
    processors: Mutex<HashMap<String, Arc<BatchProcessor<T, R, A>>>>,
    shut_down: AtomicBool,
}

impl<T, R, A> QueueManager<T, R, A>
where
    T: Send + 'static,
    R: Send + 'static,
    A: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            processors: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Create (or return the existing) processor under `name`. Creation is
    /// idempotent: a second call with the same name keeps the first binding.
    pub async fn create_processor(
        &self,
        name: &str,
        batch_fn: BatchFn<T, R, A>,
        batch_size: usize,
        max_wait: Duration,
    ) -> Arc<BatchProcessor<T, R, A>> {
        let mut processors = self.processors.lock().await;
        if let Some(existing) = processors.get(name) {
            return Arc::clone(existing);
        }
        let processor = Arc::new(BatchProcessor::spawn(
            name.to_string(),
            batch_fn,
            batch_size,
            max_wait,
        ));
        processors.insert(name.to_string(), Arc::clone(&processor));
        processor
    }

    pub async fn get(&self, name: &str) -> Option<Arc<BatchProcessor<T, R, A>>> {
        self.processors.lock().await.get(name).cloned()
    }

    /// Submit to a named processor and await the item's result.
    pub async fn submit(&self, name: &str, item: T, aux: A) -> Result<R, QueueError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(QueueError::Shutdown);
        }
        let processor = self
            .get(name)
            .await
            .ok_or_else(|| QueueError::UnknownProcessor(name.to_string()))?;
        processor.submit(item, aux).await
    }

    pub async fn flush(&self, name: &str) -> Result<(), QueueError> {
        let processor = self
            .get(name)
            .await
            .ok_or_else(|| QueueError::UnknownProcessor(name.to_string()))?;
        processor.flush().await
    }

    pub async fn stats(&self) -> HashMap<String, ProcessorStats> {
        let processors = self.processors.lock().await;
        processors
            .iter()
            .map(|(name, p)| (name.clone(), p.stats()))
            .collect()
    }

    /// Shut down every processor: each dispatches its remaining queue once,
    /// then refuses new items.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let processors: Vec<_> = {
            let mut guard = self.processors.lock().await;
            guard.drain().map(|(_, p)| p).collect()
        };
        for processor in processors {
            processor.shutdown().await;
        }
    }
}

impl<T, R, A> Default for QueueManager<T, R, A>
where
    T: Send + 'static,
    R: Send + 'static,
    A: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn doubling_fn(calls: Arc<AtomicUsize>) -> BatchFn<u32, u32, ()> {
        Arc::new(move |items, _aux| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(items.into_iter().map(|i| i * 2).collect()) })
        })
    }

    #[tokio::test]
    async fn test_batch_fires_on_size() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager: QueueManager<u32, u32, ()> = QueueManager::new();
        manager
            .create_processor("double", doubling_fn(calls.clone()), 3, Duration::from_secs(60))
            .await;

        let mut handles = Vec::new();
        let manager = Arc::new(manager);
        for i in 0..3 {
            let m = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { m.submit("double", i, ()).await }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), i as u32 * 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "one batch for three items");
    }

    #[tokio::test(start_paused = true)]
    async fn test_head_item_dispatched_within_max_wait() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager: QueueManager<u32, u32, ()> = QueueManager::new();
        manager
            .create_processor("double", doubling_fn(calls.clone()), 5, Duration::from_secs(1))
            .await;
        let manager = Arc::new(manager);

        let m = Arc::clone(&manager);
        let waiter = tokio::spawn(async move { m.submit("double", 21, ()).await });

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(waiter.await.unwrap().unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_six_submissions_make_two_batches() {
        // batch_size 5, max_wait 1s: first five fire immediately as one
        // batch, the sixth within a second.
        let calls = Arc::new(AtomicUsize::new(0));
        let manager: Arc<QueueManager<u32, u32, ()>> = Arc::new(QueueManager::new());
        manager
            .create_processor("double", doubling_fn(calls.clone()), 5, Duration::from_secs(1))
            .await;

        let mut handles = Vec::new();
        for i in 0..6 {
            let m = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { m.submit("double", i, ()).await }));
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), i as u32 * 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_results_truncate_with_error_for_excess() {
        let short_fn: BatchFn<u32, u32, ()> = Arc::new(|items, _| {
            Box::pin(async move {
                // Drop the last result.
                let n = items.len().saturating_sub(1);
                Ok(items.into_iter().take(n).map(|i| i + 1).collect())
            })
        });
        let manager: Arc<QueueManager<u32, u32, ()>> = Arc::new(QueueManager::new());
        manager
            .create_processor("short", short_fn, 3, Duration::from_secs(60))
            .await;

        let mut handles = Vec::new();
        for i in 0..3 {
            let m = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { m.submit("short", i, ()).await }));
        }
        let results: Vec<_> = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results[0], Ok(1));
        assert_eq!(results[1], Ok(2));
        assert_eq!(
            results[2],
            Err(QueueError::ShortBatch {
                expected: 3,
                received: 2
            })
        );
    }

    #[tokio::test]
    async fn test_batch_error_reaches_every_waiter_and_processor_survives() {
        let fail_once = Arc::new(AtomicUsize::new(0));
        let flaky: BatchFn<u32, u32, ()> = {
            let fail_once = Arc::clone(&fail_once);
            Arc::new(move |items, _| {
                let first = fail_once.fetch_add(1, Ordering::SeqCst) == 0;
                Box::pin(async move {
                    if first {
                        Err("generator exploded".to_string())
                    } else {
                        Ok(items.into_iter().map(|i| i * 2).collect())
                    }
                })
            })
        };
        let manager: Arc<QueueManager<u32, u32, ()>> = Arc::new(QueueManager::new());
        manager
            .create_processor("flaky", flaky, 2, Duration::from_secs(60))
            .await;

        let mut handles = Vec::new();
        for i in 0..2 {
            let m = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { m.submit("flaky", i, ()).await }));
        }
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err, QueueError::Batch("generator exploded".into()));
        }

        // The processor keeps working after a failed batch.
        let mut handles = Vec::new();
        for i in 0..2 {
            let m = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { m.submit("flaky", i, ()).await }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), i as u32 * 2);
        }
    }

    #[tokio::test]
    async fn test_flush_drains_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager: Arc<QueueManager<u32, u32, ()>> = Arc::new(QueueManager::new());
        manager
            .create_processor("double", doubling_fn(calls.clone()), 100, Duration::from_secs(600))
            .await;

        let m = Arc::clone(&manager);
        let waiter = tokio::spawn(async move { m.submit("double", 5, ()).await });
        // Give the submit a chance to land in the queue.
        tokio::task::yield_now().await;
        manager.flush("double").await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_then_rejects() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager: Arc<QueueManager<u32, u32, ()>> = Arc::new(QueueManager::new());
        manager
            .create_processor("double", doubling_fn(calls.clone()), 100, Duration::from_secs(600))
            .await;

        let m = Arc::clone(&manager);
        let waiter = tokio::spawn(async move { m.submit("double", 7, ()).await });
        tokio::task::yield_now().await;

        manager.shutdown().await;
        // The queued item still got its batch.
        assert_eq!(waiter.await.unwrap().unwrap(), 14);
        // New submissions are refused.
        assert_eq!(
            manager.submit("double", 1, ()).await,
            Err(QueueError::Shutdown)
        );
    }

    #[tokio::test]
    async fn test_head_aux_applies_to_whole_batch() {
        let seen_aux: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let record: BatchFn<u32, u32, u32> = {
            let seen_aux = Arc::clone(&seen_aux);
            Arc::new(move |items, aux| {
                let seen_aux = Arc::clone(&seen_aux);
                Box::pin(async move {
                    seen_aux.lock().await.push(aux);
                    Ok(items)
                })
            })
        };
        let manager: Arc<QueueManager<u32, u32, u32>> = Arc::new(QueueManager::new());
        manager
            .create_processor("record", record, 2, Duration::from_secs(60))
            .await;

        let m1 = Arc::clone(&manager);
        let h1 = tokio::spawn(async move { m1.submit("record", 1, 111).await });
        tokio::task::yield_now().await;
        let m2 = Arc::clone(&manager);
        let h2 = tokio::spawn(async move { m2.submit("record", 2, 222).await });

        h1.await.unwrap().unwrap();
        h2.await.unwrap().unwrap();
        // Only the head item's aux was used.
        assert_eq!(*seen_aux.lock().await, vec![111]);
    }

    #[tokio::test]
    async fn test_unknown_processor() {
        let manager: QueueManager<u32, u32, ()> = QueueManager::new();
        assert!(matches!(
            manager.submit("nope", 1, ()).await,
            Err(QueueError::UnknownProcessor(_))
        ));
    }

    #[tokio::test]
    async fn test_create_processor_idempotent() {
        let manager: QueueManager<u32, u32, ()> = QueueManager::new();
        let a = manager
            .create_processor("p", doubling_fn(Arc::new(AtomicUsize::new(0))), 2, Duration::from_secs(1))
            .await;
        let b = manager
            .create_processor("p", doubling_fn(Arc::new(AtomicUsize::new(0))), 9, Duration::from_secs(9))
            .await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.stats().batch_size, 2);
    }
}
