//! Bounded worker pool driving per-part transfer tasks
//!
//! The pool runs `task_num` workers over a shared queue of incomplete
//! parts. Failure is data here: a part task converts any error into a
//! failed `PartResult` and keeps the pool draining, so one bad part
//! never aborts its siblings. The orchestrator interprets the collected
//! results after everything has finished.

use crate::error::{Result, StorageError};
use crate::transfer::checkpoint::CheckpointStore;
use crate::transfer::partition::Part;
use crate::types::PartTag;
use futures::future::join_all;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of one part task. Ephemeral: collected by the pool, consumed
/// by the orchestrator, never persisted.
#[derive(Debug, Clone)]
pub struct PartResult {
    /// Part number
    pub number: i32,

    /// Byte offset of the part
    pub offset: u64,

    /// Part length in bytes
    pub size: u64,

    /// Captured failure, if the part did not complete
    pub error: Option<StorageError>,
}

impl PartResult {
    fn ok(part: &Part) -> Self {
        Self {
            number: part.number,
            offset: part.offset,
            size: part.size,
            error: None,
        }
    }

    fn failed(part: &Part, error: StorageError) -> Self {
        Self {
            number: part.number,
            offset: part.offset,
            size: part.size,
            error: Some(error),
        }
    }

    /// Whether the part failed
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Run one task per incomplete part on a pool of `task_num` workers.
///
/// `handler` performs the single-part transfer and returns the part's
/// tag (uploads) or None (downloads); on success the part is marked
/// completed and the checkpoint persisted before the worker moves on.
/// Parts already completed in the checkpoint are trusted and yield
/// synthesized successful results without re-transfer.
///
/// Results come back sorted by part number regardless of completion
/// order.
pub(crate) async fn run_pool<F, Fut>(
    parts: &[Part],
    task_num: usize,
    store: Arc<CheckpointStore>,
    handler: F,
) -> Vec<PartResult>
where
    F: Fn(Part) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<Option<PartTag>>> + Send + 'static,
{
    let mut results: Vec<PartResult> = parts
        .iter()
        .filter(|p| p.completed)
        .map(PartResult::ok)
        .collect();

    let pending: VecDeque<Part> = parts.iter().filter(|p| !p.completed).cloned().collect();
    let worker_count = task_num.min(pending.len()).max(1);
    let queue = Arc::new(Mutex::new(pending));

    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let queue = queue.clone();
        let store = store.clone();
        let handler = handler.clone();

        workers.push(tokio::spawn(async move {
            let mut finished = Vec::new();
            loop {
                let part = { queue.lock().await.pop_front() };
                let Some(part) = part else { break };

                let result = match handler(part.clone()).await {
                    Ok(tag) => match store.complete_part(part.number, tag).await {
                        Ok(()) => PartResult::ok(&part),
                        Err(e) => PartResult::failed(&part, e),
                    },
                    Err(e) => {
                        tracing::warn!(
                            part = part.number,
                            error = %e,
                            "part transfer failed"
                        );
                        PartResult::failed(&part, e)
                    }
                };
                finished.push(result);
            }
            finished
        }));
    }

    for outcome in join_all(workers).await {
        match outcome {
            Ok(finished) => results.extend(finished),
            Err(e) => tracing::warn!(error = %e, "part worker aborted"),
        }
    }

    results.sort_by_key(|r| r.number);
    results
}

/// Interpret the drained pool's results: all parts must be accounted
/// for and successful. On failure the first failed part's error (by
/// part number) is surfaced; the rest are logged.
pub(crate) fn aggregate_results(expected: usize, results: &[PartResult]) -> Result<()> {
    if results.len() != expected {
        return Err(StorageError::Io(format!(
            "worker pool drained with {} of {} part results",
            results.len(),
            expected
        )));
    }

    let mut failures = results.iter().filter(|r| r.is_failed());
    let first = failures.next();

    for other in failures {
        if let Some(error) = &other.error {
            tracing::warn!(part = other.number, error = %error, "additional part failure");
        }
    }

    match first {
        Some(result) => match &result.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        },
        None => Ok(()),
    }
}
