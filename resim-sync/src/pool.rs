//! Fixed-size worker pool for fanning out API calls.
//!
//! A phase owns a slice of work items. `workers` futures share an atomic
//! cursor into that slice; each pulls the next index, runs the call, and
//! loops until the slice is exhausted. All workers are polled on the calling
//! task, so memory and open connections stay bounded by the worker count
//! regardless of plan size.
//!
//! Every call races the cancellation token. Once it fires, in-flight calls
//! are dropped (aborting the HTTP request) and no further item is started.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::progress::{Phase, ProgressSink};

/// The default number of concurrent calls per phase.
pub const DEFAULT_WORKERS: usize = 16;

/// Results of one pool run.
#[derive(Debug)]
pub struct PoolOutcome<R> {
    /// `(item index, result)` for every item that ran to completion, in
    /// completion order.
    pub results: Vec<(usize, R)>,
    pub total: usize,
    /// Set when cancellation stopped the run before every item finished.
    pub cancelled: bool,
}

impl<R> PoolOutcome<R> {
    pub fn completed(&self) -> usize {
        self.results.len()
    }
}

/// Bounded-concurrency executor shared by the fetcher and the applier.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        Self {
            workers: workers.max(1),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `call` over every item with at most `self.workers` in flight.
    pub async fn run<'a, T, R, F, Fut>(
        &self,
        phase: Phase,
        items: &'a [T],
        progress: &dyn ProgressSink,
        call: F,
    ) -> PoolOutcome<R>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = R>,
    {
        let total = items.len();
        progress.phase_started(phase, total);

        let cursor = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let cursor = &cursor;
        let completed = &completed;
        let call = &call;
        let cancel = &self.cancel;

        let workers = (0..self.workers.min(total)).map(move |_| async move {
            let mut done = Vec::new();
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(item) = items.get(index) else { break };
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = call(item) => Some(result),
                };
                let Some(result) = result else { break };
                done.push((index, result));
                let finished = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress.item_completed(phase, finished, total);
            }
            done
        });

        let results: Vec<(usize, R)> = join_all(workers).await.into_iter().flatten().collect();
        let cancelled = results.len() < total && self.cancel.is_cancelled();
        PoolOutcome {
            results,
            total,
            cancelled,
        }
    }
}
