use std::fmt;

use hammer_core::errors::{ErrorInfo, HammerError};
use rayon::prelude::*;
use tracing::{Dispatch, Span};

/// Fixed-size worker pool used to evaluate likelihoods in parallel.
///
/// Results are always returned in input order, so scheduling never changes
/// what a sampler sees.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl WorkerPool {
    /// Builds a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, HammerError> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("hammer-worker-{index}"))
            .build()
            .map_err(|err| {
                HammerError::Sampler(
                    ErrorInfo::new("thread-pool", err.to_string())
                        .with_context("threads", threads.to_string()),
                )
            })?;
        Ok(Self { pool, threads })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Applies `op` to every item on the pool, preserving order.
    ///
    /// Workers log through the caller's dispatcher and inside its current span.
    pub fn map<T, R, F>(&self, items: &[T], op: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        let span = Span::current();
        self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    tracing::dispatcher::with_default(&dispatch, || {
                        let _entered = span.enter();
                        op(item)
                    })
                })
                .collect()
        })
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .finish()
    }
}
