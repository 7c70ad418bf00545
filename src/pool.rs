//! Worker pool for extractor and scorer invocations.
//!
//! With the `rayon` feature the pool owns a dedicated thread pool sized to the
//! available parallelism; each task blocks its worker while the external tool
//! runs. Without the feature, tasks run sequentially on the caller's thread.
//!
//! Every dispatched task runs to completion even if a sibling fails. Results
//! come back in input order, and a failing batch reports the error of the
//! earliest failing input.

use crate::util::FpMatchResult;
#[cfg(feature = "rayon")]
use crate::util::FpMatchError;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Fixed-size pool executing independent tasks.
pub struct WorkerPool {
    workers: usize,
    #[cfg(feature = "rayon")]
    pool: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    /// Creates a pool with `workers` threads, or one per available core.
    ///
    /// `parallel == false` (or a build without `rayon`) executes sequentially.
    pub fn new(workers: Option<usize>, parallel: bool) -> FpMatchResult<Self> {
        let workers = workers
            .filter(|&n| n > 0)
            .unwrap_or_else(default_workers);

        #[cfg(feature = "rayon")]
        {
            let pool = if parallel {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|idx| format!("fpmatch-worker-{idx}"))
                    .build()
                    .map_err(|err| {
                        FpMatchError::io("building worker pool", std::io::Error::other(err))
                    })?;
                Some(pool)
            } else {
                None
            };
            Ok(Self { workers, pool })
        }

        #[cfg(not(feature = "rayon"))]
        {
            let _ = (workers, parallel);
            Ok(Self { workers: 1 })
        }
    }

    /// Creates a pool that runs tasks on the calling thread.
    pub fn sequential() -> Self {
        Self {
            workers: 1,
            #[cfg(feature = "rayon")]
            pool: None,
        }
    }

    /// Number of tasks that may run concurrently.
    pub fn workers(&self) -> usize {
        #[cfg(feature = "rayon")]
        if self.pool.is_none() {
            return 1;
        }
        self.workers
    }

    /// Applies `f` to every item, returning results in input order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> FpMatchResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> FpMatchResult<R> + Sync + Send,
    {
        #[cfg(feature = "rayon")]
        if let Some(pool) = &self.pool {
            let settled: Vec<FpMatchResult<R>> = pool.install(|| items.par_iter().map(&f).collect());
            return settled.into_iter().collect();
        }

        let settled: Vec<FpMatchResult<R>> = items.iter().map(f).collect();
        settled.into_iter().collect()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::FpMatchError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn preserves_input_order() {
        let pool = WorkerPool::new(Some(4), true).unwrap();
        let items: Vec<u64> = (0..64).collect();
        let out = pool
            .map(&items, |&n| {
                std::thread::sleep(std::time::Duration::from_millis((64 - n) % 7));
                Ok(n * n)
            })
            .unwrap();
        assert_eq!(out, items.iter().map(|n| n * n).collect::<Vec<_>>());
    }

    #[test]
    fn failure_reports_earliest_input_and_runs_siblings() {
        let ran = AtomicUsize::new(0);
        for pool in [WorkerPool::new(Some(3), true).unwrap(), WorkerPool::sequential()] {
            ran.store(0, Ordering::SeqCst);
            let items: Vec<usize> = (0..10).collect();
            let err = pool
                .map(&items, |&n| {
                    ran.fetch_add(1, Ordering::SeqCst);
                    match n {
                        3 => Err(FpMatchError::InvalidInput("third")),
                        7 => Err(FpMatchError::InvalidInput("seventh")),
                        _ => Ok(n),
                    }
                })
                .unwrap_err();
            assert!(matches!(err, FpMatchError::InvalidInput("third")));
            assert_eq!(ran.load(Ordering::SeqCst), items.len());
        }
    }

    #[test]
    fn empty_batch_is_fine() {
        let pool = WorkerPool::new(None, true).unwrap();
        assert!(pool.workers() >= 1);
        let out: Vec<u8> = pool.map(&Vec::<u8>::new(), |&n| Ok(n)).unwrap();
        assert!(out.is_empty());
    }
}
