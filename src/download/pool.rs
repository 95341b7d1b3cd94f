//! Bounded worker pool shared by the download and reconcile passes.
//!
//! A fixed number of tokio tasks pull from one shared cursor. Each task calls
//! the step closure in a loop until the step reports [`Flow::Done`] or fails.
//! The first failure is kept and returned once every task has finished.
//! Siblings of a failed worker keep draining the cursor until their own stop
//! condition.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;

use super::error::SyncError;

/// Outcome of one worker iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Thresholds that stop workers from starting new fetches.
///
/// `None` means unbounded. Thresholds are checked against [`RunCounters`]
/// with plain atomic loads, so a run may overshoot by up to
/// `parallelism - 1` operations that were already past the check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopConditions {
    pub max_new_downloads: Option<u64>,
    /// Global count of "already present" hits across all workers in this
    /// run. Not a per-worker streak: a miss does not reset it.
    pub max_already_present: Option<u64>,
}

impl StopConditions {
    #[cfg(test)]
    pub const UNBOUNDED: Self = Self {
        max_new_downloads: None,
        max_already_present: None,
    };

    pub fn downloads_reached(&self, downloaded: u64) -> bool {
        self.max_new_downloads.is_some_and(|max| downloaded >= max)
    }

    pub fn present_reached(&self, present: u64) -> bool {
        self.max_already_present.is_some_and(|max| present >= max)
    }

    pub fn reached(&self, counters: &RunCounters) -> bool {
        self.downloads_reached(counters.newly_downloaded())
            || self.present_reached(counters.already_present())
    }
}

/// Per-run counters, shared by every worker.
#[derive(Debug, Default)]
pub struct RunCounters {
    newly_downloaded: AtomicU64,
    already_present: AtomicU64,
}

impl RunCounters {
    /// Count one completed fetch and return the new total.
    pub fn record_download(&self) -> u64 {
        self.newly_downloaded.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Count one presence hit and return the new total.
    pub fn record_present(&self) -> u64 {
        self.already_present.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn newly_downloaded(&self) -> u64 {
        self.newly_downloaded.load(Ordering::SeqCst)
    }

    pub fn already_present(&self) -> u64 {
        self.already_present.load(Ordering::SeqCst)
    }
}

/// Assign-once slot for the run's terminal error.
///
/// Which of several concurrent failures wins is decided by lock acquisition
/// order and is not deterministic.
#[derive(Debug, Default)]
struct FirstError(Mutex<Option<SyncError>>);

impl FirstError {
    fn record(&self, err: SyncError) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        } else {
            tracing::debug!(error = %err, "Run already failed, dropping later error");
        }
    }

    fn take(&self) -> Option<SyncError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// A fixed-size set of workers sharing one cursor.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    name: &'static str,
    parallelism: usize,
}

impl WorkerPool {
    pub fn new(name: &'static str, parallelism: usize) -> Result<Self, SyncError> {
        if parallelism == 0 {
            return Err(SyncError::InvalidParallelism);
        }
        Ok(Self { name, parallelism })
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Run `step` on every worker until each one finishes, then return the
    /// first recorded error, if any.
    ///
    /// `step` receives the worker index and produces one iteration. It must
    /// own everything it touches (clone the shared `Arc`s into the future).
    pub async fn run<F, Fut>(&self, step: F) -> Result<(), SyncError>
    where
        F: Fn(usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Flow, SyncError>> + Send + 'static,
    {
        let step = Arc::new(step);
        let first_error = Arc::new(FirstError::default());
        let mut workers = JoinSet::new();

        for worker in 0..self.parallelism {
            let step = Arc::clone(&step);
            let first_error = Arc::clone(&first_error);
            let pool = self.name;
            workers.spawn(async move {
                let mut iterations = 0u64;
                loop {
                    match step(worker).await {
                        Ok(Flow::Continue) => iterations += 1,
                        Ok(Flow::Done) => break,
                        Err(e) => {
                            tracing::debug!(pool, worker, error = %e, "Worker failed");
                            first_error.record(e);
                            break;
                        }
                    }
                }
                tracing::debug!(pool, worker, iterations, "Worker finished");
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                first_error.record(SyncError::WorkerPanicked(e.to_string()));
            }
        }

        match first_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_zero_parallelism_rejected() {
        assert!(matches!(
            WorkerPool::new("t", 0),
            Err(SyncError::InvalidParallelism)
        ));
        assert_eq!(WorkerPool::new("t", 3).unwrap().parallelism(), 3);
    }

    #[test]
    fn test_unbounded_never_reached() {
        let counters = RunCounters::default();
        for _ in 0..1000 {
            counters.record_download();
            counters.record_present();
        }
        assert!(!StopConditions::UNBOUNDED.reached(&counters));
    }

    #[test]
    fn test_either_threshold_stops() {
        let counters = RunCounters::default();
        let stop = StopConditions {
            max_new_downloads: Some(2),
            max_already_present: Some(5),
        };
        assert_eq!(counters.record_download(), 1);
        assert!(!stop.reached(&counters));
        assert_eq!(counters.record_download(), 2);
        assert!(stop.reached(&counters));

        let counters = RunCounters::default();
        for _ in 0..5 {
            counters.record_present();
        }
        assert!(stop.reached(&counters));
    }

    #[test]
    fn test_zero_threshold_is_immediately_reached() {
        let stop = StopConditions {
            max_new_downloads: Some(0),
            max_already_present: None,
        };
        assert!(stop.reached(&RunCounters::default()));
    }

    #[test]
    fn test_first_error_keeps_first() {
        let slot = FirstError::default();
        slot.record(SyncError::WorkerPanicked("first".into()));
        slot.record(SyncError::WorkerPanicked("second".into()));
        match slot.take() {
            Some(SyncError::WorkerPanicked(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(slot.take().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_drains_shared_work() {
        let remaining = Arc::new(AtomicUsize::new(100));
        let processed = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new("t", 4).unwrap();

        let (r, p) = (Arc::clone(&remaining), Arc::clone(&processed));
        pool.run(move |_| {
            let (r, p) = (Arc::clone(&r), Arc::clone(&p));
            async move {
                let claimed = r.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
                if claimed.is_err() {
                    return Ok(Flow::Done);
                }
                p.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(Flow::Continue)
            }
        })
        .await
        .unwrap();

        assert_eq!(processed.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failing_worker_does_not_stop_siblings() {
        let remaining = Arc::new(AtomicUsize::new(50));
        let processed = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new("t", 3).unwrap();

        let (r, p) = (Arc::clone(&remaining), Arc::clone(&processed));
        let result = pool
            .run(move |worker| {
                let (r, p) = (Arc::clone(&r), Arc::clone(&p));
                async move {
                    if worker == 0 {
                        return Err(SyncError::WorkerPanicked("boom".into()));
                    }
                    if r.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_err()
                    {
                        return Ok(Flow::Done);
                    }
                    p.fetch_add(1, Ordering::SeqCst);
                    Ok(Flow::Continue)
                }
            })
            .await;

        assert!(matches!(result, Err(SyncError::WorkerPanicked(ref m)) if m == "boom"));
        assert_eq!(processed.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_panicking_worker_is_reported() {
        let pool = WorkerPool::new("t", 2).unwrap();
        let result = pool
            .run(|worker| async move {
                if worker == 1 {
                    panic!("worker exploded");
                }
                Ok(Flow::Done)
            })
            .await;
        assert!(matches!(result, Err(SyncError::WorkerPanicked(_))));
    }
}
