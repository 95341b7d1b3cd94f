//! Delete pass: remove local copies of assets listed in "Recently Deleted".
//!
//! Same pool shape as the download pass but without stop conditions; it runs
//! until the cursor is exhausted. A file that is already gone counts as done.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::error::SyncError;
use super::local::{self, Presence};
use super::orchestrator::RunOptions;
use super::pool::{Flow, WorkerPool};
use super::progress::{EventSink, SyncEvent};
use crate::remote::AssetIterator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub deleted: u64,
    pub already_absent: u64,
}

pub struct DeleteReconciler {
    assets: Arc<dyn AssetIterator>,
    output_root: PathBuf,
    parallelism: usize,
    options: RunOptions,
    events: Arc<dyn EventSink>,
}

struct DeleteRun {
    assets: Arc<dyn AssetIterator>,
    output_root: PathBuf,
    options: RunOptions,
    events: Arc<dyn EventSink>,
    deleted: AtomicU64,
    already_absent: AtomicU64,
}

impl DeleteReconciler {
    pub fn new(
        assets: Arc<dyn AssetIterator>,
        output_root: impl Into<PathBuf>,
        parallelism: usize,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            assets,
            output_root: output_root.into(),
            parallelism,
            options: RunOptions::default(),
            events,
        }
    }

    /// Must match the options of the download pass, or the resolved paths
    /// will not line up with what was written.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn run(self) -> Result<ReconcileStats, SyncError> {
        let pool = WorkerPool::new("delete", self.parallelism)?;
        let run = Arc::new(DeleteRun {
            assets: self.assets,
            output_root: self.output_root,
            options: self.options,
            events: self.events,
            deleted: AtomicU64::new(0),
            already_absent: AtomicU64::new(0),
        });

        let shared = Arc::clone(&run);
        let result = pool
            .run(move |worker| delete_step(Arc::clone(&shared), worker))
            .await;

        let stats = ReconcileStats {
            deleted: run.deleted.load(Ordering::SeqCst),
            already_absent: run.already_absent.load(Ordering::SeqCst),
        };
        tracing::debug!(
            workers = pool.parallelism(),
            deleted = stats.deleted,
            already_absent = stats.already_absent,
            ok = result.is_ok(),
            "Delete pass finished"
        );
        result.map(|()| stats)
    }
}

async fn delete_step(run: Arc<DeleteRun>, worker: usize) -> Result<Flow, SyncError> {
    let Some(asset) = run.assets.next().await.map_err(SyncError::Enumerate)? else {
        return Ok(Flow::Done);
    };
    let path = run
        .options
        .paths
        .resolve(&run.output_root, asset.as_ref(), run.options.version);

    let removed = if run.options.dry_run {
        local::probe(&path, asset.size(run.options.version).unwrap_or(0)).await != Presence::Missing
    } else {
        local::remove(&path)
            .await
            .map_err(|source| SyncError::Delete {
                path: path.clone(),
                source,
            })?
    };

    if removed {
        run.deleted.fetch_add(1, Ordering::SeqCst);
        run.events.emit(SyncEvent::Deleted {
            worker,
            path,
            dry_run: run.options.dry_run,
        });
    } else {
        run.already_absent.fetch_add(1, Ordering::SeqCst);
        run.events.emit(SyncEvent::AlreadyAbsent { worker, path });
    }
    Ok(Flow::Continue)
}
