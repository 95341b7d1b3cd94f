//! Download pass: N workers pull from one shared cursor and bring each asset's
//! local copy up to date.
//!
//! Per asset, a worker resolves the local path and compares what is on disk
//! against the expected size. A matching file counts as "already present";
//! anything else is fetched (overwriting a wrong-sized file). Both outcomes
//! bump a shared counter, and crossing either [`StopConditions`] threshold
//! ends the worker that crossed it. The others notice on their next
//! iteration.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::error::SyncError;
use super::local::{self, Presence};
use super::paths::PathResolver;
use super::pool::{Flow, RunCounters, StopConditions, WorkerPool};
use super::progress::{EventSink, SyncEvent};
use crate::remote::AssetIterator;
use crate::types::VersionSize;

/// Layout and rendition choices shared by the download and delete passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub paths: PathResolver,
    pub version: VersionSize,
    /// Report what would happen without touching the filesystem. Counters
    /// still advance, so stop conditions trigger at the same point.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            paths: PathResolver::default(),
            version: VersionSize::Original,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub newly_downloaded: u64,
    pub already_present: u64,
    /// Assets without the requested rendition.
    pub skipped: u64,
}

pub struct DownloadOrchestrator {
    assets: Arc<dyn AssetIterator>,
    output_root: PathBuf,
    parallelism: usize,
    stop: StopConditions,
    options: RunOptions,
    events: Arc<dyn EventSink>,
}

/// State every worker shares for the duration of one run.
struct DownloadRun {
    assets: Arc<dyn AssetIterator>,
    output_root: PathBuf,
    stop: StopConditions,
    options: RunOptions,
    events: Arc<dyn EventSink>,
    counters: RunCounters,
    skipped: AtomicU64,
}

impl DownloadRun {
    fn stats(&self) -> DownloadStats {
        DownloadStats {
            newly_downloaded: self.counters.newly_downloaded(),
            already_present: self.counters.already_present(),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }
}

impl DownloadOrchestrator {
    pub fn new(
        assets: Arc<dyn AssetIterator>,
        output_root: impl Into<PathBuf>,
        parallelism: usize,
        stop: StopConditions,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            assets,
            output_root: output_root.into(),
            parallelism,
            stop,
            options: RunOptions::default(),
            events,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Run every worker to completion and return the final counters, or the
    /// first error any worker hit.
    pub async fn run(self) -> Result<DownloadStats, SyncError> {
        let pool = WorkerPool::new("download", self.parallelism)?;
        if !self.options.dry_run {
            local::ensure_dir(&self.output_root).await?;
        }

        let run = Arc::new(DownloadRun {
            assets: self.assets,
            output_root: self.output_root,
            stop: self.stop,
            options: self.options,
            events: self.events,
            counters: RunCounters::default(),
            skipped: AtomicU64::new(0),
        });

        let shared = Arc::clone(&run);
        let result = pool
            .run(move |worker| download_step(Arc::clone(&shared), worker))
            .await;

        let stats = run.stats();
        tracing::debug!(
            workers = pool.parallelism(),
            newly_downloaded = stats.newly_downloaded,
            already_present = stats.already_present,
            skipped = stats.skipped,
            ok = result.is_ok(),
            "Download pass finished"
        );
        result.map(|()| stats)
    }
}

async fn download_step(run: Arc<DownloadRun>, worker: usize) -> Result<Flow, SyncError> {
    if run.stop.reached(&run.counters) {
        return Ok(Flow::Done);
    }

    let Some(asset) = run.assets.next().await.map_err(SyncError::Enumerate)? else {
        return Ok(Flow::Done);
    };

    let version = run.options.version;
    let Some(expected) = asset.size(version) else {
        run.skipped.fetch_add(1, Ordering::SeqCst);
        run.events.emit(SyncEvent::VariantMissing {
            worker,
            id: asset.id().to_string(),
            version,
        });
        return Ok(Flow::Continue);
    };

    let path = run
        .options
        .paths
        .resolve(&run.output_root, asset.as_ref(), version);
    run.events.emit(SyncEvent::AssetStarted {
        worker,
        id: asset.id().to_string(),
        filename: path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size_label: asset.size_label(version),
    });

    let overwrite = match local::probe(&path, expected).await {
        Presence::Matching => {
            run.events.emit(SyncEvent::AlreadyPresent { worker, path });
            let present = run.counters.record_present();
            return Ok(if run.stop.present_reached(present) {
                Flow::Done
            } else {
                Flow::Continue
            });
        }
        Presence::Missing => false,
        Presence::SizeMismatch { actual } => {
            tracing::debug!(
                worker,
                expected,
                actual,
                path = %path.display(),
                "Local size differs"
            );
            true
        }
    };

    run.events.emit(SyncEvent::Downloading {
        worker,
        path: path.clone(),
        overwrite,
    });
    let dry_run = run.options.dry_run;
    if !dry_run {
        if let Some(parent) = path.parent() {
            local::ensure_dir(parent).await?;
        }
        asset
            .fetch_to(version, &path)
            .await
            .map_err(|source| SyncError::Fetch {
                id: asset.id().to_string(),
                path: path.clone(),
                source,
            })?;
    }
    run.events.emit(SyncEvent::Downloaded {
        worker,
        path,
        dry_run,
    });

    let downloaded = run.counters.record_download();
    Ok(if run.stop.downloads_reached(downloaded) {
        Flow::Done
    } else {
        Flow::Continue
    })
}
