//! Sync engine. A download pass over one collection, then an optional delete
//! pass over "Recently Deleted", both driven by the same bounded worker pool.

pub mod error;
pub mod file;
pub mod local;
pub mod orchestrator;
pub mod paths;
pub mod pool;
pub mod progress;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod testutil;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::remote::{PhotoSource, RECENTLY_DELETED};
use crate::types::VersionSize;

use error::SyncError;
use orchestrator::{DownloadOrchestrator, DownloadStats, RunOptions};
use paths::PathResolver;
use pool::StopConditions;
use progress::{EventSink, Phase, SyncEvent};
use reconcile::{DeleteReconciler, ReconcileStats};

/// Subset of application config consumed by the sync engine.
/// Decoupled from CLI parsing so the engine can be tested independently.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub(crate) directory: PathBuf,
    /// `None` syncs the whole library.
    pub(crate) album: Option<String>,
    /// Stop after this many new downloads.
    pub(crate) recent: Option<u64>,
    /// Stop after this many files were found already present.
    pub(crate) stop_found_num: Option<u64>,
    pub(crate) thread_num: usize,
    pub(crate) auto_delete: bool,
    pub(crate) size: VersionSize,
    pub(crate) paths: PathResolver,
    pub(crate) dry_run: bool,
}

impl SyncConfig {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            paths: self.paths.clone(),
            version: self.size,
            dry_run: self.dry_run,
        }
    }

    fn stop_conditions(&self) -> StopConditions {
        StopConditions {
            max_new_downloads: self.recent,
            max_already_present: self.stop_found_num,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub download: DownloadStats,
    /// `None` when the delete pass was not requested.
    pub reconcile: Option<ReconcileStats>,
    pub elapsed: Duration,
}

/// Entry point for the sync engine.
///
/// Resolves the configured collection and runs the download pass to
/// completion. With `auto_delete`, then resolves "Recently Deleted" and runs
/// the delete pass over it. An error in the download pass skips the delete
/// pass.
pub async fn sync_library(
    source: &dyn PhotoSource,
    config: &SyncConfig,
    events: Arc<dyn EventSink>,
) -> Result<SyncSummary, SyncError> {
    let started = Instant::now();
    let options = config.run_options();

    let collection = source
        .resolve_collection(config.album.as_deref())
        .map_err(SyncError::Collection)?;
    events.emit(SyncEvent::RunStarted {
        phase: Phase::Download,
        collection: collection.name().to_string(),
        total: approximate_size(collection.as_ref()).await,
        workers: config.thread_num,
    });
    let download = DownloadOrchestrator::new(
        collection.assets(),
        &config.directory,
        config.thread_num,
        config.stop_conditions(),
        Arc::clone(&events),
    )
    .with_options(options.clone())
    .run()
    .await;
    events.emit(SyncEvent::RunFinished {
        phase: Phase::Download,
    });
    let download = download?;

    let reconcile = if config.auto_delete {
        let deleted = source
            .resolve_collection(Some(RECENTLY_DELETED))
            .map_err(SyncError::Collection)?;
        events.emit(SyncEvent::RunStarted {
            phase: Phase::Delete,
            collection: deleted.name().to_string(),
            total: approximate_size(deleted.as_ref()).await,
            workers: config.thread_num,
        });
        let stats = DeleteReconciler::new(
            deleted.assets(),
            &config.directory,
            config.thread_num,
            Arc::clone(&events),
        )
        .with_options(options)
        .run()
        .await;
        events.emit(SyncEvent::RunFinished {
            phase: Phase::Delete,
        });
        Some(stats?)
    } else {
        None
    };

    let summary = SyncSummary {
        download,
        reconcile,
        elapsed: started.elapsed(),
    };
    log_summary(&summary, config);
    Ok(summary)
}

async fn approximate_size(collection: &dyn crate::remote::Collection) -> Option<u64> {
    match collection.size().await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!("Could not count \"{}\": {:#}", collection.name(), e);
            None
        }
    }
}

fn log_summary(summary: &SyncSummary, config: &SyncConfig) {
    let d = &summary.download;
    if config.dry_run {
        tracing::info!("── Dry Run Summary ──");
        tracing::info!("  {} files would be downloaded", d.newly_downloaded);
    } else {
        tracing::info!("── Summary ──");
        tracing::info!("  {} downloaded", d.newly_downloaded);
    }
    tracing::info!(
        "  {} already present, {} without {} version",
        d.already_present,
        d.skipped,
        config.size
    );
    if let Some(r) = &summary.reconcile {
        let verb = if config.dry_run { "would be deleted" } else { "deleted" };
        tracing::info!("  {} {}, {} already absent", r.deleted, verb, r.already_absent);
    }
    tracing::info!("  destination: {}", config.directory.display());
    tracing::info!("  elapsed: {}", format_duration(summary.elapsed));
}

pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testutil::{by_name, FakeAsset, FakeSource, RecordingSink};

    fn config(dir: &std::path::Path) -> SyncConfig {
        SyncConfig {
            directory: dir.to_path_buf(),
            album: None,
            recent: None,
            stop_found_num: None,
            thread_num: 2,
            auto_delete: false,
            size: VersionSize::Original,
            paths: by_name().paths,
            dry_run: false,
        }
    }

    fn library() -> FakeSource {
        FakeSource::default()
            .with(
                "All Photos",
                vec![
                    FakeAsset::new("A", "a.jpg", 10),
                    FakeAsset::new("B", "b.jpg", 20),
                ],
            )
            .with("Trip", vec![FakeAsset::new("C", "c.jpg", 5)])
            .with(RECENTLY_DELETED, vec![FakeAsset::new("B", "b.jpg", 20)])
    }

    #[tokio::test]
    async fn test_sync_whole_library() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let summary = sync_library(&library(), &config(dir.path()), sink.clone())
            .await
            .unwrap();

        assert_eq!(summary.download.newly_downloaded, 2);
        assert!(summary.reconcile.is_none());
        assert!(dir.path().join("b.jpg").exists());
        assert_eq!(
            sink.count(|e| matches!(
                e,
                SyncEvent::RunStarted {
                    phase: Phase::Download,
                    total: Some(2),
                    ..
                }
            )),
            1
        );
    }

    #[tokio::test]
    async fn test_sync_named_album() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SyncConfig {
            album: Some("Trip".into()),
            ..config(dir.path())
        };
        let summary = sync_library(&library(), &cfg, Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        assert_eq!(summary.download.newly_downloaded, 1);
        assert!(dir.path().join("c.jpg").exists());
        assert!(!dir.path().join("a.jpg").exists());
    }

    #[tokio::test]
    async fn test_unknown_album_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SyncConfig {
            album: Some("Nope".into()),
            ..config(dir.path())
        };
        let err = sync_library(&library(), &cfg, Arc::new(RecordingSink::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Collection(_)));
    }

    #[tokio::test]
    async fn test_auto_delete_removes_recently_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SyncConfig {
            auto_delete: true,
            ..config(dir.path())
        };
        let summary = sync_library(&library(), &cfg, Arc::new(RecordingSink::default()))
            .await
            .unwrap();

        assert_eq!(summary.download.newly_downloaded, 2);
        assert_eq!(
            summary.reconcile,
            Some(ReconcileStats {
                deleted: 1,
                already_absent: 0
            })
        );
        assert!(dir.path().join("a.jpg").exists());
        assert!(!dir.path().join("b.jpg").exists());
    }

    /// Two cameras both producing `IMG_0001.JPG`.
    fn namesakes() -> FakeSource {
        FakeSource::default()
            .with(
                "All Photos",
                vec![
                    FakeAsset::new("CAM-A-0001", "IMG_0001.JPG", 10),
                    FakeAsset::new("CAM-B-0001", "IMG_0001.JPG", 20),
                ],
            )
            .with(
                RECENTLY_DELETED,
                vec![FakeAsset::new("CAM-C-0001", "IMG_0001.JPG", 99)],
            )
    }

    #[tokio::test]
    async fn test_same_name_assets_are_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SyncConfig {
            paths: PathResolver::default(),
            ..config(dir.path())
        };
        let source = namesakes();

        let first = sync_library(&source, &cfg, Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        assert_eq!(first.download.newly_downloaded, 2);

        let second = sync_library(&source, &cfg, Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        assert_eq!(second.download.newly_downloaded, 0);
        assert_eq!(second.download.already_present, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_auto_delete_spares_live_namesake() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SyncConfig {
            auto_delete: true,
            paths: PathResolver::default(),
            ..config(dir.path())
        };

        let summary = sync_library(&namesakes(), &cfg, Arc::new(RecordingSink::default()))
            .await
            .unwrap();

        assert_eq!(
            summary.reconcile,
            Some(ReconcileStats {
                deleted: 0,
                already_absent: 1
            })
        );
        let sizes: Vec<u64> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().metadata().unwrap().len())
            .collect();
        assert_eq!(sizes.len(), 2);
        assert!(sizes.contains(&10) && sizes.contains(&20));
    }

    #[tokio::test]
    async fn test_recent_caps_new_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SyncConfig {
            recent: Some(1),
            thread_num: 1,
            ..config(dir.path())
        };
        let summary = sync_library(&library(), &cfg, Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        assert_eq!(summary.download.newly_downloaded, 1);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_secs(59)), "59s");
        assert_eq!(format_duration(Duration::from_secs(754)), "12m 34s");
        assert_eq!(format_duration(Duration::from_secs(5025)), "1h 23m 45s");
    }
}
