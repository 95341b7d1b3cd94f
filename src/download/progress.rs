//! Progress events emitted by the sync passes, and the terminal reporter
//! that renders them.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};

use crate::types::VersionSize;

/// Which pass an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Download,
    Delete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Download => "download",
            Self::Delete => "delete",
        })
    }
}

/// One observable decision made by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    RunStarted {
        phase: Phase,
        collection: String,
        /// Approximate item count, if the collection could report one.
        total: Option<u64>,
        workers: usize,
    },
    AssetStarted {
        worker: usize,
        id: String,
        filename: String,
        size_label: String,
    },
    AlreadyPresent {
        worker: usize,
        path: PathBuf,
    },
    Downloading {
        worker: usize,
        path: PathBuf,
        /// A file of the wrong size is being replaced.
        overwrite: bool,
    },
    Downloaded {
        worker: usize,
        path: PathBuf,
        dry_run: bool,
    },
    VariantMissing {
        worker: usize,
        id: String,
        version: VersionSize,
    },
    Deleted {
        worker: usize,
        path: PathBuf,
        dry_run: bool,
    },
    AlreadyAbsent {
        worker: usize,
        path: PathBuf,
    },
    RunFinished {
        phase: Phase,
    },
}

/// Receiver for [`SyncEvent`]s. Called concurrently from every worker.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

/// Renders events as an indicatif progress bar plus `tracing` lines.
///
/// Log lines are written through `ProgressBar::suspend` so they do not tear
/// the bar. The bar is hidden when disabled or when stdout is not a TTY, in
/// which case only the log lines remain.
#[derive(Debug)]
pub struct ProgressReporter {
    no_progress_bar: bool,
    bar: Mutex<ProgressBar>,
}

impl ProgressReporter {
    pub fn new(no_progress_bar: bool) -> Self {
        Self {
            no_progress_bar,
            bar: Mutex::new(ProgressBar::hidden()),
        }
    }

    fn bar(&self) -> ProgressBar {
        self.bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn start_bar(&self, total: Option<u64>) {
        let pb = create_progress_bar(self.no_progress_bar, total.unwrap_or(0));
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = pb;
    }
}

impl EventSink for ProgressReporter {
    fn emit(&self, event: SyncEvent) {
        match event {
            SyncEvent::RunStarted {
                phase,
                collection,
                total,
                workers,
            } => {
                self.start_bar(total);
                let total = total.map_or_else(|| "unknown".to_string(), |t| t.to_string());
                tracing::info!(
                    "Starting {} pass over \"{}\" ({} items, {} workers)",
                    phase,
                    collection,
                    total,
                    workers
                );
            }
            SyncEvent::AssetStarted {
                worker,
                id,
                filename,
                size_label,
            } => {
                self.bar().set_message(filename.clone());
                tracing::debug!(worker, id = %id, size = %size_label, "Processing {}", filename);
            }
            SyncEvent::AlreadyPresent { worker, path } => {
                let pb = self.bar();
                pb.inc(1);
                tracing::debug!(worker, "{} already exists", path.display());
            }
            SyncEvent::Downloading {
                worker,
                path,
                overwrite,
            } => {
                if overwrite {
                    self.bar().suspend(|| {
                        tracing::info!(worker, "Size changed, re-downloading {}", path.display());
                    });
                } else {
                    tracing::debug!(worker, "Downloading {}", path.display());
                }
            }
            SyncEvent::Downloaded {
                worker,
                path,
                dry_run,
            } => {
                let pb = self.bar();
                pb.inc(1);
                pb.suspend(|| {
                    if dry_run {
                        tracing::info!(worker, "[DRY RUN] Would download {}", path.display());
                    } else {
                        tracing::info!(worker, "Downloaded {}", path.display());
                    }
                });
            }
            SyncEvent::VariantMissing {
                worker,
                id,
                version,
            } => {
                let pb = self.bar();
                pb.inc(1);
                pb.suspend(|| {
                    tracing::warn!(worker, "Asset {} has no {} version, skipping", id, version);
                });
            }
            SyncEvent::Deleted {
                worker,
                path,
                dry_run,
            } => {
                let pb = self.bar();
                pb.inc(1);
                pb.suspend(|| {
                    if dry_run {
                        tracing::info!(worker, "[DRY RUN] Would delete {}", path.display());
                    } else {
                        tracing::info!(worker, "Deleted {}", path.display());
                    }
                });
            }
            SyncEvent::AlreadyAbsent { worker, path } => {
                self.bar().inc(1);
                tracing::debug!(worker, "{} already absent", path.display());
            }
            SyncEvent::RunFinished { phase } => {
                self.bar().finish_and_clear();
                tracing::debug!("{} pass finished", phase);
            }
        }
    }
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .map(|s| s.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_progress_bar_hidden_when_disabled() {
        let pb = create_progress_bar(true, 100);
        assert!(pb.is_hidden());
    }

    #[test]
    fn test_create_progress_bar_with_total() {
        let pb = create_progress_bar(false, 42);
        if std::io::stdout().is_terminal() {
            assert!(!pb.is_hidden());
            assert_eq!(pb.length(), Some(42));
        } else {
            assert!(pb.is_hidden());
        }
    }

    #[test]
    fn test_reporter_counts_terminal_events() {
        let reporter = ProgressReporter::new(true);
        reporter.emit(SyncEvent::RunStarted {
            phase: Phase::Download,
            collection: "All Photos".into(),
            total: Some(3),
            workers: 2,
        });
        reporter.emit(SyncEvent::AlreadyPresent {
            worker: 0,
            path: PathBuf::from("/out/a.jpg"),
        });
        reporter.emit(SyncEvent::Downloaded {
            worker: 1,
            path: PathBuf::from("/out/b.jpg"),
            dry_run: false,
        });
        reporter.emit(SyncEvent::VariantMissing {
            worker: 1,
            id: "C".into(),
            version: VersionSize::Medium,
        });
        assert_eq!(reporter.bar().position(), 3);
        reporter.emit(SyncEvent::RunFinished {
            phase: Phase::Download,
        });
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Download.to_string(), "download");
        assert_eq!(Phase::Delete.to_string(), "delete");
    }
}
