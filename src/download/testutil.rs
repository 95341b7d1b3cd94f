//! In-memory stand-ins for the remote side, shared by the download tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use super::error::DownloadError;
use super::orchestrator::RunOptions;
use super::paths::PathResolver;
use super::progress::{EventSink, SyncEvent};
use crate::remote::{AssetIterator, Collection, PhotoSource, RemoteAsset};
use crate::types::{FileMatchPolicy, VersionSize};

/// Options that store each asset under its plain display name, so tests can
/// predict the local path.
pub fn by_name() -> RunOptions {
    RunOptions {
        paths: PathResolver {
            file_match_policy: FileMatchPolicy::Name,
            ..PathResolver::default()
        },
        ..RunOptions::default()
    }
}

#[derive(Debug, Clone)]
pub struct FakeAsset {
    id: String,
    filename: Option<String>,
    created: DateTime<Utc>,
    sizes: HashMap<VersionSize, u64>,
    fetches: Arc<AtomicUsize>,
    fail_fetch: bool,
}

impl FakeAsset {
    pub fn new(id: &str, filename: &str, size: u64) -> Self {
        Self {
            id: id.to_string(),
            filename: Some(filename.to_string()),
            created: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            sizes: HashMap::from([(VersionSize::Original, size)]),
            fetches: Arc::new(AtomicUsize::new(0)),
            fail_fetch: false,
        }
    }

    pub fn nameless(id: &str, size: u64) -> Self {
        Self {
            filename: None,
            ..Self::new(id, "", size)
        }
    }

    pub fn created_at(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    /// Replace the available renditions with a single `version`.
    pub fn only(mut self, version: VersionSize, size: u64) -> Self {
        self.sizes = HashMap::from([(version, size)]);
        self
    }

    /// Share a fetch counter across many assets.
    pub fn counting(mut self, fetches: &Arc<AtomicUsize>) -> Self {
        self.fetches = Arc::clone(fetches);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteAsset for FakeAsset {
    fn id(&self) -> &str {
        &self.id
    }

    fn filename(&self) -> Option<String> {
        self.filename.clone()
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn size(&self, version: VersionSize) -> Option<u64> {
        self.sizes.get(&version).copied()
    }

    async fn fetch_to(&self, version: VersionSize, path: &Path) -> Result<(), DownloadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            return Err(DownloadError::HttpStatus {
                status: 503,
                path: path.display().to_string(),
            });
        }
        let size = self.size(version).ok_or_else(|| DownloadError::MissingVersion {
            version: version.to_string(),
        })?;
        tokio::task::yield_now().await;
        tokio::fs::write(path, vec![0xAB; size as usize]).await?;
        Ok(())
    }
}

/// Cursor over a fixed list of assets. Optionally fails once `fail_after`
/// assets have been handed out.
#[derive(Default)]
pub struct FakeCursor {
    queue: Mutex<VecDeque<FakeAsset>>,
    served: AtomicUsize,
    fail_after: Option<usize>,
}

impl FakeCursor {
    pub fn new(assets: impl IntoIterator<Item = FakeAsset>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(assets.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn failing_after(assets: impl IntoIterator<Item = FakeAsset>, n: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(assets.into_iter().collect()),
            served: AtomicUsize::new(0),
            fail_after: Some(n),
        })
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetIterator for FakeCursor {
    async fn next(&self) -> anyhow::Result<Option<Box<dyn RemoteAsset>>> {
        tokio::task::yield_now().await;
        let mut queue = self.queue.lock().unwrap();
        if let Some(limit) = self.fail_after {
            if self.served.load(Ordering::SeqCst) >= limit {
                anyhow::bail!("page query failed: HTTP 503");
            }
        }
        match queue.pop_front() {
            Some(asset) => {
                self.served.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Box::new(asset)))
            }
            None => Ok(None),
        }
    }
}

pub struct FakeCollection {
    pub name: String,
    pub assets: Vec<FakeAsset>,
}

#[async_trait]
impl Collection for FakeCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn size(&self) -> anyhow::Result<u64> {
        Ok(self.assets.len() as u64)
    }

    fn assets(&self) -> Arc<dyn AssetIterator> {
        FakeCursor::new(self.assets.clone())
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub collections: Vec<Arc<FakeCollection>>,
}

impl FakeSource {
    pub fn with(mut self, name: &str, assets: Vec<FakeAsset>) -> Self {
        self.collections.push(Arc::new(FakeCollection {
            name: name.to_string(),
            assets,
        }));
        self
    }
}

impl PhotoSource for FakeSource {
    fn resolve_collection(&self, name: Option<&str>) -> anyhow::Result<Arc<dyn Collection>> {
        let name = name.unwrap_or("All Photos");
        self.collections
            .iter()
            .find(|c| c.name == name)
            .map(|c| Arc::clone(c) as Arc<dyn Collection>)
            .ok_or_else(|| anyhow::anyhow!("Album \"{}\" not found", name))
    }

    fn collection_names(&self) -> Vec<String> {
        self.collections.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&SyncEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: SyncEvent) {
        self.events.lock().unwrap().push(event);
    }
}
