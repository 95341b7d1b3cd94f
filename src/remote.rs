//! Boundary between the sync engine and whatever serves the photo library.
//!
//! The engine only ever sees these traits. The CloudKit implementation lives
//! in `crate::icloud::photos`; tests drive the engine with in-memory fakes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::download::error::DownloadError;
use crate::types::{format_size, VersionSize};

/// Name of the collection holding assets the user deleted remotely.
pub const RECENTLY_DELETED: &str = "Recently Deleted";

/// One remote photo or video.
#[async_trait]
pub trait RemoteAsset: Send + Sync {
    /// Opaque identity, unique per remote asset.
    fn id(&self) -> &str;

    /// Display filename, if the remote record carries one.
    fn filename(&self) -> Option<String>;

    /// When the asset was captured.
    fn created(&self) -> DateTime<Utc>;

    /// Byte size of the given rendition, or `None` if the asset has no such
    /// rendition.
    fn size(&self, version: VersionSize) -> Option<u64>;

    fn size_label(&self, version: VersionSize) -> String {
        format_size(self.size(version).unwrap_or(0))
    }

    /// Overwrite `path` with the bytes of `version`.
    async fn fetch_to(&self, version: VersionSize, path: &Path) -> Result<(), DownloadError>;
}

/// Forward-only cursor over a collection.
///
/// Implementations must tolerate concurrent `next()` calls from several
/// workers and hand every asset out exactly once. `Ok(None)` marks the end of
/// the sequence; every `Err` is treated as fatal by the caller.
#[async_trait]
pub trait AssetIterator: Send + Sync {
    async fn next(&self) -> anyhow::Result<Option<Box<dyn RemoteAsset>>>;
}

/// A named, enumerable group of assets.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Item count. May be approximate or cached by the server.
    async fn size(&self) -> anyhow::Result<u64>;

    /// A fresh cursor positioned at the start of the collection.
    fn assets(&self) -> Arc<dyn AssetIterator>;
}

/// Resolves collection names to collections.
pub trait PhotoSource: Send + Sync {
    /// `None` selects the whole library.
    fn resolve_collection(&self, name: Option<&str>) -> anyhow::Result<Arc<dyn Collection>>;

    fn collection_names(&self) -> Vec<String>;
}
