//! Photos service: resolves albums and pages assets out of iCloud's
//! CloudKit-backed photo library.

mod album;
mod asset;
pub mod cloudkit;
mod collections;
mod cursor;
mod library;
pub mod queries;
pub mod session;
pub mod types;

pub use album::PhotoAlbum;
pub use collections::ALL_PHOTOS;
pub use cursor::AssetFetcher;
pub use session::PhotosSession;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use album::QueryContext;
use collections::CollectionTable;
use crate::icloud::error::ICloudError;
use crate::remote::{Collection, PhotoSource};
use crate::retry::RetryConfig;

const PAGE_SIZE: usize = 100;

pub struct PhotosService {
    ctx: Arc<QueryContext>,
    table: CollectionTable,
}

impl std::fmt::Debug for PhotosService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotosService")
            .field("service_endpoint", &self.ctx.service_endpoint)
            .field("collections", &self.table.names().count())
            .finish_non_exhaustive()
    }
}

impl PhotosService {
    /// Connect to the primary library under `service_root` (the account's
    /// `ckdatabasews` URL).
    ///
    /// Fails if the library has not finished indexing. Album folders are
    /// fetched once here; the resulting collection list is fixed for the
    /// lifetime of the service.
    pub async fn new(
        service_root: &str,
        session: Box<dyn PhotosSession>,
        mut params: HashMap<String, Value>,
        fetcher: AssetFetcher,
        retry: RetryConfig,
    ) -> Result<Self, ICloudError> {
        params.insert("remapEnums".to_string(), Value::Bool(true));
        params.insert("getCurrentSyncToken".to_string(), Value::Bool(true));

        let ctx = Arc::new(QueryContext {
            session,
            service_endpoint: format!(
                "{service_root}/database/1/com.apple.photos.cloud/production/private"
            ),
            params,
            zone_id: json!({"zoneName": "PrimarySync"}),
            page_size: PAGE_SIZE,
            retry,
            fetcher: Arc::new(fetcher),
        });

        library::check_indexing(&ctx).await?;
        let folders = library::fetch_folders(&ctx).await?;
        let table = CollectionTable::build(&folders);
        debug!(
            folders = folders.len(),
            collections = table.names().count(),
            "Loaded photo library"
        );
        Ok(Self { ctx, table })
    }

    pub fn album(&self, name: &str) -> Option<PhotoAlbum> {
        let query = self.table.get(name)?.clone();
        Some(PhotoAlbum::new(
            name.to_string(),
            query,
            Arc::clone(&self.ctx),
        ))
    }
}

impl PhotoSource for PhotosService {
    fn resolve_collection(&self, name: Option<&str>) -> anyhow::Result<Arc<dyn Collection>> {
        let name = name.unwrap_or(ALL_PHOTOS);
        match self.album(name) {
            Some(album) => Ok(Arc::new(album)),
            None => anyhow::bail!(
                "Unknown album '{}'. Available albums: {}",
                name,
                self.collection_names().join(", ")
            ),
        }
    }

    fn collection_names(&self) -> Vec<String> {
        self.table.names().map(str::to_string).collect()
    }
}
