use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use tracing::debug;

use super::cloudkit::BatchQueryResponse;
use super::collections::AlbumQuery;
use super::cursor::{AlbumCursor, AssetFetcher};
use super::queries::encode_params;
use super::session::{retry_post, PhotosSession};
use crate::icloud::error::ICloudError;
use crate::remote::{AssetIterator, Collection};
use crate::retry::RetryConfig;

/// Everything a query against the private photos database needs. Shared by
/// every album and cursor built from one `PhotosService`.
pub(crate) struct QueryContext {
    pub session: Box<dyn PhotosSession>,
    pub service_endpoint: String,
    pub params: HashMap<String, Value>,
    pub zone_id: Value,
    pub page_size: usize,
    pub retry: RetryConfig,
    pub fetcher: Arc<AssetFetcher>,
}

impl QueryContext {
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}?{}",
            self.service_endpoint,
            path,
            encode_params(&self.params)
        )
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ICloudError> {
        retry_post(
            self.session.as_ref(),
            &self.url(path),
            &body.to_string(),
            &self.retry,
        )
        .await
    }
}

pub struct PhotoAlbum {
    name: String,
    query: AlbumQuery,
    ctx: Arc<QueryContext>,
}

impl PhotoAlbum {
    pub(crate) fn new(name: String, query: AlbumQuery, ctx: Arc<QueryContext>) -> Self {
        Self { name, query, ctx }
    }

    /// Item count via `HyperionIndexCountLookup`. Served from an index, so it
    /// can lag behind what a full listing returns.
    pub async fn len(&self) -> anyhow::Result<u64> {
        let body = json!({
            "batch": [{
                "resultsLimit": 1,
                "query": {
                    "filterBy": {
                        "fieldName": "indexCountID",
                        "fieldValue": {
                            "type": "STRING_LIST",
                            "value": [&self.query.obj_type]
                        },
                        "comparator": "IN",
                    },
                    "recordType": "HyperionIndexCountLookup",
                },
                "zoneWide": true,
                "zoneID": self.ctx.zone_id,
            }]
        });

        let response = self
            .ctx
            .post("internal/records/query/batch", &body)
            .await
            .with_context(|| format!("Failed to count album '{}'", self.name))?;
        let batch: BatchQueryResponse = serde_json::from_value(response)?;
        Ok(batch.item_count().unwrap_or(0))
    }
}

#[async_trait::async_trait]
impl Collection for PhotoAlbum {
    fn name(&self) -> &str {
        &self.name
    }

    async fn size(&self) -> anyhow::Result<u64> {
        self.len().await
    }

    fn assets(&self) -> Arc<dyn AssetIterator> {
        debug!(album = %self.name, "Opening album cursor");
        Arc::new(AlbumCursor::new(
            self.name.clone(),
            self.query.clone(),
            Arc::clone(&self.ctx),
        ))
    }
}

impl std::fmt::Debug for PhotoAlbum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<PhotoAlbum: '{}'>", self.name)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::icloud::photos::session::testing::ScriptedSession;

    pub fn context(session: &ScriptedSession, page_size: usize) -> Arc<QueryContext> {
        Arc::new(QueryContext {
            session: Box::new(session.clone()),
            service_endpoint: "https://ck.example/database/1/com.apple.photos.cloud/production/private"
                .to_string(),
            params: HashMap::from([("dsid".to_string(), json!("123"))]),
            zone_id: json!({"zoneName": "PrimarySync"}),
            page_size,
            retry: RetryConfig::NONE,
            fetcher: Arc::new(AssetFetcher::new(reqwest::Client::new(), RetryConfig::NONE)),
        })
    }
}
