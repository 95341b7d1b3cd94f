use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::album::QueryContext;
use super::asset::PhotoAsset;
use super::cloudkit::{QueryResponse, Record};
use super::collections::AlbumQuery;
use super::queries::DESIRED_KEYS_VALUES;
use crate::download::error::DownloadError;
use crate::download::file::{download_file, FetchRequest};
use crate::remote::{AssetIterator, RemoteAsset};
use crate::retry::RetryConfig;
use crate::types::VersionSize;

/// HTTP client and retry policy used to pull rendition bytes.
pub struct AssetFetcher {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl AssetFetcher {
    pub fn new(client: reqwest::Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }
}

/// A `PhotoAsset` bound to the fetcher that can download it.
struct CloudAsset {
    asset: PhotoAsset,
    fetcher: Arc<AssetFetcher>,
}

#[async_trait::async_trait]
impl RemoteAsset for CloudAsset {
    fn id(&self) -> &str {
        self.asset.id()
    }

    fn filename(&self) -> Option<String> {
        self.asset.filename().map(str::to_string)
    }

    fn created(&self) -> DateTime<Utc> {
        self.asset.asset_date()
    }

    fn size(&self, version: VersionSize) -> Option<u64> {
        self.asset.version(version).map(|v| v.size)
    }

    async fn fetch_to(&self, version: VersionSize, path: &Path) -> Result<(), DownloadError> {
        let Some(v) = self.asset.version(version) else {
            return Err(DownloadError::MissingVersion {
                version: version.to_string(),
            });
        };
        debug!(id = self.id(), %version, uti = %v.asset_type, "Fetching rendition");
        let req = FetchRequest {
            url: &v.url,
            checksum: &v.checksum,
            mtime: self.created().timestamp(),
        };
        download_file(&self.fetcher.client, &req, path, &self.fetcher.retry).await
    }
}

#[derive(Default)]
struct CursorState {
    buffer: VecDeque<PhotoAsset>,
    offset: u64,
    exhausted: bool,
}

/// Shared forward-only cursor over one album.
///
/// The state lock is held across the page request: a worker that finds the
/// buffer empty fetches the next page while the others wait for it, so every
/// asset is handed out exactly once.
pub struct AlbumCursor {
    album: String,
    query: AlbumQuery,
    ctx: Arc<QueryContext>,
    state: Mutex<CursorState>,
}

impl AlbumCursor {
    pub(crate) fn new(album: String, query: AlbumQuery, ctx: Arc<QueryContext>) -> Self {
        Self {
            album,
            query,
            ctx,
            state: Mutex::new(CursorState::default()),
        }
    }

    fn list_query(&self, offset: u64) -> Value {
        let mut filter_by = vec![
            json!({
                "fieldName": "startRank",
                "fieldValue": {"type": "INT64", "value": offset},
                "comparator": "EQUALS",
            }),
            json!({
                "fieldName": "direction",
                "fieldValue": {"type": "STRING", "value": "ASCENDING"},
                "comparator": "EQUALS",
            }),
        ];
        if let Some(extra) = self.query.query_filter.as_ref().and_then(Value::as_array) {
            filter_by.extend(extra.iter().cloned());
        }

        json!({
            "query": {
                "filterBy": filter_by,
                "recordType": &self.query.list_type,
            },
            // Each asset comes back as a master/asset record pair.
            "resultsLimit": self.ctx.page_size * 2,
            "desiredKeys": &*DESIRED_KEYS_VALUES,
            "zoneID": self.ctx.zone_id,
        })
    }

    async fn fetch_page(&self, offset: u64) -> anyhow::Result<(Vec<PhotoAsset>, u64)> {
        let response = self
            .ctx
            .post("records/query", &self.list_query(offset))
            .await
            .with_context(|| format!("Failed to list album '{}' at offset {offset}", self.album))?;
        let page: QueryResponse = serde_json::from_value(response)?;
        debug!(
            album = %self.album,
            offset,
            records = page.records.len(),
            "Fetched page"
        );
        Ok(pair_records(page.records))
    }
}

/// Join each `CPLMaster` with the `CPLAsset` that references it. Returns the
/// paired assets and how many masters the page held; the latter advances the
/// offset even for masters whose asset record is missing.
fn pair_records(records: Vec<Record>) -> (Vec<PhotoAsset>, u64) {
    let mut by_master: HashMap<String, Record> = HashMap::new();
    let mut masters: Vec<Record> = Vec::new();

    for rec in records {
        match rec.record_type.as_str() {
            "CPLAsset" => {
                if let Some(master_id) = rec.fields["masterRef"]["value"]["recordName"].as_str() {
                    by_master.insert(master_id.to_string(), rec);
                }
            }
            "CPLMaster" => masters.push(rec),
            _ => {}
        }
    }

    let count = masters.len() as u64;
    let assets = masters
        .iter()
        .filter_map(|master| match by_master.get(&master.record_name) {
            Some(asset) => Some(PhotoAsset::from_records(master, asset)),
            None => {
                warn!(id = %master.record_name, "Master record without asset record, skipping");
                None
            }
        })
        .collect();
    (assets, count)
}

#[async_trait::async_trait]
impl AssetIterator for AlbumCursor {
    async fn next(&self) -> anyhow::Result<Option<Box<dyn RemoteAsset>>> {
        let mut state = self.state.lock().await;
        loop {
            if let Some(asset) = state.buffer.pop_front() {
                return Ok(Some(Box::new(CloudAsset {
                    asset,
                    fetcher: Arc::clone(&self.ctx.fetcher),
                })));
            }
            if state.exhausted {
                return Ok(None);
            }
            let (assets, masters) = self.fetch_page(state.offset).await?;
            if masters == 0 {
                state.exhausted = true;
                continue;
            }
            state.offset += masters;
            state.buffer.extend(assets);
        }
    }
}
