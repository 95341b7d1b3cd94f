use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use super::cloudkit::Record;
use super::queries::{item_type_from_str, PHOTO_VERSION_LOOKUP, VIDEO_VERSION_LOOKUP};
use super::types::{AssetItemType, AssetVersion};
use crate::types::VersionSize;

/// One photo or video, built from a paired `CPLMaster` / `CPLAsset` record.
///
/// Everything the sync engine needs is extracted up front so the raw JSON can
/// be dropped as soon as a page is parsed.
#[derive(Debug, Clone)]
pub struct PhotoAsset {
    id: String,
    filename: Option<String>,
    asset_date: DateTime<Utc>,
    versions: HashMap<VersionSize, AssetVersion>,
}

impl PhotoAsset {
    pub fn from_records(master: &Record, asset: &Record) -> Self {
        let filename = decode_filename(&master.fields["filenameEnc"]);
        let item_type = master
            .field_str("itemType")
            .and_then(item_type_from_str)
            .unwrap_or_else(|| guess_item_type(filename.as_deref()));
        let asset_date = asset.fields["assetDate"]["value"]
            .as_f64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let versions = collect_versions(item_type, &master.fields, &asset.fields);
        Self {
            id: master.record_name.clone(),
            filename,
            asset_date,
            versions,
        }
    }

    /// The master record name. Stable across albums.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// When the photo or video was taken.
    pub fn asset_date(&self) -> DateTime<Utc> {
        self.asset_date
    }

    pub fn version(&self, size: VersionSize) -> Option<&AssetVersion> {
        self.versions.get(&size)
    }
}

impl std::fmt::Display for PhotoAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<PhotoAsset: id={}>", self.id)
    }
}

/// `filenameEnc` is either a plain string or base64 bytes.
fn decode_filename(enc: &Value) -> Option<String> {
    let value = enc["value"].as_str()?;
    match enc["type"].as_str().unwrap_or("STRING") {
        "STRING" => Some(value.to_string()),
        "ENCRYPTED_BYTES" => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(value)
                .ok()?;
            String::from_utf8(decoded).ok()
        }
        other => {
            warn!(enc_type = other, "Unsupported filenameEnc type");
            None
        }
    }
}

fn guess_item_type(filename: Option<&str>) -> AssetItemType {
    let lower = filename.unwrap_or_default().to_lowercase();
    if [".heic", ".png", ".jpg", ".jpeg"]
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        AssetItemType::Image
    } else {
        AssetItemType::Movie
    }
}

/// Renditions present on the record pair. The asset record wins over the
/// master when both carry a field (adjusted renditions live on the asset).
fn collect_versions(
    item_type: AssetItemType,
    master_fields: &Value,
    asset_fields: &Value,
) -> HashMap<VersionSize, AssetVersion> {
    let lookup = match item_type {
        AssetItemType::Movie => VIDEO_VERSION_LOOKUP,
        AssetItemType::Image => PHOTO_VERSION_LOOKUP,
    };

    let mut versions = HashMap::new();
    for (key, prefix) in lookup {
        let res_field = format!("{prefix}Res");
        let fields = if !asset_fields[&res_field]["value"].is_null() {
            asset_fields
        } else if !master_fields[&res_field]["value"].is_null() {
            master_fields
        } else {
            continue;
        };

        let res = &fields[&res_field]["value"];
        let Some(url) = res["downloadURL"].as_str() else {
            warn!(field = %res_field, "Rendition has no downloadURL");
            continue;
        };
        versions.insert(
            *key,
            AssetVersion {
                size: res["size"].as_u64().unwrap_or(0),
                url: url.to_string(),
                asset_type: fields[&format!("{prefix}FileType")]["value"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                checksum: res["fileChecksum"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            },
        );
    }
    versions
}
