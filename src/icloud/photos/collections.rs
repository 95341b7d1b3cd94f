use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use super::cloudkit::Record;
use crate::remote::RECENTLY_DELETED;

/// Name under which the whole library is exposed.
pub const ALL_PHOTOS: &str = "All Photos";

// Apple's sentinel folder IDs. These are containers, not real albums.
const ROOT_FOLDER: &str = "----Root-Folder----";
const PROJECT_ROOT_FOLDER: &str = "----Project-Root-Folder----";

/// How to page through one collection: the CloudKit record type to list and
/// the index type whose count is the collection's size.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumQuery {
    pub list_type: String,
    pub obj_type: String,
    pub query_filter: Option<Value>,
}

impl AlbumQuery {
    fn fixed(obj_type: &str, list_type: &str, query_filter: Option<Value>) -> Self {
        Self {
            list_type: list_type.to_string(),
            obj_type: obj_type.to_string(),
            query_filter,
        }
    }

    fn smart(tag: &str, filter_value: &str) -> Self {
        Self::fixed(
            &format!("CPLAssetInSmartAlbumByAssetDate:{tag}"),
            "CPLAssetAndMasterInSmartAlbumByAssetDate",
            Some(equals_filter("smartAlbum", filter_value)),
        )
    }
}

fn equals_filter(field: &str, value: &str) -> Value {
    json!([{
        "fieldName": field,
        "comparator": "EQUALS",
        "fieldValue": {"type": "STRING", "value": value}
    }])
}

/// Every collection the library exposes, in listing order: the whole
/// library, the built-in smart folders, then the user's albums.
///
/// Built once per process from the folder records and never mutated, so it
/// can be shared by all workers without locking.
#[derive(Debug, Clone)]
pub struct CollectionTable {
    entries: Vec<(String, AlbumQuery)>,
}

impl CollectionTable {
    pub fn build(folders: &[Record]) -> Self {
        let mut entries = vec![
            (
                ALL_PHOTOS.to_string(),
                AlbumQuery::fixed("CPLAssetByAddedDate", "CPLAssetAndMasterByAddedDate", None),
            ),
            ("Time-lapse".to_string(), AlbumQuery::smart("Timelapse", "TIMELAPSE")),
            ("Videos".to_string(), AlbumQuery::smart("Video", "VIDEO")),
            ("Slo-mo".to_string(), AlbumQuery::smart("Slomo", "SLOMO")),
            (
                "Bursts".to_string(),
                AlbumQuery::fixed(
                    "CPLAssetBurstStackAssetByAssetDate",
                    "CPLBurstStackAssetAndMasterByAssetDate",
                    None,
                ),
            ),
            ("Favorites".to_string(), AlbumQuery::smart("Favorite", "FAVORITE")),
            ("Panoramas".to_string(), AlbumQuery::smart("Panorama", "PANORAMA")),
            ("Screenshots".to_string(), AlbumQuery::smart("Screenshot", "SCREENSHOT")),
            ("Live".to_string(), AlbumQuery::smart("Live", "LIVE")),
            (
                RECENTLY_DELETED.to_string(),
                AlbumQuery::fixed(
                    "CPLAssetDeletedByExpungedDate",
                    "CPLAssetAndMasterDeletedByExpungedDate",
                    None,
                ),
            ),
            (
                "Hidden".to_string(),
                AlbumQuery::fixed(
                    "CPLAssetHiddenByAssetDate",
                    "CPLAssetAndMasterHiddenByAssetDate",
                    None,
                ),
            ),
        ];

        for folder in folders {
            let Some(name) = user_folder_name(folder) else {
                continue;
            };
            if entries.iter().any(|(existing, _)| *existing == name) {
                debug!(album = %name, "Album name shadows an existing collection, skipping");
                continue;
            }
            let id = &folder.record_name;
            entries.push((
                name,
                AlbumQuery::fixed(
                    &format!("CPLContainerRelationNotDeletedByAssetDate:{id}"),
                    "CPLContainerRelationLiveByAssetDate",
                    Some(equals_filter("parentId", id)),
                ),
            ));
        }

        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&AlbumQuery> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, q)| q)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

/// Display name of a user album, or `None` for sentinel, deleted and
/// unnamed folders.
fn user_folder_name(folder: &Record) -> Option<String> {
    if folder.record_name == ROOT_FOLDER || folder.record_name == PROJECT_ROOT_FOLDER {
        return None;
    }
    if folder.fields["isDeleted"]["value"].as_bool().unwrap_or(false) {
        return None;
    }
    let enc = folder.field_str("albumNameEnc")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(enc).ok()?;
    let name = String::from_utf8(decoded).ok()?;
    if name.is_empty() {
        return None;
    }
    Some(name)
}
