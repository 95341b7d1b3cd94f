use std::collections::HashMap;
use std::sync::LazyLock;

use serde_json::Value;

use super::types::AssetItemType;
use crate::types::VersionSize;

/// CloudKit fields requested in every page query: everything needed for
/// identity, filenames, dates and rendition download URLs.
pub(crate) const DESIRED_KEYS: &[&str] = &[
    "resJPEGFullFileType",
    "resJPEGFullRes",
    "resJPEGMedFileType",
    "resJPEGMedRes",
    "resJPEGThumbFileType",
    "resJPEGThumbRes",
    "resVidMedFileType",
    "resVidMedRes",
    "resVidSmallFileType",
    "resVidSmallRes",
    "resOriginalFileType",
    "resOriginalRes",
    "resOriginalAltFileType",
    "resOriginalAltRes",
    "itemType",
    "filenameEnc",
    "isDeleted",
    "isExpunged",
    "dateExpunged",
    "recordName",
    "recordType",
    "recordChangeTag",
    "masterRef",
    "assetDate",
    "addedDate",
    "isHidden",
    "containerId",
    "itemId",
    "position",
];

pub(crate) static DESIRED_KEYS_VALUES: LazyLock<Vec<Value>> = LazyLock::new(|| {
    DESIRED_KEYS
        .iter()
        .map(|k| Value::String((*k).to_string()))
        .collect()
});

pub(crate) fn item_type_from_str(s: &str) -> Option<AssetItemType> {
    match s {
        "public.heic" | "public.heif" | "public.jpeg" | "public.png" => Some(AssetItemType::Image),
        s if s.ends_with("raw-image") => Some(AssetItemType::Image),
        "com.apple.quicktime-movie" | "public.mpeg-4" => Some(AssetItemType::Movie),
        _ => None,
    }
}

/// CloudKit field prefix holding each rendition. Prefix + "Res" is the
/// resource field (e.g. "resOriginalRes"), prefix + "FileType" its UTI.
pub(crate) const PHOTO_VERSION_LOOKUP: &[(VersionSize, &str)] = &[
    (VersionSize::Original, "resOriginal"),
    (VersionSize::Alternative, "resOriginalAlt"),
    (VersionSize::Medium, "resJPEGMed"),
    (VersionSize::Thumb, "resJPEGThumb"),
    (VersionSize::Adjusted, "resJPEGFull"),
];

pub(crate) const VIDEO_VERSION_LOOKUP: &[(VersionSize, &str)] = &[
    (VersionSize::Original, "resOriginal"),
    (VersionSize::Medium, "resVidMed"),
    (VersionSize::Thumb, "resVidSmall"),
];

/// Query-string encode `params`, sorted by key so URLs are stable.
pub(crate) fn encode_params(params: &HashMap<String, Value>) -> String {
    let mut pairs: Vec<String> = params
        .iter()
        .map(|(k, v)| {
            let val = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}={}", urlencoding::encode(k), urlencoding::encode(&val))
        })
        .collect();
    pairs.sort();
    pairs.join("&")
}
