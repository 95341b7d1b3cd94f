//! Deterministic mapping from (output root, asset, rendition) to a local path.
//!
//! The same inputs always yield the same path. That is what lets a second
//! run recognise files it already wrote, and lets the reconcile pass find
//! the file that belongs to a deleted asset.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::{DateTime, Datelike, Local, Timelike};

use crate::remote::RemoteAsset;
use crate::types::{FileMatchPolicy, VersionSize};

/// Path layout options, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    /// `"none"` for a flat layout, otherwise a date format such as `%Y/%m/%d`
    /// (optionally wrapped as `{:%Y/%m/%d}`).
    pub folder_structure: String,
    pub file_match_policy: FileMatchPolicy,
    pub keep_unicode: bool,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self {
            folder_structure: "none".to_string(),
            file_match_policy: FileMatchPolicy::default(),
            keep_unicode: false,
        }
    }
}

impl PathResolver {
    pub fn resolve(&self, root: &Path, asset: &dyn RemoteAsset, version: VersionSize) -> PathBuf {
        let created = asset.created().with_timezone(&Local);
        let filename = self.local_filename(asset, version);
        date_folder(root, &self.folder_structure, &created).join(filename)
    }

    fn local_filename(&self, asset: &dyn RemoteAsset, version: VersionSize) -> String {
        let mut name = match asset.filename() {
            Some(name) => clean_filename(&name),
            None => fingerprint_filename(asset.id()),
        };
        if !self.keep_unicode {
            name = remove_unicode_chars(&name);
        }
        if self.file_match_policy == FileMatchPolicy::NameId7 {
            name = apply_name_id7(&name, asset.id());
        }
        if let Some(suffix) = version.filename_suffix() {
            name = insert_suffix(&name, suffix);
        }
        name
    }
}

/// Append date-derived folders to `root` according to `folder_structure`.
fn date_folder(root: &Path, folder_structure: &str, created: &DateTime<Local>) -> PathBuf {
    if folder_structure.eq_ignore_ascii_case("none") || folder_structure.is_empty() {
        return root.to_path_buf();
    }
    let format_str = folder_structure
        .strip_prefix("{:")
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(folder_structure);

    expand_date_format(format_str, created)
        .split('/')
        .filter(|c| !c.is_empty())
        .fold(root.to_path_buf(), |path, component| path.join(component))
}

/// Expand `%Y %m %d %H %M %S` in one pass; unknown tokens are kept verbatim.
fn expand_date_format(format_str: &str, date: &DateTime<Local>) -> String {
    let mut out = String::with_capacity(format_str.len() + 8);
    let mut chars = format_str.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let _ = match chars.peek() {
            Some('Y') => write!(out, "{:04}", date.year()),
            Some('m') => write!(out, "{:02}", date.month()),
            Some('d') => write!(out, "{:02}", date.day()),
            Some('H') => write!(out, "{:02}", date.hour()),
            Some('M') => write!(out, "{:02}", date.minute()),
            Some('S') => write!(out, "{:02}", date.second()),
            _ => {
                out.push('%');
                continue;
            }
        };
        chars.next();
    }
    out
}

/// Strip characters that are invalid on common filesystems.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

pub fn remove_unicode_chars(filename: &str) -> String {
    filename.chars().filter(|c| c.is_ascii()).collect()
}

/// `photo.jpg` + `medium` → `photo-medium.jpg`.
pub fn insert_suffix(filename: &str, suffix: &str) -> String {
    match filename.rfind('.') {
        Some(dot) => {
            let (stem, ext) = filename.split_at(dot);
            format!("{}-{}{}", stem, suffix, ext)
        }
        None => format!("{}-{}", filename, suffix),
    }
}

/// `photo.jpg` + id → `photo_<first 7 base64 chars of id>.jpg`.
pub fn apply_name_id7(filename: &str, id: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(id.as_bytes());
    let id7: String = encoded.chars().take(7).collect();
    match filename.rfind('.') {
        Some(dot) => {
            let (stem, ext) = filename.split_at(dot);
            format!("{}_{}{}", stem, id7, ext)
        }
        None => format!("{}_{}", filename, id7),
    }
}

/// Name for assets that arrive without a display filename: the first 12
/// characters of the id with non-alphanumerics replaced by `_`.
pub fn fingerprint_filename(asset_id: &str) -> String {
    asset_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(12)
        .collect()
}
