use std::fmt;

use serde::{Deserialize, Serialize};

/// Rendition of an asset requested from iCloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, Serialize, Deserialize)]
pub enum VersionSize {
    Original,
    Medium,
    Thumb,
    Adjusted,
    Alternative,
}

impl VersionSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionSize::Original => "original",
            VersionSize::Medium => "medium",
            VersionSize::Thumb => "thumb",
            VersionSize::Adjusted => "adjusted",
            VersionSize::Alternative => "alternative",
        }
    }

    /// Filename suffix that keeps non-original renditions from colliding
    /// with the original on disk. `None` for the original itself.
    pub fn filename_suffix(&self) -> Option<&'static str> {
        match self {
            VersionSize::Original => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for VersionSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Domain {
    Com,
    Cn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How the display filename is turned into a local filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FileMatchPolicy {
    /// Use the cleaned display filename as-is. Assets that share a display
    /// name map to the same file.
    #[value(name = "name")]
    Name,
    /// Append the first 7 characters of the base64 asset id, so two assets
    /// sharing a display name never map to the same file.
    #[default]
    #[value(name = "name-id7")]
    NameId7,
}

/// Human-readable byte count, e.g. `2.0 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
