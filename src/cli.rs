use clap::Parser;

use crate::types::{Domain, FileMatchPolicy, LogLevel, VersionSize};

#[derive(Parser, Debug)]
#[command(
    name = "icloudsync",
    version,
    about = "Mirror an iCloud Photos library into a local directory"
)]
pub struct Cli {
    /// Apple ID email address
    #[arg(short = 'u', long, env = "ICLOUD_USERNAME")]
    pub username: String,

    /// Directory holding the saved session for this account
    #[arg(long, env = "ICLOUD_COOKIE_DIR", default_value = "~/.icloudpd-rs")]
    pub cookie_directory: String,

    /// iCloud domain (com or cn)
    #[arg(long, value_enum, env = "ICLOUD_DOMAIN", default_value = "com")]
    pub domain: Domain,

    /// Local directory for downloads
    #[arg(short = 'o', long, env = "ICLOUD_OUTPUT", default_value = "./iCloudPhotos")]
    pub output: String,

    /// Album to download (default: the whole library)
    #[arg(short = 'a', long, env = "ICLOUD_ALBUM")]
    pub album: Option<String>,

    /// Stop after this many new downloads (0 = no limit)
    #[arg(short = 'r', long, env = "ICLOUD_RECENT")]
    pub recent: Option<u64>,

    /// Stop once this many files were found already downloaded (0 = never)
    #[arg(short = 's', long, env = "ICLOUD_STOP_FOUND_NUM", default_value_t = 50)]
    pub stop_found_num: u64,

    /// Number of concurrent download workers
    #[arg(
        short = 't',
        long,
        env = "ICLOUD_THREAD_NUM",
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub thread_num: u16,

    /// Delete local files for assets found in "Recently Deleted"
    #[arg(long, env = "ICLOUD_AUTO_DELETE")]
    pub auto_delete: bool,

    /// Rendition to download
    #[arg(long, value_enum, default_value = "original")]
    pub size: VersionSize,

    /// Date-based folder layout, e.g. %Y/%m/%d ("none" for flat)
    #[arg(long, default_value = "none")]
    pub folder_structure: String,

    /// How local filenames are derived from remote names
    #[arg(long, value_enum, default_value = "name-id7")]
    pub file_match_policy: FileMatchPolicy,

    /// Keep non-ASCII characters in filenames
    #[arg(long)]
    pub keep_unicode_in_filenames: bool,

    /// Report what would be downloaded or deleted without touching disk
    #[arg(long)]
    pub dry_run: bool,

    /// List available albums and exit
    #[arg(long)]
    pub list_albums: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    /// Run continuously, waiting N seconds between runs
    #[arg(long)]
    pub watch_with_interval: Option<u64>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Retries per request or download on transient failures
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Base delay in seconds between retries (doubled on each attempt)
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(["icloudsync", "-u", "u@example.com"].iter().chain(args))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.output, "./iCloudPhotos");
        assert_eq!(cli.stop_found_num, 50);
        assert_eq!(cli.thread_num, 1);
        assert_eq!(cli.size, VersionSize::Original);
        assert_eq!(cli.folder_structure, "none");
        assert_eq!(cli.file_match_policy, FileMatchPolicy::NameId7);
        assert!(cli.album.is_none());
        assert!(!cli.auto_delete);
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&["-o", "/tmp/p", "-a", "Favorites", "-r", "10", "-s", "0", "-t", "8"]).unwrap();
        assert_eq!(cli.output, "/tmp/p");
        assert_eq!(cli.album.as_deref(), Some("Favorites"));
        assert_eq!(cli.recent, Some(10));
        assert_eq!(cli.stop_found_num, 0);
        assert_eq!(cli.thread_num, 8);
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(parse(&["-t", "0"]).is_err());
    }

    #[test]
    fn test_value_enums() {
        let cli = parse(&["--size", "medium", "--file-match-policy", "name", "--domain", "cn"]).unwrap();
        assert_eq!(cli.size, VersionSize::Medium);
        assert_eq!(cli.file_match_policy, FileMatchPolicy::Name);
        assert_eq!(cli.domain, Domain::Cn);
    }
}
