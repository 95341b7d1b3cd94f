use std::path::PathBuf;

use crate::download::paths::PathResolver;
use crate::download::SyncConfig;
use crate::retry::RetryConfig;
use crate::types::{Domain, FileMatchPolicy, VersionSize};

/// Application configuration, resolved from the command line.
pub struct Config {
    pub username: String,
    pub directory: PathBuf,
    pub cookie_directory: PathBuf,
    pub folder_structure: String,
    pub album: Option<String>,

    pub watch_with_interval: Option<u64>,
    /// `None` when the flag was absent or 0.
    pub recent: Option<u64>,
    /// `None` when the flag was 0.
    pub stop_found_num: Option<u64>,
    pub retry_delay_secs: u64,
    pub max_retries: u32,
    pub thread_num: u16,

    pub size: VersionSize,
    pub domain: Domain,
    pub file_match_policy: FileMatchPolicy,

    pub auto_delete: bool,
    pub list_albums: bool,
    pub dry_run: bool,
    pub no_progress_bar: bool,
    pub keep_unicode_in_filenames: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("directory", &self.directory)
            .field("album", &self.album)
            .field("thread_num", &self.thread_num)
            .field("domain", &self.domain)
            .field("cookie_directory", &self.cookie_directory)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: crate::cli::Cli) -> Self {
        Self {
            username: cli.username,
            directory: expand_tilde(&cli.output),
            cookie_directory: expand_tilde(&cli.cookie_directory),
            folder_structure: cli.folder_structure,
            album: cli.album,
            watch_with_interval: cli.watch_with_interval.filter(|&secs| secs > 0),
            recent: cli.recent.filter(|&n| n > 0),
            stop_found_num: Some(cli.stop_found_num).filter(|&n| n > 0),
            retry_delay_secs: cli.retry_delay,
            max_retries: cli.max_retries,
            thread_num: cli.thread_num,
            size: cli.size,
            domain: cli.domain,
            file_match_policy: cli.file_match_policy,
            auto_delete: cli.auto_delete,
            list_albums: cli.list_albums,
            dry_run: cli.dry_run,
            no_progress_bar: cli.no_progress_bar,
            keep_unicode_in_filenames: cli.keep_unicode_in_filenames,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_secs: self.retry_delay_secs,
            ..RetryConfig::default()
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            directory: self.directory.clone(),
            album: self.album.clone(),
            recent: self.recent,
            stop_found_num: self.stop_found_num,
            thread_num: usize::from(self.thread_num),
            auto_delete: self.auto_delete,
            size: self.size,
            paths: PathResolver {
                folder_structure: self.folder_structure.clone(),
                file_match_policy: self.file_match_policy,
                keep_unicode: self.keep_unicode_in_filenames,
            },
            dry_run: self.dry_run,
        }
    }
}
