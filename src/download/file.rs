//! Streaming HTTP fetch into a `.part` file, checksum verification, and the
//! final rename into place.

use std::fs::FileTimes;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::DownloadError;
use crate::retry::{self, RetryAction, RetryConfig};

/// One rendition to fetch: where it comes from and what it must hash to.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    /// Base64 checksum as reported by CloudKit. May be empty or undecodable,
    /// in which case verification is skipped.
    pub checksum: &'a str,
    /// Unix timestamp stamped as the file's mtime after the rename.
    pub mtime: i64,
}

/// Base32 encode bytes using RFC 4648 alphabet (A-Z, 2-7), no padding.
fn base32_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut result = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u64 = 0;
    let mut bits_left: u32 = 0;

    for &byte in data {
        buffer = (buffer << 8) | byte as u64;
        bits_left += 8;
        while bits_left >= 5 {
            bits_left -= 5;
            result.push(ALPHABET[((buffer >> bits_left) & 0x1F) as usize] as char);
        }
    }
    if bits_left > 0 {
        result.push(ALPHABET[((buffer << (5 - bits_left)) & 0x1F) as usize] as char);
    }
    result
}

fn decode_checksum(checksum: &str) -> Option<Vec<u8>> {
    if checksum.is_empty() {
        return None;
    }
    base64::engine::general_purpose::STANDARD
        .decode(checksum)
        .ok()
}

/// `.part` path next to `dest`: `<base32 checksum>-<dest name>.part` when
/// there is a checksum (base32, since base64 may contain `/`), otherwise
/// `<dest name>.part`. The destination name keeps two assets with identical
/// bytes from sharing a part file.
fn part_path(dest: &Path, checksum: &str) -> PathBuf {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let name = dest
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    match decode_checksum(checksum) {
        Some(bytes) => dir.join(format!("{}-{}.part", base32_encode(&bytes), name)),
        None => dir.join(format!("{}.part", name)),
    }
}

/// Apple sends either a raw 32-byte SHA-256 or 33 bytes with a one-byte type
/// prefix. Anything else is not verifiable and passes.
fn checksum_matches(expected: &[u8], actual: &[u8]) -> bool {
    match expected.len() {
        32 => actual == expected,
        33 => actual == &expected[1..],
        _ => true,
    }
}

/// Fetch `req.url` to `dest`, retrying transient failures with backoff.
///
/// Each attempt starts from an empty `.part` file. The destination is only
/// replaced once the body is complete and verified, so a failed fetch never
/// leaves a truncated file at `dest`.
pub async fn download_file(
    client: &Client,
    req: &FetchRequest<'_>,
    dest: &Path,
    retry_config: &RetryConfig,
) -> Result<(), DownloadError> {
    let part = part_path(dest, req.checksum);
    let label = dest.display().to_string();

    let result = retry::retry_with_backoff(
        retry_config,
        &label,
        |e: &DownloadError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || async {
            let _ = fs::remove_file(&part).await;
            attempt_download(client, req, dest, &part).await
        },
    )
    .await;

    match result {
        Ok(()) => {}
        Err(e) if e.is_retryable() => {
            let _ = fs::remove_file(&part).await;
            return Err(DownloadError::RetriesExhausted {
                retries: retry_config.max_retries,
                path: label,
                last_error: e.to_string(),
            });
        }
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            return Err(e);
        }
    }

    let mtime_path = dest.to_path_buf();
    let ts = req.mtime;
    match tokio::task::spawn_blocking(move || set_file_mtime(&mtime_path, ts)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Could not set mtime on {}: {}", dest.display(), e),
        Err(e) => tracing::warn!("mtime task failed for {}: {}", dest.display(), e),
    }
    Ok(())
}

async fn attempt_download(
    client: &Client,
    req: &FetchRequest<'_>,
    dest: &Path,
    part: &Path,
) -> Result<(), DownloadError> {
    let path_str = dest.display().to_string();
    let response = client
        .get(req.url)
        .send()
        .await
        .map_err(|e| DownloadError::Http {
            source: e,
            path: path_str.clone(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::HttpStatus {
            status: status.as_u16(),
            path: path_str,
        });
    }
    let content_length = response.content_length();

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part)
        .await?;

    let mut hasher = Sha256::new();
    let mut bytes_written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!(
                ?content_length,
                bytes_written,
                "Body error for {}: {}",
                path_str,
                e
            );
            DownloadError::Http {
                source: e,
                path: path_str.clone(),
            }
        })?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    if let Some(expected) = decode_checksum(req.checksum) {
        if !checksum_matches(&expected, hasher.finalize().as_slice()) {
            return Err(DownloadError::ChecksumMismatch(path_str));
        }
    }

    fs::rename(part, dest).await?;
    tracing::debug!(size_bytes = bytes_written, path = %dest.display(), "Fetched");
    Ok(())
}

/// Set modification and access time. Pre-1970 timestamps are clamped to the
/// epoch.
pub fn set_file_mtime(path: &Path, timestamp: i64) -> std::io::Result<()> {
    let time = if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(timestamp.unsigned_abs()))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    };
    let times = FileTimes::new().set_modified(time).set_accessed(time);
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)
}
