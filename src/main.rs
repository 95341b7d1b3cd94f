//! icloudsync: mirror an iCloud Photos library into a local directory.
//!
//! Reuses a session saved by an interactive login tool, pages through the
//! chosen album over Apple's CloudKit API and downloads new assets with a
//! bounded pool of workers. Optionally deletes local copies of assets the
//! user moved to "Recently Deleted".

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod download;
mod icloud;
mod remote;
pub mod retry;
mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use download::progress::{EventSink, ProgressReporter};
use icloud::photos::{AssetFetcher, PhotosService};
use remote::PhotoSource;

/// Request timeout for CloudKit queries and downloads.
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Query parameters every CloudKit request carries.
fn service_params(account: &auth::AccountSession) -> HashMap<String, Value> {
    let mut params = HashMap::from([
        (
            "clientBuildNumber".to_string(),
            Value::String("2522Project44".to_string()),
        ),
        (
            "clientMasteringNumber".to_string(),
            Value::String("2522B2".to_string()),
        ),
        (
            "clientId".to_string(),
            Value::String(account.session.client_id().unwrap_or_default().to_string()),
        ),
    ]);
    params.insert("dsid".to_string(), Value::String(account.dsid.clone()));
    params
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = config::Config::from_cli(cli);
    tracing::debug!(?config, "Resolved configuration");
    tracing::info!(concurrency = config.thread_num, "Starting icloudsync");

    let account = auth::load_session(
        &config.cookie_directory,
        &config.username,
        config.domain,
        Some(HTTP_TIMEOUT_SECS),
    )
    .await?;

    let retry = config.retry_config();
    let client = account.session.http_client();
    tracing::info!("Initializing photos service...");
    let photos = PhotosService::new(
        &account.ckdatabasews_url,
        Box::new(client.clone()),
        service_params(&account),
        AssetFetcher::new(client, retry.clone()),
        retry,
    )
    .await?;

    if config.list_albums {
        println!("Albums:");
        for name in photos.collection_names() {
            println!("  {}", name);
        }
        return Ok(());
    }

    let sync_config = config.sync_config();
    let events: Arc<dyn EventSink> = Arc::new(ProgressReporter::new(config.no_progress_bar));

    loop {
        download::sync_library(&photos, &sync_config, Arc::clone(&events)).await?;

        let Some(interval) = config.watch_with_interval else {
            break;
        };
        tracing::info!("Waiting {} seconds...", interval);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted during wait, exiting...");
                break;
            }
        }
    }

    Ok(())
}
