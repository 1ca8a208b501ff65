//! canvass-sync - offline-first interview sync CLI
//!
//! Runs one pass over the locally captured interview queue, delivering each
//! record to the server through submit, attachment upload, and read-back
//! verification. Exits non-zero when any record fails so cron-style callers
//! can alert on it.

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use canvass_common::config::{resolve_data_root, resolve_server_url, TomlConfig};
use canvass_sync::api::HttpSyncApi;
use canvass_sync::services::RunStatus;
use canvass_sync::{SyncEngine, SyncPolicy};

#[derive(Parser, Debug)]
#[command(name = "canvass-sync", version, about = "Sync captured interviews to the server")]
struct Cli {
    /// Root directory holding the local database and audio files
    #[arg(long)]
    data_root: Option<String>,

    /// Server base URL, e.g. https://canvass.example.org
    #[arg(long)]
    server_url: Option<String>,

    /// Bearer token for authenticated endpoints
    #[arg(long, env = "CANVASS_API_TOKEN")]
    api_token: Option<String>,

    /// Enable debug-level logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting canvass-sync");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let toml_config = TomlConfig::load()?;

    let data_root = resolve_data_root(cli.data_root.as_deref(), &toml_config);
    std::fs::create_dir_all(&data_root)
        .map_err(|e| anyhow::anyhow!("Failed to create data root {}: {}", data_root.display(), e))?;

    let server_url = resolve_server_url(cli.server_url.as_deref(), &toml_config)?;
    let api_token = cli.api_token.or_else(|| toml_config.api_token.clone());

    let db_path = data_root.join("canvass.db");
    info!("Database: {}", db_path.display());
    let pool = canvass_sync::db::init_database_pool(&db_path).await?;

    let api = HttpSyncApi::new(&server_url, api_token)?;
    info!("Server: {}", server_url);

    let engine = SyncEngine::new(pool, api, SyncPolicy::default());

    let result = engine.run_sync().await;

    match result.status {
        RunStatus::Busy => {
            warn!("Another sync run is already in progress");
        }
        RunStatus::Offline => {
            warn!("Server unreachable, nothing synced");
        }
        RunStatus::NothingToSync => {
            info!("Queue empty, nothing to sync");
        }
        RunStatus::Completed => {
            info!(
                synced = result.synced_count,
                failed = result.failed_count,
                "Sync pass complete"
            );
            for err in &result.errors {
                match err.record_id {
                    Some(id) => warn!(record_id = %id, error = %err.error, "Record failed"),
                    None => warn!(error = %err.error, "Sync run error"),
                }
            }
        }
    }

    if !result.success {
        std::process::exit(1);
    }

    Ok(())
}
