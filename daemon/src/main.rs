//! tally daemon — entry point for serving the poll ledger.

mod config;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use config::DaemonConfig;
use tally_aggregate::{PollAggregator, PopularPolls, Reclassifier};
use tally_geoip::{GeoTable, ProviderTable};
use tally_ledger::{RecentVotesFeed, VoteLedger};
use tally_rpc::{AppState, RpcServer};
use tally_store::ObjectStore;
use tally_store_fs::FsObjectStore;

#[derive(Parser)]
#[command(name = "tallyd", about = "tally poll ledger daemon")]
struct Cli {
    /// Root directory of the object store.
    #[arg(long, env = "TALLY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Port for the HTTP interface.
    #[arg(long, env = "TALLY_PORT")]
    port: Option<u16>,

    /// Directory of geolocation partition files.
    #[arg(long, env = "TALLY_GEOIP_DIR")]
    geoip_dir: Option<PathBuf>,

    /// CSV of provider CIDR ranges (ip_prefix,provider,tag).
    #[arg(long, env = "TALLY_PROVIDER_RANGES")]
    provider_ranges: Option<PathBuf>,

    /// Path to a TOML configuration file. If provided, file settings are
    /// used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Serve the HTTP interface.
    Serve,
    /// Re-classify provider columns across all shards, then exit.
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tally_utils::init_tracing();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.geoip_dir.is_some() {
        config.geoip_dir = cli.geoip_dir;
    }
    if cli.provider_ranges.is_some() {
        config.provider_ranges = cli.provider_ranges;
    }

    let store: Arc<dyn ObjectStore> = Arc::new(
        FsObjectStore::open(&config.data_dir)
            .map_err(|e| anyhow::anyhow!("opening store at {}: {e}", config.data_dir.display()))?,
    );

    let geo = match &config.geoip_dir {
        Some(dir) => Arc::new(GeoTable::load_dir(dir).context("loading geoip partitions")?),
        None => {
            tracing::warn!("no geoip directory configured, classifying all votes as unknown");
            Arc::new(GeoTable::empty())
        }
    };
    let providers = match &config.provider_ranges {
        Some(path) => {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("reading provider ranges from {}", path.display()))?;
            Arc::new(ProviderTable::from_csv(&body).context("parsing provider ranges")?)
        }
        None => Arc::new(ProviderTable::empty()),
    };

    match cli.command {
        Command::Serve => {
            let feed = Arc::new(RecentVotesFeed::new(store.clone()));
            let ledger = VoteLedger::new(store.clone(), geo, providers).with_feed(feed);
            let state = AppState::new(
                ledger,
                PollAggregator::new(store.clone()),
                PopularPolls::new(store.clone()),
                store,
            );
            RpcServer::new(config.port)
                .start(state)
                .await
                .context("rpc server")?;
        }
        Command::Sweep => {
            let summary = Reclassifier::new(store).sweep(&providers)?;
            println!(
                "scanned {} shards, rewrote {}, changed {} rows",
                summary.shards_scanned, summary.shards_updated, summary.rows_changed
            );
        }
    }
    Ok(())
}
