//! EmberDB HTTP server.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use emberdb::config::Config;
use emberdb::server;
use emberdb::store::Store;

#[derive(Debug, Parser)]
#[command(name = "emberdb-server", about = "EmberDB key-value store server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "EMBERDB_ADDR", default_value = "127.0.0.1:8080")]
    addr: String,

    /// Directory for segment files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Background compaction period in seconds
    #[arg(long, default_value_t = 1800)]
    merge_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = Config::new(&args.data_dir)
        .merge_interval(Duration::from_secs(args.merge_interval_secs));
    let store = Store::open(config).context("failed to open store")?;
    tracing::info!(data_dir = %args.data_dir.display(), "store opened");

    server::serve(store, &args.addr)
        .await
        .context("server exited with error")?;

    Ok(())
}
