//! Command-line client for the EmberDB HTTP API.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};

use emberdb::server::{GetResponse, SetRequest};
use emberdb::store::Stats;

#[derive(Debug, Parser)]
#[command(name = "emberdb-cli", about = "Client for the EmberDB key-value store")]
struct Cli {
    /// Server base URL
    #[arg(long, env = "EMBERDB_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the value for a key
    Get { key: String },
    /// Store a key-value pair
    Set { key: String, value: String },
    /// Delete a key
    Delete { key: String },
    /// List all keys
    List,
    /// Show database statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Command::Get { key } => {
            let response = client
                .get(format!("{}/v1/kv/{key}", cli.addr))
                .send()
                .await
                .context("failed to reach server")?;
            let status = response.status();
            if status == StatusCode::OK {
                let body: GetResponse = response.json().await.context("invalid response")?;
                println!("{}", body.value);
            } else if status == StatusCode::NOT_FOUND {
                bail!("key {key:?} not found");
            } else {
                bail!("unexpected response: {status}");
            }
        }
        Command::Set { key, value } => {
            let response = client
                .put(format!("{}/v1/kv", cli.addr))
                .json(&SetRequest { key, value })
                .send()
                .await
                .context("failed to reach server")?;
            if !response.status().is_success() {
                bail!("unexpected response: {}", response.status());
            }
            println!("OK");
        }
        Command::Delete { key } => {
            let response = client
                .delete(format!("{}/v1/kv/{key}", cli.addr))
                .send()
                .await
                .context("failed to reach server")?;
            let status = response.status();
            if status == StatusCode::NO_CONTENT {
                println!("OK");
            } else if status == StatusCode::NOT_FOUND {
                bail!("key {key:?} not found");
            } else {
                bail!("unexpected response: {status}");
            }
        }
        Command::List => {
            let response = client
                .get(format!("{}/v1/keys", cli.addr))
                .send()
                .await
                .context("failed to reach server")?;
            if !response.status().is_success() {
                bail!("unexpected response: {}", response.status());
            }
            let keys: Vec<String> = response.json().await.context("invalid response")?;
            for key in keys {
                println!("{key}");
            }
        }
        Command::Stats => {
            let response = client
                .get(format!("{}/v1/stats", cli.addr))
                .send()
                .await
                .context("failed to reach server")?;
            if !response.status().is_success() {
                bail!("unexpected response: {}", response.status());
            }
            let stats: Stats = response.json().await.context("invalid response")?;
            println!("keys: {}", stats.total_keys);
            println!("value bytes: {}", stats.total_value_bytes);
            println!("segments: {}", stats.segment_count);
        }
    }

    Ok(())
}
