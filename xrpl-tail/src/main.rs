//! Command-line tail for ledger node streams.

#![forbid(unsafe_code)]

use clap::{Parser, ValueEnum};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use xrpl_client::time::ripple_to_iso8601;
use xrpl_client::{Client, ConfigLoader, Network, Request, StreamCategory, StreamType};

/// Tail live streams from an XRPL or Xahau node
#[derive(Parser)]
#[command(name = "xrpl-tail")]
#[command(about = "Tail live streams from an XRPL or Xahau node")]
#[command(version)]
struct Cli {
    /// Node websocket URL, overrides configuration
    #[arg(short = 'u', long = "url", value_name = "URL")]
    url: Option<String>,

    /// Additional TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stream to subscribe to, repeatable
    #[arg(short = 's', long = "stream", value_name = "STREAM")]
    #[arg(default_value = "ledger")]
    streams: Vec<StreamType>,

    /// Exit after printing this many frames
    #[arg(short = 'n', long = "count", value_name = "N")]
    count: Option<usize>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    #[arg(default_value_t = OutputFormat::Human)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.streams.contains(&StreamType::Response) {
        return Err("response is a reply type, not a subscribable stream".into());
    }

    let mut loader = ConfigLoader::new("xrpl-client");
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    if let Some(url) = &cli.url {
        loader = loader.with_url(url);
    }
    let config = loader.load()?;
    let url = config.url.clone();

    let client = Client::connect(config).await?;
    let network = detect_network(&client).await?;
    if cli.format == OutputFormat::Human {
        eprintln!(
            "Connected to {url} ({network}, native asset {})",
            network.native_asset()
        );
    }

    let result = tail(&client, &cli).await;
    client.close().await?;
    result
}

async fn detect_network(client: &Client) -> Result<Network, Box<dyn std::error::Error>> {
    let response = client.request(Request::new("server_info")).await?;
    // Mainnet nodes omit network_id
    let network = response
        .result()
        .and_then(|result| result.pointer("/info/network_id"))
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .map(Network::from_id)
        .unwrap_or_default();
    debug!(%network, "Detected network");
    Ok(network)
}

async fn tail(client: &Client, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let names: Vec<&str> = cli.streams.iter().map(|stream| stream.as_str()).collect();
    let response = client.subscribe(names).await?;
    if !response.is_success() {
        let error = response.error().unwrap_or("unknown error");
        return Err(format!("node rejected subscription: {error}").into());
    }
    info!(streams = ?cli.streams, "Subscribed");

    let categories: BTreeSet<StreamCategory> =
        cli.streams.iter().filter_map(|stream| stream.category()).collect();
    let (frames_tx, mut frames_rx) = mpsc::channel(64);
    for category in categories {
        let queue = client.stream(category);
        let frames_tx = frames_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = queue.recv().await {
                if frames_tx.send((category, frame)).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(frames_tx);

    let mut printed = 0usize;
    loop {
        if cli.count.is_some_and(|count| printed >= count) {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            frame = frames_rx.recv() => {
                let Some((category, frame)) = frame else {
                    break;
                };
                print_frame(category, &frame, cli.format);
                printed += 1;
            }
        }
    }
    Ok(())
}

fn print_frame(category: StreamCategory, frame: &[u8], format: OutputFormat) {
    let text = String::from_utf8_lossy(frame);
    if format == OutputFormat::Json {
        println!("{text}");
        return;
    }

    let Ok(value) = serde_json::from_slice::<Value>(frame) else {
        println!("{category}: {text}");
        return;
    };

    if category == StreamCategory::Ledger {
        let closed = value["ledger_time"]
            .as_i64()
            .and_then(ripple_to_iso8601)
            .unwrap_or_else(|| "?".to_owned());
        println!(
            "ledger {} closed {closed} txns {}",
            value["ledger_index"], value["txn_count"]
        );
    } else {
        println!("{category}: {value}");
    }
}
