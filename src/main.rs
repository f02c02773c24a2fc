use clap::Parser;
use console_bridge::config::BridgeConfig;
use console_bridge::env::{apply_env, env_or};
use console_bridge::init::init_tracing;
use console_bridge::inject::{Injection, Injector};
use console_bridge::server::DevServer;
use std::error::Error;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;

/// Bind address used when neither `--addr` nor the env var is given.
const DEFAULT_ADDR: &str = "127.0.0.1:5173";
const CONSOLE_BRIDGE_ADDR_ENV: &str = "CONSOLE_BRIDGE_ADDR";

#[derive(Debug, Parser)]
#[clap(about, version)]
struct Options {
    /// Address to listen on.
    #[clap(short, long)]
    addr: Option<String>,
    /// Ingestion path, overrides the config file.
    #[clap(short, long)]
    endpoint: Option<String>,
    /// JSON config file.
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Print this HTML file with the bootstrap block added, then exit.
    #[clap(long, value_name = "FILE")]
    inject: Option<PathBuf>,
}

fn load_config(opts: &Options) -> Result<BridgeConfig, Box<dyn Error>> {
    let config = match &opts.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    let mut config = apply_env(config)?;
    if let Some(endpoint) = &opts.endpoint {
        config.endpoint = endpoint.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let opts = Options::parse();
    init_tracing()?;
    let config = load_config(&opts)?;

    if let Some(file) = &opts.inject {
        let source = std::fs::read_to_string(file)?;
        let path = file.to_string_lossy();
        match Injector::new(config).transform(&path, &source) {
            Injection::Injected(html) => print!("{html}"),
            Injection::Unchanged | Injection::Skipped => print!("{source}"),
        }
        return Ok(());
    }

    let addr = opts
        .addr
        .clone()
        .unwrap_or_else(|| env_or(CONSOLE_BRIDGE_ADDR_ENV, DEFAULT_ADDR));
    let listener = TcpListener::bind(&addr).await?;
    info!(enabled = config.enabled, "starting console bridge dev server");

    DevServer::new(&config)
        .serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
