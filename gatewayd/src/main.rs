use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use server::ServeConfig;
use tokio_util::sync::CancellationToken;

use args::Args;

mod args;

const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::Config::load(&args.config).with_context(|| format!("loading config from {}", args.config))?;

    let listen_address = args
        .listen_address
        .or(config.server.listen_address)
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.parse::<SocketAddr>().expect("static address is valid"));

    let shutdown_signal = CancellationToken::new();
    let shutdown_task = {
        let shutdown_signal = shutdown_signal.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_signal.cancel();
        })
    };

    let result = server::serve(ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter: args.log,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    })
    .await;

    shutdown_task.abort();

    result
}
