use std::net::SocketAddr;

use clap::Parser;

/// Multi-tenant LLM API gateway.
#[derive(Debug, Parser)]
#[command(name = "gatewayd", version)]
pub struct Args {
    /// Path to the gatewayd.toml configuration file.
    #[arg(short, long, env = "GATEWAYD_CONFIG", default_value = "gatewayd.toml")]
    pub config: String,

    /// Overrides `server.listen_address` from the config file.
    #[arg(short, long, env = "GATEWAYD_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Log filter, e.g. "info" or "server=debug,registry=debug".
    #[arg(long, env = "GATEWAYD_LOG", default_value = "info")]
    pub log: String,
}
