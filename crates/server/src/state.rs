//! Shared, read-mostly process state handed to every handler.

use std::sync::Arc;

use config::Config;
use registry::ConversionRegistry;
use tunnel::TunnelManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: &'static ConversionRegistry,
    pub http_client: reqwest::Client,
    pub tunnel_manager: Arc<TunnelManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: registry::register_default_normalizers(),
            http_client: reqwest::Client::new(),
            tunnel_manager: Arc::new(TunnelManager::new()),
        }
    }
}
