//! Health endpoint, bound either inline on the main router or on its own
//! listener when `server.health.listen` is set (e.g. so a k8s readiness
//! probe hits a port that bypasses the gateway's own middleware stack).

use std::net::SocketAddr;

use axum::{Json, Router, routing::get};
use config::HealthConfig;
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Serves the health endpoint on its own listener, independent of the main
/// gateway router and its lifetime.
pub async fn bind_health_endpoint(listen: SocketAddr, config: HealthConfig) {
    let router = Router::new().route(&config.path, get(health));

    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind health endpoint to {listen}: {e}");
            return;
        }
    };

    log::info!("Health endpoint: http://{listen}{}", config.path);

    if let Err(e) = axum::serve(listener, router).await {
        log::error!("Health endpoint server error: {e}");
    }
}
