//! Gateway server library.
//!
//! Wires the six client-facing protocol endpoints, the proxy-node tunnel's
//! WebSocket upgrade endpoint, model listing, and the health endpoint onto
//! one axum `Router`, and owns process startup: telemetry init, logging
//! init, binding, and graceful shutdown.

#![deny(missing_docs)]

mod collaborators;
pub mod error;
mod handlers;
mod health;
mod logger;
mod scheduler;
mod state;
mod tracing;
mod tunnel_auth;
mod ws;

use std::{net::SocketAddr, sync::Arc};

use anyhow::anyhow;
use axum::{Router, routing::get};
use config::Config;
use telemetry::TelemetryGuard;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use state::AppState;
pub use tunnel_auth::{NodeAuthValidator, PermissiveValidator, TunnelAuth};

use crate::tracing::TracingLayer;

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized `gatewayd.toml` configuration.
    pub config: Config,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// Log filter string (e.g., "info" or "server=debug,registry=debug").
    pub log_filter: String,
    /// The version string to log on startup.
    pub version: String,
    /// Optional oneshot sender to send back the bound address (useful if port 0 was specified).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the gateway server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let _telemetry_guard = init_otel(&config, log_filter).await;

    log::info!("gatewayd {version}");

    if !config.gateway.enabled {
        log::warn!("gateway is disabled in configuration; serving health endpoint only");
    }

    let state = AppState::new(config.clone());

    let mut app = Router::new();
    let protocols = &config.gateway.protocols;

    if config.gateway.enabled {
        if protocols.openai_chat.enabled {
            app = app.route(&protocols.openai_chat.path, axum::routing::post(handlers::openai_chat));
            log::info!("OpenAI Chat endpoint: http://{listen_address}{}", protocols.openai_chat.path);
        }
        if protocols.openai_cli.enabled {
            app = app.route(&protocols.openai_cli.path, axum::routing::post(handlers::openai_cli));
            log::info!("OpenAI CLI endpoint: http://{listen_address}{}", protocols.openai_cli.path);
        }
        if protocols.claude_chat.enabled {
            app = app.route(&protocols.claude_chat.path, axum::routing::post(handlers::claude_chat));
            log::info!("Claude Chat endpoint: http://{listen_address}{}", protocols.claude_chat.path);
        }
        if protocols.claude_cli.enabled {
            app = app.route(&protocols.claude_cli.path, axum::routing::post(handlers::claude_cli));
            log::info!("Claude CLI endpoint: http://{listen_address}{}", protocols.claude_cli.path);
        }
        if protocols.gemini_chat.enabled {
            app = app.route(&protocols.gemini_chat.path, axum::routing::post(handlers::gemini_chat));
            log::info!("Gemini Chat endpoint: http://{listen_address}{}", protocols.gemini_chat.path);
        }
        if protocols.gemini_cli.enabled {
            app = app.route(&protocols.gemini_cli.path, axum::routing::post(handlers::gemini_cli));
            log::info!("Gemini CLI endpoint: http://{listen_address}{}", protocols.gemini_cli.path);
        }

        app = app
            .route("/v1/models", get(handlers::list_openai_models))
            .route("/v1/messages/models", get(handlers::list_claude_models))
            .route("/v1beta/models/list", get(handlers::list_gemini_models));

        app = app.route("/api/internal/proxy-tunnel", get(ws::tunnel_upgrade));
        log::info!("Tunnel endpoint: ws://{listen_address}/api/internal/proxy-tunnel");
    }

    let app = app
        .layer(TracingLayer::with_config(Arc::new(config.telemetry.clone())))
        .with_state(state);

    let mut app = app;
    if config.server.health.enabled {
        if let Some(listen) = config.server.health.listen {
            tokio::spawn(health::bind_health_endpoint(listen, config.server.health.clone()));
        } else {
            app = app.route(&config.server.health.path, get(health::health));
        }
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if let Some(sender) = bound_addr_sender {
        sender
            .send(listener.local_addr()?)
            .expect("Failed to send back bound address.");
    }

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("Received shutdown signal, shutting down gracefully...");
        }
    }

    Ok(())
}

async fn init_otel(config: &Config, log_filter: String) -> Option<TelemetryGuard> {
    match telemetry::init(&config.telemetry).await {
        Ok(guard) => {
            let otel_appender = guard.logs_appender().cloned();
            logger::init(&log_filter, otel_appender);
            Some(guard)
        }
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {e}");
            logger::init(&log_filter, None);
            None
        }
    }
}
