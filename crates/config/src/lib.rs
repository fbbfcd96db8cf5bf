//! Gateway configuration structures, mapping `gatewayd.toml` onto the
//! closed config-key set the registry's compatibility gate and the
//! upstream dispatcher consume.

#![deny(missing_docs)]

mod error;
mod gateway;
mod health;
mod http_types;
mod loader;
mod server;
mod telemetry;

use std::path::Path;

pub use error::Error;
pub use gateway::{EndpointConfig, FormatId, GatewayConfig, ProtocolEndpoint, ProtocolsConfig};
pub use health::HealthConfig;
pub use http_types::{HeaderName, HeaderValue};
pub use server::ServerConfig;
use serde::Deserialize;
pub use telemetry::TelemetryConfig;
pub use telemetry::exporters::{ExportersConfig, GrpcHeaders, HttpHeaders, OtlpExporterConfig, OtlpGrpcConfig, OtlpHttpConfig, OtlpProtocol};
pub use telemetry::logs::LogsConfig;
pub use telemetry::metrics::MetricsConfig;
pub use telemetry::tracing::{CollectConfig, PropagationConfig, TracingConfig};

/// Main configuration structure for the gateway process.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Client-facing protocol endpoints and upstream routing settings.
    pub gateway: GatewayConfig,
    /// Telemetry configuration settings.
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates that the configuration has at least one routable endpoint
    /// behind at least one enabled protocol.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_has_endpoints(self)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        Config {
            server: ServerConfig {
                listen_address: None,
                health: HealthConfig {
                    enabled: true,
                    listen: None,
                    path: "/health",
                },
            },
            gateway: GatewayConfig {
                enabled: true,
                protocols: ProtocolsConfig {
                    openai_chat: ProtocolEndpoint {
                        enabled: true,
                        path: "/v1/chat/completions",
                    },
                    openai_cli: ProtocolEndpoint {
                        enabled: false,
                        path: "/v1/responses",
                    },
                    claude_chat: ProtocolEndpoint {
                        enabled: true,
                        path: "/v1/messages",
                    },
                    claude_cli: ProtocolEndpoint {
                        enabled: false,
                        path: "/v1/messages/cli",
                    },
                    gemini_chat: ProtocolEndpoint {
                        enabled: false,
                        path: "/v1beta/models",
                    },
                    gemini_cli: ProtocolEndpoint {
                        enabled: false,
                        path: "/v1beta/cli",
                    },
                },
                endpoints: {},
            },
            telemetry: TelemetryConfig {
                service_name: None,
                resource_attributes: {},
                exporters: ExportersConfig {
                    otlp: OtlpExporterConfig {
                        enabled: false,
                        endpoint: Url {
                            scheme: "http",
                            cannot_be_a_base: false,
                            username: "",
                            password: None,
                            host: Some(
                                Domain(
                                    "localhost",
                                ),
                            ),
                            port: Some(
                                4317,
                            ),
                            path: "/",
                            query: None,
                            fragment: None,
                        },
                        protocol: Grpc,
                        timeout: 60s,
                        batch_export: BatchExportConfig {
                            scheduled_delay: 5s,
                            max_queue_size: 2048,
                            max_export_batch_size: 512,
                            max_concurrent_exports: 1,
                        },
                        grpc: None,
                        http: None,
                    },
                },
                tracing: TracingConfig {
                    sampling: 0.15,
                    parent_based_sampler: false,
                    collect: CollectConfig {
                        max_events_per_span: 128,
                        max_attributes_per_span: 128,
                        max_links_per_span: 128,
                        max_attributes_per_event: 128,
                        max_attributes_per_link: 128,
                    },
                    propagation: PropagationConfig {
                        trace_context: false,
                        aws_xray: false,
                    },
                    exporters: None,
                },
                metrics: MetricsConfig {
                    exporters: None,
                },
                logs: LogsConfig {
                    exporters: None,
                },
            },
        }
        "#);
    }
}
