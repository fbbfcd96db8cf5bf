use std::collections::BTreeMap;

use serde::Deserialize;

pub mod exporters;
pub mod logs;
pub mod metrics;
pub mod tracing;

pub use self::exporters::{ExportersConfig, OtlpProtocol};
pub use self::logs::LogsConfig;
pub use self::metrics::MetricsConfig;
pub use self::tracing::TracingConfig;

/// Telemetry configuration for observability.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name for telemetry identification.
    service_name: Option<String>,

    /// Custom resource attributes to attach to all telemetry.
    #[serde(default)]
    resource_attributes: BTreeMap<String, String>,

    /// Global exporters configuration (required, will always have a value).
    #[serde(default)]
    exporters: ExportersConfig,

    /// Tracing-specific configuration.
    #[serde(default)]
    tracing: TracingConfig,

    /// Metrics-specific configuration.
    #[serde(default)]
    metrics: MetricsConfig,

    /// Logs-specific configuration.
    #[serde(default)]
    logs: LogsConfig,
}

impl TelemetryConfig {
    /// Get the service name.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Get the resource attributes.
    pub fn resource_attributes(&self) -> &BTreeMap<String, String> {
        &self.resource_attributes
    }

    /// Get the global exporters configuration.
    pub fn global_exporters(&self) -> &ExportersConfig {
        &self.exporters
    }

    /// Get the tracing configuration.
    pub fn tracing(&self) -> &TracingConfig {
        &self.tracing
    }

    /// Check if tracing is effectively enabled: an OTLP exporter is
    /// configured for traces, specifically or via the global fallback.
    pub fn tracing_enabled(&self) -> bool {
        if let Some(trace_exporters) = self.tracing.exporters() {
            trace_exporters.otlp.enabled
        } else {
            self.exporters.otlp.enabled
        }
    }

    /// Get the logs configuration.
    pub fn logs(&self) -> &LogsConfig {
        &self.logs
    }

    /// Check if logs export is effectively enabled.
    pub fn logs_enabled(&self) -> bool {
        if let Some(logs_exporters) = self.logs.exporters() {
            logs_exporters.otlp.enabled
        } else {
            self.exporters.otlp.enabled
        }
    }

    /// Get the effective OTLP configuration for metrics: metrics-specific
    /// if set and enabled, otherwise the global configuration.
    pub fn metrics_otlp_config(&self) -> Option<&exporters::OtlpExporterConfig> {
        if let Some(metrics_exporters) = self.metrics.exporters()
            && metrics_exporters.otlp.enabled
        {
            return Some(&metrics_exporters.otlp);
        }

        self.exporters.otlp.enabled.then_some(&self.exporters.otlp)
    }

    /// Get the effective OTLP configuration for traces: trace-specific if
    /// set and enabled, otherwise the global configuration.
    pub fn traces_otlp_config(&self) -> Option<&exporters::OtlpExporterConfig> {
        if let Some(traces_exporters) = self.tracing.exporters()
            && traces_exporters.otlp.enabled
        {
            return Some(&traces_exporters.otlp);
        }

        self.exporters.otlp.enabled.then_some(&self.exporters.otlp)
    }

    /// Get the effective OTLP configuration for logs: logs-specific if set
    /// and enabled, otherwise the global configuration.
    pub fn logs_otlp_config(&self) -> Option<&exporters::OtlpExporterConfig> {
        if let Some(logs_exporters) = self.logs.exporters()
            && logs_exporters.otlp.enabled
        {
            return Some(&logs_exporters.otlp);
        }

        self.exporters.otlp.enabled.then_some(&self.exporters.otlp)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn defaults() {
        let config: TelemetryConfig = toml::from_str("").unwrap();
        assert!(!config.tracing_enabled());
        assert!(!config.logs_enabled());
        assert_eq!(config.service_name(), None);
    }

    #[test]
    fn service_name_and_attributes() {
        let config: TelemetryConfig = toml::from_str(indoc! {r#"
            service_name = "gatewayd"

            [resource_attributes]
            environment = "production"
        "#})
        .unwrap();

        assert_eq!(config.service_name(), Some("gatewayd"));
        assert_eq!(config.resource_attributes().get("environment").map(String::as_str), Some("production"));
    }

    #[test]
    fn trace_specific_exporter_overrides_global() {
        let config: TelemetryConfig = toml::from_str(indoc! {r#"
            [exporters.otlp]
            enabled = false

            [tracing.exporters.otlp]
            enabled = true
            endpoint = "http://collector:4317"
        "#})
        .unwrap();

        assert!(config.tracing_enabled());
        assert_eq!(config.traces_otlp_config().unwrap().endpoint.as_str(), "http://collector:4317/");
    }

    #[test]
    fn falls_back_to_global_exporter_when_no_override() {
        let config: TelemetryConfig = toml::from_str(indoc! {r#"
            [exporters.otlp]
            enabled = true
        "#})
        .unwrap();

        assert!(config.logs_enabled());
        assert!(config.metrics_otlp_config().is_some());
    }
}
