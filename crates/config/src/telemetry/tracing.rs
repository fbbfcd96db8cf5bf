use serde::Deserialize;

use super::exporters::ExportersConfig;

/// Tracing-specific telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingConfig {
    /// Fraction of traces to sample, in `[0.0, 1.0]`.
    pub sampling: f64,

    /// Whether the sampler should respect a parent span's sampling
    /// decision instead of resampling independently.
    pub parent_based_sampler: bool,

    /// Span/event/link collection limits.
    pub collect: CollectConfig,

    /// Context propagation formats accepted on incoming requests.
    pub propagation: PropagationConfig,

    /// Tracing-specific exporter override; falls back to the global
    /// exporters configuration when unset.
    pub exporters: Option<ExportersConfig>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            sampling: 0.15,
            parent_based_sampler: false,
            collect: CollectConfig::default(),
            propagation: PropagationConfig::default(),
            exporters: None,
        }
    }
}

impl TracingConfig {
    /// Returns the tracing-specific exporters override, if set.
    pub fn exporters(&self) -> Option<&ExportersConfig> {
        self.exporters.as_ref()
    }
}

/// Limits on how much data a single span/event/link may carry, so a
/// misbehaving caller can't grow a trace unbounded.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectConfig {
    /// Maximum events recorded per span.
    pub max_events_per_span: u32,
    /// Maximum attributes recorded per span.
    pub max_attributes_per_span: u32,
    /// Maximum links recorded per span.
    pub max_links_per_span: u32,
    /// Maximum attributes recorded per event.
    pub max_attributes_per_event: u32,
    /// Maximum attributes recorded per link.
    pub max_attributes_per_link: u32,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_events_per_span: 128,
            max_attributes_per_span: 128,
            max_links_per_span: 128,
            max_attributes_per_event: 128,
            max_attributes_per_link: 128,
        }
    }
}

/// Which trace context propagation formats are accepted on incoming
/// requests.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PropagationConfig {
    /// W3C `traceparent`/`tracestate` headers.
    pub trace_context: bool,
    /// AWS X-Ray propagation header.
    pub aws_xray: bool,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn defaults() {
        let config: TracingConfig = toml::from_str("").unwrap();
        assert_eq!(config.sampling, 0.15);
        assert!(!config.parent_based_sampler);
        assert!(config.exporters().is_none());
    }

    #[test]
    fn overrides() {
        let config: TracingConfig = toml::from_str(indoc! {r#"
            sampling = 1.0
            parent_based_sampler = true

            [propagation]
            trace_context = true

            [exporters.otlp]
            enabled = true
        "#})
        .unwrap();

        assert_eq!(config.sampling, 1.0);
        assert!(config.propagation.trace_context);
        assert!(config.exporters().is_some());
    }
}
