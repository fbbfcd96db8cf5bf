use serde::Deserialize;

use super::exporters::ExportersConfig;

/// Metrics-specific telemetry configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Metrics-specific exporter override; falls back to the global
    /// exporters configuration when unset.
    pub exporters: Option<ExportersConfig>,
}

impl MetricsConfig {
    /// Returns the metrics-specific exporters override, if set.
    pub fn exporters(&self) -> Option<&ExportersConfig> {
        self.exporters.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn defaults_to_no_override() {
        let config: MetricsConfig = toml::from_str("").unwrap();
        assert!(config.exporters().is_none());
    }

    #[test]
    fn override_is_picked_up() {
        let config: MetricsConfig = toml::from_str(indoc! {r#"
            [exporters.otlp]
            enabled = true
        "#})
        .unwrap();

        assert!(config.exporters().unwrap().otlp.enabled);
    }
}
