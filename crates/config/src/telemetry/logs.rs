use serde::Deserialize;

use super::exporters::ExportersConfig;

/// Logs-specific telemetry configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LogsConfig {
    /// Logs-specific exporter override; falls back to the global
    /// exporters configuration when unset.
    pub exporters: Option<ExportersConfig>,
}

impl LogsConfig {
    /// Returns the logs-specific exporters override, if set.
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
        let config: LogsConfig = toml::from_str("").unwrap();
        assert!(config.exporters().is_none());
    }

    #[test]
    fn override_is_picked_up() {
        let config: LogsConfig = toml::from_str(indoc! {r#"
            [exporters.otlp]
            enabled = true
        "#})
        .unwrap();

        assert!(config.exporters().unwrap().otlp.enabled);
    }
}
