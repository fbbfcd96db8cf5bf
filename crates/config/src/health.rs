use std::net::SocketAddr;

use serde::Deserialize;

/// Health-check endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the health endpoint is served at all.
    pub enabled: bool,

    /// Listen on a separate address from the main server, if set.
    pub listen: Option<SocketAddr>,

    /// Path the health endpoint is served under.
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: None,
            path: "/health".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn defaults() {
        let config: HealthConfig = toml::from_str("").unwrap();
        assert!(config.enabled);
        assert_eq!(config.path, "/health");
        assert_eq!(config.listen, None);
    }

    #[test]
    fn overrides() {
        let config: HealthConfig = toml::from_str(indoc! {r#"
            enabled = false
            listen = "127.0.0.1:9090"
            path = "/healthz"
        "#})
        .unwrap();

        assert!(!config.enabled);
        assert_eq!(config.path, "/healthz");
        assert_eq!(config.listen, Some("127.0.0.1:9090".parse().unwrap()));
    }
}
