//! HTTP server configuration settings.
//!
//! Inbound authentication, CORS/CSRF, rate limiting and TLS termination are
//! external collaborators the gateway consumes contracts from rather than
//! configuring directly, so this is intentionally thin compared to what a
//! public-facing HTTP server would carry.

use std::net::SocketAddr;

use serde::Deserialize;

use crate::HealthConfig;

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// Health endpoint configuration.
    pub health: HealthConfig,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::assert_debug_snapshot;

    use super::*;

    #[test]
    fn defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_debug_snapshot!(&config, @r#"
        ServerConfig {
            listen_address: None,
            health: HealthConfig {
                enabled: true,
                listen: None,
                path: "/health",
            },
        }
        "#);
    }

    #[test]
    fn listen_address_override() {
        let config: ServerConfig = toml::from_str(indoc! {r#"
            listen_address = "0.0.0.0:8080"
        "#})
        .unwrap();

        assert_eq!(config.listen_address, Some("0.0.0.0:8080".parse().unwrap()));
    }

    #[test]
    fn unknown_field_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str(indoc! {r#"
            cors = { allow_origins = ["*"] }
        "#});
        assert!(result.is_err());
    }
}
