//! Gateway endpoint configuration: which client-facing protocols are served,
//! and the per-endpoint upstream/conversion settings the registry's
//! compatibility gate and the dispatcher consume.
//!
//! Replaces the teacher's `llm.rs` provider/model catalogue with the closed
//! config-key set this gateway actually needs: an endpoint is a named
//! upstream plus the conversion policy for reaching it, not a catalogue of
//! individually priced models.

use std::time::Duration;

use duration_str::deserialize_duration;
use header_rules::HeaderRule;
use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use upstream::policy::StreamPolicy;

/// Top-level LLM gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Whether the gateway is served at all.
    pub enabled: bool,

    /// Which client-facing protocol endpoints are mounted, and under which
    /// paths.
    pub protocols: ProtocolsConfig,

    /// Named upstream endpoints, keyed by the name a model-routing decision
    /// (out of scope for this crate) would reference.
    pub endpoints: IndexMap<String, EndpointConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            protocols: ProtocolsConfig::default(),
            endpoints: IndexMap::new(),
        }
    }
}

/// Client-facing protocol surfaces this gateway can expose. Each is a thin
/// enable/path pair; the wire format itself is fixed by the format id, not
/// configurable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolsConfig {
    /// OpenAI Chat Completions-shaped endpoint.
    pub openai_chat: ProtocolEndpoint,
    /// OpenAI Responses-shaped endpoint.
    pub openai_cli: ProtocolEndpoint,
    /// Anthropic Messages-shaped endpoint.
    pub claude_chat: ProtocolEndpoint,
    /// Claude Code CLI-shaped endpoint.
    pub claude_cli: ProtocolEndpoint,
    /// Gemini generateContent-shaped endpoint.
    pub gemini_chat: ProtocolEndpoint,
    /// Gemini CLI-shaped endpoint.
    pub gemini_cli: ProtocolEndpoint,
}

impl Default for ProtocolsConfig {
    fn default() -> Self {
        Self {
            openai_chat: ProtocolEndpoint { enabled: true, path: "/v1/chat/completions".to_string() },
            openai_cli: ProtocolEndpoint { enabled: false, path: "/v1/responses".to_string() },
            claude_chat: ProtocolEndpoint { enabled: true, path: "/v1/messages".to_string() },
            claude_cli: ProtocolEndpoint { enabled: false, path: "/v1/messages/cli".to_string() },
            gemini_chat: ProtocolEndpoint { enabled: false, path: "/v1beta/models".to_string() },
            gemini_cli: ProtocolEndpoint { enabled: false, path: "/v1beta/cli".to_string() },
        }
    }
}

/// One client-facing protocol mount point.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolEndpoint {
    /// Whether this protocol surface is mounted.
    pub enabled: bool,
    /// Path it is served under.
    pub path: String,
}

impl Default for ProtocolEndpoint {
    fn default() -> Self {
        Self { enabled: false, path: String::new() }
    }
}

/// A format id this gateway understands, closed to the six the registry's
/// normalizers are registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatId {
    /// `openai:chat`
    OpenaiChat,
    /// `openai:cli`
    OpenaiCli,
    /// `claude:chat`
    ClaudeChat,
    /// `claude:cli`
    ClaudeCli,
    /// `gemini:chat`
    GeminiChat,
    /// `gemini:cli`
    GeminiCli,
}

impl FormatId {
    /// The registry/normalizer format id string this variant corresponds to.
    pub fn as_str(self) -> &'static str {
        match self {
            FormatId::OpenaiChat => "openai:chat",
            FormatId::OpenaiCli => "openai:cli",
            FormatId::ClaudeChat => "claude:chat",
            FormatId::ClaudeCli => "claude:cli",
            FormatId::GeminiChat => "gemini:chat",
            FormatId::GeminiCli => "gemini:cli",
        }
    }
}

/// One named upstream endpoint: where to send requests, and the conversion
/// policy the compatibility gate and dispatcher apply when routing traffic
/// to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointConfig {
    /// Whether this endpoint is eligible for routing at all.
    pub enabled: bool,

    /// The upstream's native wire format.
    pub format: FormatId,

    /// Base URL of the upstream API. Mutually exclusive with `proxy_node_id`
    /// in practice, though that invariant is enforced by the scheduler, not
    /// here.
    pub base_url: Option<url::Url>,

    /// API key presented to the upstream, if it authenticates that way.
    pub api_key: Option<SecretString>,

    /// Route through a tunnel-connected proxy node instead of a direct HTTP
    /// hop, when set.
    pub proxy_node_id: Option<String>,

    /// Synthetic variant suffix to register against (e.g. `"codex"` for
    /// `openai:cli#codex`), when the upstream needs normalizer behavior
    /// distinct from the bare format id.
    pub conversion_variant: Option<String>,

    /// Overrides the upstream hop's stream mode independent of what the
    /// client asked for.
    pub upstream_stream_policy: StreamPolicy,

    /// Whether the stream bridge may convert between streaming and
    /// non-streaming on this endpoint.
    pub stream_conversion: bool,

    /// If non-empty, only these format ids may route to this endpoint.
    pub accept_formats: Vec<String>,

    /// Format ids that are never allowed to route to this endpoint, checked
    /// before `accept_formats`.
    pub reject_formats: Vec<String>,

    /// Time to wait for the first byte of an upstream response before
    /// failing the request.
    #[serde(deserialize_with = "deserialize_duration", default = "default_stream_first_byte_timeout")]
    pub stream_first_byte_timeout: Duration,

    /// Overall request timeout.
    #[serde(deserialize_with = "deserialize_duration", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Header transformation rules applied when building the outbound
    /// request.
    pub headers: Vec<HeaderRule>,
}

fn default_stream_first_byte_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(600)
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: FormatId::OpenaiChat,
            base_url: None,
            api_key: None,
            proxy_node_id: None,
            conversion_variant: None,
            upstream_stream_policy: StreamPolicy::default(),
            stream_conversion: true,
            accept_formats: Vec::new(),
            reject_formats: Vec::new(),
            stream_first_byte_timeout: default_stream_first_byte_timeout(),
            request_timeout: default_request_timeout(),
            headers: Vec::new(),
        }
    }
}

impl EndpointConfig {
    /// The format id string this endpoint is registered against in the
    /// registry, including any synthetic variant suffix.
    pub fn format_id(&self) -> String {
        match &self.conversion_variant {
            Some(variant) => format!("{}#{variant}", self.format.as_str()),
            None => self.format.as_str().to_string(),
        }
    }

    /// Builds the compatibility gate's view of this endpoint's policy.
    pub fn policy(&self) -> registry::EndpointPolicy {
        registry::EndpointPolicy {
            enabled: self.enabled,
            stream_conversion: self.stream_conversion,
            accept_formats: self.accept_formats.clone(),
            reject_formats: self.reject_formats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::assert_debug_snapshot;

    use super::*;

    #[test]
    fn protocols_default_to_openai_and_claude_chat_only() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert!(config.protocols.openai_chat.enabled);
        assert!(config.protocols.claude_chat.enabled);
        assert!(!config.protocols.openai_cli.enabled);
        assert!(!config.protocols.gemini_chat.enabled);
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn endpoint_with_base_url_and_api_key() {
        let config: GatewayConfig = toml::from_str(indoc! {r#"
            enabled = true

            [endpoints.openai-main]
            format = "openai_chat"
            base_url = "https://api.openai.com/v1"
            api_key = "sk-test"
            accept_formats = ["openai:chat", "claude:chat"]
        "#})
        .unwrap();

        let endpoint = &config.endpoints["openai-main"];
        assert_eq!(endpoint.format_id(), "openai:chat");
        assert_eq!(endpoint.base_url.as_ref().unwrap().as_str(), "https://api.openai.com/v1");
        assert!(endpoint.accepts_policy_check());
    }

    #[test]
    fn conversion_variant_produces_synthetic_format_id() {
        let config: GatewayConfig = toml::from_str(indoc! {r#"
            [endpoints.codex]
            format = "openai_cli"
            conversion_variant = "codex"
            proxy_node_id = "node-1"
        "#})
        .unwrap();

        assert_eq!(config.endpoints["codex"].format_id(), "openai:cli#codex");
    }

    #[test]
    fn endpoint_defaults() {
        let config: EndpointConfig = toml::from_str("").unwrap();
        assert_debug_snapshot!(&config.upstream_stream_policy, @"Auto");
        assert!(config.stream_conversion);
        assert_eq!(config.stream_first_byte_timeout.as_secs(), 30);
        assert_eq!(config.request_timeout.as_secs(), 600);
    }

    impl EndpointConfig {
        fn accepts_policy_check(&self) -> bool {
            self.policy().accepts("openai:chat")
        }
    }
}
