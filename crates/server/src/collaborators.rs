//! Concrete implementations of the `upstream` crate's collaborator seams
//! (`§6.4`), wired from one `config::EndpointConfig`. Model-name remapping
//! tables and a real OAuth token-exchange service are external collaborators
//! this gateway doesn't own, so the resolver is a passthrough and the auth
//! provider serves the endpoint's static configured key — both are
//! deliberately the simplest implementation that satisfies the trait.

use async_trait::async_trait;
use config::EndpointConfig;
use header_rules::HeaderRule;
use secrecy::ExposeSecret;
use upstream::{AuthCredentials, AuthProvider, ModelResolver, ProviderEnvelope, ResolvedModel, UpstreamError, UpstreamResult, UrlBuilder};

/// Returns the requested model unchanged; no per-provider model-name
/// remapping table exists in this gateway's configuration surface.
pub struct PassthroughResolver;

impl ModelResolver for PassthroughResolver {
    fn resolve(&self, model_name: &str, _provider_id: &str) -> ResolvedModel {
        ResolvedModel {
            mapped_model: model_name.to_string(),
        }
    }
}

/// Serves the endpoint's static `api_key` as a bearer token. Never reports
/// itself as OAuth-backed, so the dispatcher's 401 force-refresh retry is
/// never attempted against a static key.
pub struct StaticKeyAuth {
    pub api_key: Option<secrecy::SecretString>,
}

#[async_trait]
impl AuthProvider for StaticKeyAuth {
    async fn get_auth(&self, _endpoint: &str, _key: &str, _force_refresh: bool) -> UpstreamResult<AuthCredentials> {
        let Some(api_key) = &self.api_key else {
            return Err(UpstreamError::Connection("endpoint has no api_key configured".to_string()));
        };

        Ok(AuthCredentials {
            header: "authorization".to_string(),
            value: format!("Bearer {}", api_key.expose_secret()),
        })
    }

    fn is_oauth(&self, _key: &str) -> bool {
        false
    }
}

/// Builds the outbound URL from the endpoint's configured `base_url`
/// unchanged; query/path parameter substitution and streaming-path selection
/// (e.g. Gemini's `streamGenerateContent` suffix) are provider-specific
/// concerns this gateway's closed format set doesn't need yet.
pub struct DirectUrlBuilder;

impl UrlBuilder for DirectUrlBuilder {
    fn build_url(&self, endpoint: &str, _model: &str, _query_params: &[(String, String)], _path_params: &[(String, String)], _is_stream: bool) -> String {
        endpoint.to_string()
    }
}

/// Applies the endpoint's configured header rules as extra headers; no
/// request/response body wrapping or forced stream rewrite, since none of
/// this gateway's six formats need the Antigravity/Kiro-style envelope.
pub struct EndpointEnvelope {
    pub header_rules: Vec<HeaderRule>,
}

impl ProviderEnvelope for EndpointEnvelope {
    fn extra_headers(&self) -> Vec<HeaderRule> {
        self.header_rules.clone()
    }
}

pub fn auth_for(endpoint: &EndpointConfig) -> StaticKeyAuth {
    StaticKeyAuth {
        api_key: endpoint.api_key.clone(),
    }
}

pub fn envelope_for(endpoint: &EndpointConfig) -> EndpointEnvelope {
    EndpointEnvelope {
        header_rules: endpoint.headers.clone(),
    }
}
