//! Trait seams for the external collaborators named in §6.4. Only their
//! contracts are in scope here — resolver matching rules, the scheduler's
//! key-ranking algorithm, and the auth service's token exchange are all
//! implemented elsewhere and injected into the dispatcher.

use async_trait::async_trait;
use header_rules::HeaderRule;

use crate::error::UpstreamResult;

/// What the model resolver returns for one `(model_name, provider_id)`
/// lookup: the provider-specific model name to send upstream, in place of
/// whatever the client asked for.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub mapped_model: String,
}

pub trait ModelResolver: Send + Sync {
    fn resolve(&self, model_name: &str, provider_id: &str) -> ResolvedModel;
}

#[derive(Debug, Clone)]
pub struct AuthCredentials {
    pub header: String,
    pub value: String,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn get_auth(&self, endpoint: &str, key: &str, force_refresh: bool) -> UpstreamResult<AuthCredentials>;

    /// True for OAuth-backed keys, which get the one-shot 401 force-refresh
    /// retry; false (e.g. static API keys) skip straight to failing the
    /// attempt.
    fn is_oauth(&self, key: &str) -> bool;
}

/// Provider-specific request/response wrapping (`envelope.wrap_request` /
/// `unwrap_response` / `extra_headers`), e.g. Antigravity- or Kiro-style
/// bodies that nest the actual payload one level deeper.
pub trait ProviderEnvelope: Send + Sync {
    fn wrap_request(&self, body: serde_json::Value, url_model: &str) -> serde_json::Value {
        let _ = url_model;
        body
    }

    fn unwrap_response(&self, body: serde_json::Value) -> serde_json::Value {
        body
    }

    fn extra_headers(&self) -> Vec<HeaderRule> {
        Vec::new()
    }

    /// Some providers force their own stream/non-stream rewrite
    /// independent of the endpoint's configured policy.
    fn force_stream_rewrite(&self) -> Option<bool> {
        None
    }
}

/// No-op envelope for providers that don't need one.
pub struct IdentityEnvelope;

impl ProviderEnvelope for IdentityEnvelope {}

pub trait UrlBuilder: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn build_url(
        &self,
        endpoint: &str,
        model: &str,
        query_params: &[(String, String)],
        path_params: &[(String, String)],
        is_stream: bool,
    ) -> String;
}
