//! Minimal candidate scheduler: iterates the configured endpoints that
//! accept the inbound client format and are enabled, trying each in
//! configuration order until one succeeds (spec §6.4's "Scheduler /
//! FailoverEngine" collaborator, reduced to in-order iteration — key
//! ranking, capability matching, and preferred-key ordering are a policy
//! store this gateway doesn't have).

use std::time::Duration;

use config::EndpointConfig;
use serde_json::Value;
use upstream::{DispatchRequest, Dispatcher, SyncOutcome, UpstreamError, UpstreamResult};

use crate::{
    collaborators::{DirectUrlBuilder, PassthroughResolver, auth_for, envelope_for},
    state::AppState,
};

/// One endpoint config plus its name, as iterated from `gateway.endpoints`.
pub struct Candidate<'a> {
    pub name: &'a str,
    pub endpoint: &'a EndpointConfig,
}

/// Endpoints enabled and whose policy accepts `client_format`, in
/// configuration (insertion) order.
pub fn candidates<'a>(state: &'a AppState, client_format: &str) -> Vec<Candidate<'a>> {
    state
        .config
        .gateway
        .endpoints
        .iter()
        .filter(|(_, endpoint)| endpoint.enabled && endpoint.policy().accepts(client_format))
        .map(|(name, endpoint)| Candidate { name, endpoint })
        .collect()
}

/// Builds and dispatches one synchronous request attempt against `candidate`,
/// returning the client-format response body.
pub async fn dispatch_sync(state: &AppState, candidate: &Candidate<'_>, client_format: &str, requested_model: &str, body: Value) -> UpstreamResult<Value> {
    let endpoint = candidate.endpoint;
    let auth = auth_for(endpoint);
    let resolver = PassthroughResolver;
    let url_builder = DirectUrlBuilder;
    let envelope = envelope_for(endpoint);

    let dispatcher = Dispatcher {
        registry: state.registry,
        http_client: &state.http_client,
        resolver: &resolver,
        auth: &auth,
        envelope: &envelope,
        url_builder: &url_builder,
    };

    let Some(base_url) = &endpoint.base_url else {
        return Err(UpstreamError::Connection(format!("endpoint {} has no base_url configured", candidate.name)));
    };

    let dispatch = DispatchRequest {
        provider_id: candidate.name,
        endpoint_url: base_url.as_str(),
        key: candidate.name,
        client_format,
        endpoint_format: endpoint.format.as_str(),
        requested_model,
        conversion_variant: endpoint.conversion_variant.as_deref(),
        client_is_stream: false,
        stream_policy: endpoint.upstream_stream_policy,
        connect_timeout: Duration::from_secs(10),
        request_timeout: endpoint.request_timeout,
    };

    let request = dispatcher.build_request(&dispatch, body).await?;
    match dispatcher.dispatch_sync(&dispatch, request).await? {
        SyncOutcome::Body(body) => Ok(body),
        SyncOutcome::ExpandedSse(_) => unreachable!("client_is_stream is false, sync path never expands to SSE"),
    }
}

/// Dispatches one streaming request attempt, forwarding each rendered SSE
/// chunk to `on_chunk` as it arrives.
pub async fn dispatch_stream(
    state: &AppState,
    candidate: &Candidate<'_>,
    client_format: &str,
    requested_model: &str,
    body: Value,
    on_chunk: &mut dyn FnMut(Vec<u8>),
) -> UpstreamResult<()> {
    let endpoint = candidate.endpoint;
    let auth = auth_for(endpoint);
    let resolver = PassthroughResolver;
    let url_builder = DirectUrlBuilder;
    let envelope = envelope_for(endpoint);

    let dispatcher = Dispatcher {
        registry: state.registry,
        http_client: &state.http_client,
        resolver: &resolver,
        auth: &auth,
        envelope: &envelope,
        url_builder: &url_builder,
    };

    let Some(base_url) = &endpoint.base_url else {
        return Err(UpstreamError::Connection(format!("endpoint {} has no base_url configured", candidate.name)));
    };

    let dispatch = DispatchRequest {
        provider_id: candidate.name,
        endpoint_url: base_url.as_str(),
        key: candidate.name,
        client_format,
        endpoint_format: endpoint.format.as_str(),
        requested_model,
        conversion_variant: endpoint.conversion_variant.as_deref(),
        client_is_stream: true,
        stream_policy: endpoint.upstream_stream_policy,
        connect_timeout: Duration::from_secs(10),
        request_timeout: endpoint.stream_first_byte_timeout,
    };

    let request = dispatcher.build_request(&dispatch, body).await?;
    let response = state
        .http_client
        .execute(request)
        .await
        .map_err(|e| UpstreamError::Connection(e.to_string()))?;

    let stream = response.bytes_stream();
    dispatcher.dispatch_stream(&dispatch, stream, on_chunk).await
}
