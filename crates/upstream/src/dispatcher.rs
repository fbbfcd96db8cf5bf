use std::time::Duration;

use ir::StreamState;
use registry::ConversionRegistry;
use serde_json::Value;
use stream_bridge::{Expander, ExpanderOptions};

use crate::{
    collaborators::{AuthProvider, ModelResolver, ProviderEnvelope, UrlBuilder},
    error::{UpstreamError, UpstreamResult},
    policy::{BodyStreamField, StreamPolicy, rewrite_stream_field},
    sse::SseReader,
};

/// Everything the dispatcher needs to drive one attempt against a single
/// `(provider, endpoint, key)` triple (§4.4). Built fresh per attempt by
/// the scheduler's `request_func` caller; nothing here outlives one
/// attempt.
pub struct DispatchRequest<'a> {
    pub provider_id: &'a str,
    pub endpoint_url: &'a str,
    pub key: &'a str,
    pub client_format: &'a str,
    pub endpoint_format: &'a str,
    pub requested_model: &'a str,
    pub conversion_variant: Option<&'a str>,
    pub client_is_stream: bool,
    pub stream_policy: StreamPolicy,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

pub struct Dispatcher<'a> {
    pub registry: &'a ConversionRegistry,
    pub http_client: &'a reqwest::Client,
    pub resolver: &'a dyn ModelResolver,
    pub auth: &'a dyn AuthProvider,
    pub envelope: &'a dyn ProviderEnvelope,
    pub url_builder: &'a dyn UrlBuilder,
}

/// Outcome of the synchronous path (§4.4 step 10): either the full response
/// body already in the client's format, or — when the client actually
/// wanted a stream but the upstream hop was forced non-stream — the same
/// response expanded into a rendered SSE body.
pub enum SyncOutcome {
    Body(Value),
    ExpandedSse(Vec<u8>),
}

impl Dispatcher<'_> {
    /// Steps 1-9 of §4.4: resolve the mapped model, convert or pass through
    /// the request body, enforce the upstream stream mode, and build the
    /// outbound `reqwest::Request`.
    pub async fn build_request(&self, dispatch: &DispatchRequest<'_>, body: Value) -> UpstreamResult<reqwest::Request> {
        let resolved = self.resolver.resolve(dispatch.requested_model, dispatch.provider_id);

        let mut body = self.registry.convert_request(
            set_model(body, &resolved.mapped_model),
            dispatch.client_format,
            dispatch.endpoint_format,
            dispatch.conversion_variant,
        )?;

        let upstream_is_stream = self
            .envelope
            .force_stream_rewrite()
            .unwrap_or_else(|| dispatch.stream_policy.resolve(dispatch.client_is_stream));

        rewrite_stream_field(
            &mut body,
            BodyStreamField::for_format(dispatch.endpoint_format),
            upstream_is_stream,
        );

        let body = self.envelope.wrap_request(body, &resolved.mapped_model);

        let credentials = self.auth.get_auth(dispatch.endpoint_url, dispatch.key, false).await?;
        let url = self
            .url_builder
            .build_url(dispatch.endpoint_url, &resolved.mapped_model, &[], &[], upstream_is_stream);

        let mut request_headers = reqwest::header::HeaderMap::new();
        request_headers.insert(
            reqwest::header::HeaderName::from_bytes(credentials.header.as_bytes())
                .map_err(|e| UpstreamError::Connection(e.to_string()))?,
            reqwest::header::HeaderValue::from_str(&credentials.value).map_err(|e| UpstreamError::Connection(e.to_string()))?,
        );
        header_rules::apply_rules(&self.envelope.extra_headers(), &mut request_headers, None);

        self.http_client
            .post(url)
            .headers(request_headers)
            .json(&body)
            .timeout(dispatch.request_timeout)
            .build()
            .map_err(|e| UpstreamError::Connection(e.to_string()))
    }

    /// Synchronous path (§4.4 step 10). Retries once on 401 for OAuth keys.
    pub async fn dispatch_sync(
        &self,
        dispatch: &DispatchRequest<'_>,
        request: reqwest::Request,
    ) -> UpstreamResult<SyncOutcome> {
        crate::metrics::record_dispatch(dispatch.provider_id, dispatch.client_is_stream, || {
            self.dispatch_sync_inner(dispatch, request)
        })
        .await
    }

    async fn dispatch_sync_inner(&self, dispatch: &DispatchRequest<'_>, request: reqwest::Request) -> UpstreamResult<SyncOutcome> {
        let response = self.send_with_oauth_retry(dispatch, request).await?;
        let status = response.status();

        if !status.is_success() {
            let upstream_response = response.text().await.unwrap_or_default();
            return Err(UpstreamError::HttpStatus {
                status: status.as_u16(),
                upstream_response: UpstreamError::truncate_upstream_body(&upstream_response),
            });
        }

        let body: Value = response.json().await.map_err(|e| UpstreamError::Connection(e.to_string()))?;
        let body = self.envelope.unwrap_response(body);

        let source_normalizer = self
            .registry
            .get(dispatch.endpoint_format)
            .ok_or_else(|| registry::RegistryError::UnknownFormat(dispatch.endpoint_format.to_string()))?;

        if source_normalizer.is_error_response(&body) {
            return Err(UpstreamError::EmbeddedError {
                upstream_response: UpstreamError::truncate_upstream_body(&body.to_string()),
            });
        }

        let converted = self.registry.convert_response(
            body,
            dispatch.endpoint_format,
            dispatch.client_format,
            Some(dispatch.requested_model),
        )?;

        if !dispatch.client_is_stream {
            return Ok(SyncOutcome::Body(converted));
        }

        // Sync→stream bridge: the client wanted a stream but the upstream
        // hop was forced non-stream. Re-expand the already-converted
        // response as a synthetic event sequence rendered through the
        // client's own format.
        let target_normalizer = self
            .registry
            .get(dispatch.client_format)
            .ok_or_else(|| registry::RegistryError::UnknownFormat(dispatch.client_format.to_string()))?;
        let internal = target_normalizer.response_to_internal(converted)?;

        let mut state = StreamState::new(internal.id.clone(), internal.model.clone());
        let mut out = Vec::new();
        for event in Expander::new(&internal, ExpanderOptions::default()) {
            for chunk in target_normalizer.stream_event_from_internal(&event, &mut state)? {
                out.extend_from_slice(format!("data: {chunk}\n\n").as_bytes());
            }
        }
        if dispatch.client_format == "openai:chat" {
            out.extend_from_slice(b"data: [DONE]\n\n");
        }

        Ok(SyncOutcome::ExpandedSse(out))
    }

    /// Streaming path (§4.4 step 11). Renders each converted chunk as SSE
    /// bytes for the caller to forward; flushes on normal or abnormal
    /// termination so trailing usage events aren't lost.
    pub async fn dispatch_stream<S, B, E>(
        &self,
        dispatch: &DispatchRequest<'_>,
        response_stream: S,
        on_chunk: &mut dyn FnMut(Vec<u8>),
    ) -> UpstreamResult<()>
    where
        S: futures::Stream<Item = Result<B, E>> + Send + 'static,
        B: bytes::Buf,
        E: std::error::Error + Send + Sync + 'static,
    {
        crate::metrics::record_dispatch(dispatch.provider_id, true, || {
            self.dispatch_stream_inner(dispatch, response_stream, on_chunk)
        })
        .await
    }

    async fn dispatch_stream_inner<S, B, E>(
        &self,
        dispatch: &DispatchRequest<'_>,
        response_stream: S,
        on_chunk: &mut dyn FnMut(Vec<u8>),
    ) -> UpstreamResult<()>
    where
        S: futures::Stream<Item = Result<B, E>> + Send + 'static,
        B: bytes::Buf,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut reader = SseReader::new(response_stream);
        let mut state = StreamState::new(String::new(), dispatch.requested_model.to_string());

        loop {
            let record = match reader.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(err @ UpstreamError::EmptyStream) => {
                    let error = ir::InternalError::server_error("empty stream: no data received");
                    if let Some(target) = self.registry.get(dispatch.client_format) {
                        let rendered = target.error_from_internal(&error)?;
                        on_chunk(format!("data: {rendered}\n\n").into_bytes());
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            };

            let chunk: Value = match serde_json::from_str(&record.data) {
                Ok(value) => value,
                Err(_) if record.data == "[DONE]" => {
                    if dispatch.client_format == "openai:chat" {
                        on_chunk(b"data: [DONE]\n\n".to_vec());
                    }
                    continue;
                }
                Err(_) => continue,
            };

            let rendered = self
                .registry
                .convert_stream_chunk(chunk, dispatch.endpoint_format, dispatch.client_format, &mut state)?;
            for wire_chunk in rendered {
                on_chunk(format!("data: {wire_chunk}\n\n").into_bytes());
            }
        }

        if dispatch.client_format == "openai:chat" {
            on_chunk(b"data: [DONE]\n\n".to_vec());
        }

        Ok(())
    }

    async fn send_with_oauth_retry(
        &self,
        dispatch: &DispatchRequest<'_>,
        request: reqwest::Request,
    ) -> UpstreamResult<reqwest::Response> {
        let retry_request = request.try_clone();

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| if e.is_timeout() { UpstreamError::Timeout } else { UpstreamError::Connection(e.to_string()) })?;

        if response.status() != reqwest::StatusCode::UNAUTHORIZED || !self.auth.is_oauth(dispatch.key) {
            return Ok(response);
        }

        let Some(mut retry_request) = retry_request else {
            return Ok(response);
        };

        let credentials = self.auth.get_auth(dispatch.endpoint_url, dispatch.key, true).await?;
        let header_name = reqwest::header::HeaderName::from_bytes(credentials.header.as_bytes())
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;
        let header_value =
            reqwest::header::HeaderValue::from_str(&credentials.value).map_err(|e| UpstreamError::Connection(e.to_string()))?;
        retry_request.headers_mut().insert(header_name, header_value);

        let retried = self
            .http_client
            .execute(retry_request)
            .await
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;

        if retried.status() == reqwest::StatusCode::UNAUTHORIZED {
            let upstream_response = retried.text().await.unwrap_or_default();
            return Err(UpstreamError::AuthRetryExhausted {
                upstream_response: UpstreamError::truncate_upstream_body(&upstream_response),
            });
        }

        Ok(retried)
    }
}

fn set_model(mut body: Value, mapped_model: &str) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert("model".to_string(), Value::String(mapped_model.to_string()));
    }
    body
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    struct PassthroughResolver;
    impl ModelResolver for PassthroughResolver {
        fn resolve(&self, model_name: &str, _provider_id: &str) -> ResolvedModel {
            crate::collaborators::ResolvedModel {
                mapped_model: model_name.to_string(),
            }
        }
    }

    struct StaticAuth {
        fail_until_refresh: bool,
    }

    #[async_trait]
    impl AuthProvider for StaticAuth {
        async fn get_auth(&self, _endpoint: &str, _key: &str, force_refresh: bool) -> UpstreamResult<crate::collaborators::AuthCredentials> {
            let value = if self.fail_until_refresh && !force_refresh {
                "stale-token".to_string()
            } else {
                "fresh-token".to_string()
            };
            Ok(crate::collaborators::AuthCredentials {
                header: "authorization".to_string(),
                value: format!("Bearer {value}"),
            })
        }

        fn is_oauth(&self, _key: &str) -> bool {
            true
        }
    }

    struct DirectUrl;
    impl UrlBuilder for DirectUrl {
        fn build_url(&self, endpoint: &str, _model: &str, _q: &[(String, String)], _p: &[(String, String)], _stream: bool) -> String {
            endpoint.to_string()
        }
    }

    fn dispatcher<'a>(registry: &'a ConversionRegistry, client: &'a reqwest::Client, resolver: &'a dyn ModelResolver, auth: &'a dyn AuthProvider) -> Dispatcher<'a> {
        Dispatcher {
            registry,
            http_client: client,
            resolver,
            auth,
            envelope: &crate::collaborators::IdentityEnvelope,
            url_builder: &DirectUrl,
        }
    }

    #[tokio::test]
    async fn build_request_enforces_force_non_stream_policy() {
        let registry = ConversionRegistry::with_default_normalizers();
        let client = reqwest::Client::new();
        let resolver = PassthroughResolver;
        let auth = StaticAuth { fail_until_refresh: false };
        let d = dispatcher(&registry, &client, &resolver, &auth);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let dispatch = DispatchRequest {
            provider_id: "anthropic",
            endpoint_url: &format!("{}/v1/messages", server.uri()),
            key: "sk-test",
            client_format: "claude:chat",
            endpoint_format: "claude:chat",
            requested_model: "claude-3-opus",
            conversion_variant: None,
            client_is_stream: true,
            stream_policy: StreamPolicy::ForceNonStream,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        };

        let body = json!({"model": "claude-3-opus", "stream": true, "messages": []});
        let request = d.build_request(&dispatch, body).await.unwrap();

        let sent_body: Value = serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(sent_body["stream"], false);
    }

    #[tokio::test]
    async fn oauth_401_triggers_single_force_refresh_retry() {
        let registry = ConversionRegistry::with_default_normalizers();
        let client = reqwest::Client::new();
        let resolver = PassthroughResolver;
        let auth = StaticAuth { fail_until_refresh: true };
        let d = dispatcher(&registry, &client, &resolver, &auth);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(wiremock::matchers::header("authorization", "Bearer stale-token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(wiremock::matchers::header("authorization", "Bearer fresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "model": "claude-3-opus",
                "content": [{"type": "text", "text": "hi"}],
                "usage": {"input_tokens": 1, "output_tokens": 1},
            })))
            .mount(&server)
            .await;

        let dispatch = DispatchRequest {
            provider_id: "anthropic",
            endpoint_url: &format!("{}/v1/messages", server.uri()),
            key: "sk-test",
            client_format: "claude:chat",
            endpoint_format: "claude:chat",
            requested_model: "claude-3-opus",
            conversion_variant: None,
            client_is_stream: false,
            stream_policy: StreamPolicy::Auto,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        };

        let body = json!({"model": "claude-3-opus", "messages": []});
        let request = d.build_request(&dispatch, body).await.unwrap();
        let outcome = d.dispatch_sync(&dispatch, request).await.unwrap();

        match outcome {
            SyncOutcome::Body(body) => assert_eq!(body["model"], "claude-3-opus"),
            SyncOutcome::ExpandedSse(_) => panic!("expected a direct body, not an expanded stream"),
        }
    }
}
