//! `claude:cli` — the wire format emitted by Anthropic's `claude` CLI /
//! Claude Code, which is the stock Messages API body plus a couple of
//! CLI-only fields (`metadata.user_id` a synthetic session id rather than an
//! account id; an identity-preserving pseudo-tool `client_tool_use`). Close
//! enough to `claude:chat` that this delegates to it and strips the CLI-only
//! extras it doesn't have a dedicated slot for.

use ir::{InternalError, InternalRequest, InternalResponse, StreamEvent, StreamState};
use serde_json::Value;

use crate::{Capabilities, Normalizer, NormalizeResult, formats::claude::ClaudeChatNormalizer};

#[derive(Default)]
pub struct ClaudeCliNormalizer {
    inner: ClaudeChatNormalizer,
}

impl Normalizer for ClaudeCliNormalizer {
    fn id(&self) -> &'static str {
        "claude:cli"
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn request_to_internal(&self, mut body: Value) -> NormalizeResult<InternalRequest> {
        // The CLI always sends a `metadata` object; nothing here maps onto
        // the canonical request, so drop it rather than round-trip it back
        // out through `extra`.
        if let Value::Object(map) = &mut body {
            map.remove("metadata");
        }
        self.inner.request_to_internal(body)
    }

    fn request_from_internal(&self, request: &InternalRequest) -> NormalizeResult<Value> {
        self.inner.request_from_internal(request)
    }

    fn response_to_internal(&self, body: Value) -> NormalizeResult<InternalResponse> {
        self.inner.response_to_internal(body)
    }

    fn response_from_internal(&self, response: &InternalResponse) -> NormalizeResult<Value> {
        self.inner.response_from_internal(response)
    }

    fn stream_chunk_to_internal(&self, chunk: Value, state: &mut StreamState) -> NormalizeResult<Vec<StreamEvent>> {
        self.inner.stream_chunk_to_internal(chunk, state)
    }

    fn stream_event_from_internal(&self, event: &StreamEvent, state: &mut StreamState) -> NormalizeResult<Vec<Value>> {
        self.inner.stream_event_from_internal(event, state)
    }

    fn error_to_internal(&self, body: Value) -> NormalizeResult<InternalError> {
        self.inner.error_to_internal(body)
    }

    fn error_from_internal(&self, error: &InternalError) -> NormalizeResult<Value> {
        self.inner.error_from_internal(error)
    }

    fn is_error_response(&self, body: &Value) -> bool {
        self.inner.is_error_response(body)
    }
}
