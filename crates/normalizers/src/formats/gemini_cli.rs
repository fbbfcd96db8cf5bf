//! `gemini:cli` — the Gemini CLI / Code Assist wire format, which wraps the
//! standard `generateContent` body one level deeper:
//! `{"model": ..., "project": ..., "request": { ...generateContent body... }}`.
//! Everything inside `request` is identical to `gemini:chat`, so this
//! unwraps/rewraps around [`super::gemini::GeminiChatNormalizer`].

use ir::{InternalError, InternalRequest, InternalResponse, StreamEvent, StreamState};
use serde_json::{Value, json};

use crate::{Capabilities, Normalizer, NormalizeError, NormalizeResult, formats::gemini::GeminiChatNormalizer};

#[derive(Default)]
pub struct GeminiCliNormalizer {
    inner: GeminiChatNormalizer,
}

impl Normalizer for GeminiCliNormalizer {
    fn id(&self) -> &'static str {
        "gemini:cli"
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn request_to_internal(&self, body: Value) -> NormalizeResult<InternalRequest> {
        let mut inner_body = body
            .get("request")
            .cloned()
            .ok_or_else(|| NormalizeError::MalformedBody {
                format: self.id(),
                message: "missing request envelope".into(),
            })?;
        if let Value::Object(map) = &mut inner_body {
            map.entry("model").or_insert_with(|| body.get("model").cloned().unwrap_or(Value::Null));
        }
        self.inner.request_to_internal(inner_body)
    }

    fn request_from_internal(&self, request: &InternalRequest) -> NormalizeResult<Value> {
        let inner = self.inner.request_from_internal(request)?;
        Ok(json!({"model": request.model, "request": inner}))
    }

    fn response_to_internal(&self, body: Value) -> NormalizeResult<InternalResponse> {
        let inner = body.get("response").cloned().unwrap_or(body);
        self.inner.response_to_internal(inner)
    }

    fn response_from_internal(&self, response: &InternalResponse) -> NormalizeResult<Value> {
        let inner = self.inner.response_from_internal(response)?;
        Ok(json!({"response": inner}))
    }

    fn stream_chunk_to_internal(&self, chunk: Value, state: &mut StreamState) -> NormalizeResult<Vec<StreamEvent>> {
        let inner = chunk.get("response").cloned().unwrap_or(chunk);
        self.inner.stream_chunk_to_internal(inner, state)
    }

    fn stream_event_from_internal(&self, event: &StreamEvent, state: &mut StreamState) -> NormalizeResult<Vec<Value>> {
        Ok(self
            .inner
            .stream_event_from_internal(event, state)?
            .into_iter()
            .map(|inner| json!({"response": inner}))
            .collect())
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
