//! Format adapters: one module per wire format, each implementing [`Normalizer`]
//! to convert between its own wire shapes and the canonical [`ir`] types.
//!
//! Normalizers never talk to each other and never see the registry's
//! compatibility gate; they're pure, stateless (beyond the per-request
//! [`ir::StreamState`]) translators. Everything format-specific lives behind
//! this one trait so the registry and the upstream dispatcher stay
//! completely format-agnostic.

pub mod formats;

use ir::{InternalError, InternalRequest, InternalResponse, StreamEvent, StreamState};
use serde_json::Value;

/// What a format can and can't carry, used by the registry's compatibility
/// gate (see `registry`) before it attempts a conversion at all.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub supports_tools: bool,
    pub supports_streaming: bool,
    pub supports_thinking: bool,
    pub supports_system_array: bool,
    pub supports_multiple_choices: bool,
}

impl Capabilities {
    pub const fn full() -> Self {
        Self {
            supports_tools: true,
            supports_streaming: true,
            supports_thinking: true,
            supports_system_array: true,
            supports_multiple_choices: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("malformed {format} body: {message}")]
    MalformedBody { format: &'static str, message: String },
    #[error("{format} does not support {feature}")]
    Unsupported { format: &'static str, feature: &'static str },
    #[error("failed to encode {format} body: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// One wire format's conversion surface. A format's request/response/stream
/// directions are independent: a format can be response-only (no client ever
/// sends it as a request body, e.g. a provider-internal variant) or vice
/// versa, so each method takes a raw [`Value`] in its own direction rather
/// than assuming a fixed request/response pairing.
pub trait Normalizer: Send + Sync {
    /// Stable identifier used in config, metrics labels and error messages.
    /// Matches the `accept_formats`/`reject_formats` strings in gateway
    /// config (e.g. `"openai:chat"`, `"claude:cli"`).
    fn id(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn request_to_internal(&self, body: Value) -> NormalizeResult<InternalRequest>;

    fn request_from_internal(&self, request: &InternalRequest) -> NormalizeResult<Value>;

    fn response_to_internal(&self, body: Value) -> NormalizeResult<InternalResponse>;

    fn response_from_internal(&self, response: &InternalResponse) -> NormalizeResult<Value>;

    /// Parse one upstream SSE/stream chunk into zero or more canonical
    /// events, updating `state` with any bookkeeping needed to parse the
    /// next chunk (e.g. which block index is currently open).
    fn stream_chunk_to_internal(&self, chunk: Value, state: &mut StreamState) -> NormalizeResult<Vec<StreamEvent>>;

    /// Render one canonical event as zero or more wire-format chunks to send
    /// to the client, updating `state` the same way.
    fn stream_event_from_internal(&self, event: &StreamEvent, state: &mut StreamState) -> NormalizeResult<Vec<Value>>;

    fn error_to_internal(&self, body: Value) -> NormalizeResult<InternalError>;

    fn error_from_internal(&self, error: &InternalError) -> NormalizeResult<Value>;

    /// True when `body` (a 200-status response) actually encodes an error,
    /// per the embedded-error-in-200 case providers sometimes use.
    fn is_error_response(&self, body: &Value) -> bool;
}
