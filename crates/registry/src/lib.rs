//! C3 Conversion Registry: the directory of normalizers, the compatibility
//! gate that decides whether a client/endpoint format pair needs
//! conversion at all, and the conversion methods themselves.
//!
//! There is exactly one registry in a running gateway
//! ([`registry`]/[`register_default_normalizers`]), but every method here
//! also works on a freestanding instance for testing.

mod error;
mod gate;
mod metrics;
mod policy;

use std::{
    collections::HashMap,
    sync::OnceLock,
};

use ir::StreamState;
use normalizers::{
    Normalizer,
    formats::{
        ClaudeChatNormalizer, ClaudeCliNormalizer, GeminiChatNormalizer, GeminiCliNormalizer, OpenAiChatNormalizer,
        OpenAiResponsesNormalizer,
    },
};
use serde_json::Value;

pub use error::{RegistryError, RegistryResult};
pub use gate::Compatibility;
pub use metrics::Direction;
pub use policy::{EndpointPolicy, format_family};

/// Directory of normalizers keyed by format id. `openai:cli` is registered
/// twice: once under its bare id for the standard Responses API, once
/// under `openai:cli#codex` for the codex CLI's variant (forces
/// `stream=true, store=false`). The dispatcher selects the variant id via
/// `conversion_variant`.
pub struct ConversionRegistry {
    normalizers: HashMap<&'static str, Box<dyn Normalizer>>,
}

impl ConversionRegistry {
    pub fn empty() -> Self {
        Self {
            normalizers: HashMap::new(),
        }
    }

    pub fn with_default_normalizers() -> Self {
        let mut registry = Self::empty();
        registry.register(ClaudeChatNormalizer::default());
        registry.register(ClaudeCliNormalizer::default());
        registry.register(GeminiChatNormalizer::default());
        registry.register(GeminiCliNormalizer::default());
        registry.register(OpenAiChatNormalizer::default());
        registry.register_as("openai:cli", OpenAiResponsesNormalizer::default());
        registry.register_as(
            "openai:cli#codex",
            OpenAiResponsesNormalizer {
                codex_variant: true,
            },
        );
        registry
    }

    fn register(&mut self, normalizer: impl Normalizer + 'static) {
        let id = normalizer.id();
        self.register_as(id, normalizer);
    }

    fn register_as(&mut self, id: &'static str, normalizer: impl Normalizer + 'static) {
        self.normalizers.insert(id, Box::new(normalizer));
    }

    pub fn get(&self, format_id: &str) -> Option<&dyn Normalizer> {
        self.normalizers.get(format_id).map(AsRef::as_ref)
    }

    fn require(&self, format_id: &str) -> RegistryResult<&dyn Normalizer> {
        self.get(format_id)
            .ok_or_else(|| RegistryError::UnknownFormat(format_id.to_string()))
    }

    /// Number of distinct registered format ids (including variant ids like
    /// `openai:cli#codex`). The six base wire formats are always present.
    pub fn len(&self) -> usize {
        self.normalizers.len()
    }

    /// Picks `{target}#{variant}` if a normalizer is registered under that
    /// id, else falls back to the bare `target` id.
    fn effective_target<'a>(&self, target: &'a str, variant: Option<&str>) -> String {
        if let Some(variant) = variant {
            let variant_id = format!("{target}#{variant}");
            if self.normalizers.contains_key(variant_id.as_str()) {
                return variant_id;
            }
        }
        target.to_string()
    }

    /// `registry.convert_request(body, F, F)` is the identity when `variant`
    /// is absent — the passthrough invariant. Otherwise parses to IR
    /// through `source`, repairs dangling tool-call ids, and renders
    /// through `target` (or `target#variant` if registered).
    pub fn convert_request(
        &self,
        body: Value,
        source: &str,
        target: &str,
        variant: Option<&str>,
    ) -> RegistryResult<Value> {
        if source.eq_ignore_ascii_case(target) && variant.is_none() {
            return Ok(body);
        }

        let source = source.to_string();
        let target_id = self.effective_target(target, variant);

        metrics::record_conversion(Direction::Request, leak(&source), leak(&target_id), || {
            let source_normalizer = self.require(&source)?;
            let target_normalizer = self.require(&target_id)?;

            let mut internal = source_normalizer.request_to_internal(body)?;
            ir::repair_tool_call_ids(&mut internal);

            Ok(target_normalizer.request_from_internal(&internal)?)
        })
    }

    /// Model echo applies even when `source == target`: if `requested_model`
    /// is set, the IR round-trip always runs so the response's
    /// model-naming field can be overwritten before rendering.
    pub fn convert_response(
        &self,
        body: Value,
        source: &str,
        target: &str,
        requested_model: Option<&str>,
    ) -> RegistryResult<Value> {
        if source.eq_ignore_ascii_case(target) && requested_model.is_none() {
            return Ok(body);
        }

        metrics::record_conversion(Direction::Response, leak(source), leak(target), || {
            let source_normalizer = self.require(source)?;
            let target_normalizer = self.require(target)?;

            let mut internal = source_normalizer.response_to_internal(body)?;
            if let Some(model) = requested_model {
                internal.model = model.to_string();
            }

            Ok(target_normalizer.response_from_internal(&internal)?)
        })
    }

    pub fn convert_error(&self, body: Value, source: &str, target: &str) -> RegistryResult<Value> {
        metrics::record_conversion(Direction::Error, leak(source), leak(target), || {
            let source_normalizer = self.require(source)?;
            let target_normalizer = self.require(target)?;

            let internal = source_normalizer.error_to_internal(body)?;
            Ok(target_normalizer.error_from_internal(&internal)?)
        })
    }

    /// Parses one upstream SSE chunk through `source` and renders every
    /// resulting IR event through `target`, flattening into the wire
    /// chunks to send to the client.
    pub fn convert_stream_chunk(
        &self,
        chunk: Value,
        source: &str,
        target: &str,
        state: &mut StreamState,
    ) -> RegistryResult<Vec<Value>> {
        metrics::record_conversion(Direction::Stream, leak(source), leak(target), || {
            let source_normalizer = self.require(source)?;
            let target_normalizer = self.require(target)?;

            let events = source_normalizer.stream_chunk_to_internal(chunk, state)?;
            let mut rendered = Vec::with_capacity(events.len());
            for event in &events {
                rendered.extend(target_normalizer.stream_event_from_internal(event, state)?);
            }
            Ok(rendered)
        })
    }
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::with_default_normalizers()
    }
}

/// Leaks a short-lived format id string for the lifetime of one metric
/// recording call. Format ids are a closed, small set
/// (`openai:chat`/`openai:cli`/...), so the leaked allocations are bounded
/// by the number of distinct ids ever seen, not by request volume.
fn leak(s: &str) -> &'static str {
    static INTERNED: OnceLock<std::sync::Mutex<HashMap<String, &'static str>>> = OnceLock::new();
    let table = INTERNED.get_or_init(Default::default);
    let mut table = table.lock().unwrap_or_else(|poison| poison.into_inner());
    if let Some(existing) = table.get(s) {
        return existing;
    }
    let leaked: &'static str = Box::leak(s.to_string().into_boxed_str());
    table.insert(s.to_string(), leaked);
    leaked
}

static SINGLETON: OnceLock<ConversionRegistry> = OnceLock::new();

/// Initializes the process-global registry exactly once even under
/// concurrent callers, registering all six base formats plus the
/// `openai:cli#codex` variant.
pub fn register_default_normalizers() -> &'static ConversionRegistry {
    SINGLETON.get_or_init(ConversionRegistry::with_default_normalizers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn singleton_registers_base_formats_idempotently() {
        let first = register_default_normalizers();
        let second = register_default_normalizers();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.len(), 7); // 6 base formats + openai:cli#codex
    }

    #[test]
    fn concurrent_registration_is_idempotent() {
        let handles: Vec<_> = (0..8).map(|_| std::thread::spawn(register_default_normalizers)).collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(register_default_normalizers().len(), 7);
    }

    #[test]
    fn same_format_passthrough_is_identity() {
        let registry = ConversionRegistry::with_default_normalizers();
        let body = json!({"model": "test-model", "messages": []});
        let converted = registry.convert_request(body.clone(), "openai:chat", "openai:chat", None).unwrap();
        assert_eq!(converted, body);
    }

    #[test]
    fn model_echo_applies_even_for_same_format() {
        let registry = ConversionRegistry::with_default_normalizers();
        let body = json!({
            "id": "resp_1",
            "model": "upstream-model",
            "content": [{"type": "text", "text": "hi"}],
            "usage": {"input_tokens": 1, "output_tokens": 1},
        });
        let converted = registry
            .convert_response(body, "claude:chat", "claude:chat", Some("requested-model"))
            .unwrap();
        assert_eq!(converted["model"], "requested-model");
    }
}
