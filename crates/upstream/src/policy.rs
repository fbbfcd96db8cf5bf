use serde::Deserialize;
use serde_json::Value;

/// C5 — per-endpoint override of the upstream hop's stream mode,
/// independent of what the client asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPolicy {
    #[default]
    Auto,
    ForceStream,
    ForceNonStream,
}

impl StreamPolicy {
    /// Resolves the actual upstream stream mode from the client's intent
    /// and this policy.
    pub fn resolve(self, client_is_stream: bool) -> bool {
        match self {
            StreamPolicy::Auto => client_is_stream,
            StreamPolicy::ForceStream => true,
            StreamPolicy::ForceNonStream => false,
        }
    }
}

/// Format family used to decide how the upstream body's `stream` field is
/// rewritten once `upstream_is_stream` is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyStreamField {
    /// OpenAI Chat: `"stream": bool`, plus `stream_options.include_usage`
    /// when streaming.
    OpenAiChat,
    /// Gemini: no `stream` field in the body at all — streaming is
    /// selected by the endpoint path (`streamGenerateContent` vs
    /// `generateContent`), so the field must be removed entirely.
    GeminiFamily,
    /// Everything else (Claude family, OpenAI Responses): plain
    /// `"stream": bool`.
    PlainStreamField,
}

impl BodyStreamField {
    pub fn for_format(format_id: &str) -> Self {
        match registry::format_family(format_id) {
            "gemini" => BodyStreamField::GeminiFamily,
            "openai:chat" => BodyStreamField::OpenAiChat,
            _ => BodyStreamField::PlainStreamField,
        }
    }
}

/// Enforces `upstream_is_stream` in the outbound body per §4.4 step 6.
pub fn rewrite_stream_field(body: &mut Value, field: BodyStreamField, upstream_is_stream: bool) {
    let Value::Object(map) = body else { return };

    match field {
        BodyStreamField::GeminiFamily => {
            map.remove("stream");
        }
        BodyStreamField::OpenAiChat => {
            map.insert("stream".to_string(), Value::Bool(upstream_is_stream));
            if upstream_is_stream {
                map.insert(
                    "stream_options".to_string(),
                    serde_json::json!({"include_usage": true}),
                );
            } else {
                map.remove("stream_options");
            }
        }
        BodyStreamField::PlainStreamField => {
            map.insert("stream".to_string(), Value::Bool(upstream_is_stream));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn force_stream_overrides_client_intent() {
        assert!(StreamPolicy::ForceStream.resolve(false));
        assert!(!StreamPolicy::ForceNonStream.resolve(true));
        assert_eq!(StreamPolicy::Auto.resolve(true), true);
    }

    #[test]
    fn gemini_family_removes_stream_field_entirely() {
        let mut body = json!({"model": "gemini-pro", "stream": true});
        rewrite_stream_field(&mut body, BodyStreamField::GeminiFamily, true);
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn openai_chat_sets_stream_options_when_streaming() {
        let mut body = json!({"model": "gpt-4"});
        rewrite_stream_field(&mut body, BodyStreamField::OpenAiChat, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }
}
