use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::extra::Extra;

/// One block of message content.
///
/// This is the unit normalizers translate to and from on both the request
/// and response path. `Unknown` is the forward-compatibility escape hatch:
/// a source normalizer that sees a content type it doesn't recognize wraps
/// the raw payload here instead of dropping it, so the block survives as
/// long as it stays inside the gateway. It's dropped on render unless the
/// target format has a handler for that `raw_type`.
///
/// Deserialization never fails on an unrecognized `type` tag: anything that
/// doesn't match a known variant falls back to `Unknown` rather than
/// rejecting the whole message (see the manual [`Deserialize`] impl below).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default, flatten)]
        extra: Extra,
    },
    /// Model-emitted chain-of-thought. `signature` is an opaque anti-tamper
    /// token some providers attach; it must be echoed back verbatim on the
    /// next turn or the provider rejects the request.
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
        #[serde(default, flatten)]
        extra: Extra,
    },
    Image {
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        media_type: Option<String>,
        #[serde(default, flatten)]
        extra: Extra,
    },
    File {
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        file_id: Option<String>,
        #[serde(default)]
        file_url: Option<String>,
        #[serde(default)]
        media_type: Option<String>,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default, flatten)]
        extra: Extra,
    },
    Audio {
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        media_type: Option<String>,
        #[serde(default)]
        format: Option<String>,
        #[serde(default, flatten)]
        extra: Extra,
    },
    /// A model-emitted tool/function call. `tool_id` must be non-empty by
    /// the time this leaves the registry — see
    /// [`crate::repair_tool_call_ids`].
    ToolUse {
        tool_id: String,
        tool_name: String,
        tool_input: Value,
        #[serde(default, flatten)]
        extra: Extra,
    },
    /// The result of executing a prior `ToolUse`, paired by `tool_use_id`.
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        tool_name: Option<String>,
        output: Value,
        #[serde(default)]
        content_text: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, flatten)]
        extra: Extra,
    },
    /// Unparsed forward-compatibility bucket. Preserved internally, dropped
    /// on render to a target format unless that format explicitly handles
    /// `raw_type`.
    Unknown { raw_type: String, payload: Value },
}

/// Mirrors every variant of [`ContentBlock`] except `Unknown`, so we can
/// attempt a normal tagged-enum parse and fall back by hand when the `type`
/// tag doesn't match any of these.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownContentBlock {
    Text {
        text: String,
        #[serde(default, flatten)]
        extra: Extra,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
        #[serde(default, flatten)]
        extra: Extra,
    },
    Image {
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        media_type: Option<String>,
        #[serde(default, flatten)]
        extra: Extra,
    },
    File {
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        file_id: Option<String>,
        #[serde(default)]
        file_url: Option<String>,
        #[serde(default)]
        media_type: Option<String>,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default, flatten)]
        extra: Extra,
    },
    Audio {
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        media_type: Option<String>,
        #[serde(default)]
        format: Option<String>,
        #[serde(default, flatten)]
        extra: Extra,
    },
    ToolUse {
        tool_id: String,
        tool_name: String,
        tool_input: Value,
        #[serde(default, flatten)]
        extra: Extra,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        tool_name: Option<String>,
        output: Value,
        #[serde(default)]
        content_text: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, flatten)]
        extra: Extra,
    },
}

impl From<KnownContentBlock> for ContentBlock {
    fn from(known: KnownContentBlock) -> Self {
        match known {
            KnownContentBlock::Text { text, extra } => ContentBlock::Text { text, extra },
            KnownContentBlock::Thinking {
                thinking,
                signature,
                extra,
            } => ContentBlock::Thinking {
                thinking,
                signature,
                extra,
            },
            KnownContentBlock::Image {
                data,
                url,
                media_type,
                extra,
            } => ContentBlock::Image {
                data,
                url,
                media_type,
                extra,
            },
            KnownContentBlock::File {
                data,
                file_id,
                file_url,
                media_type,
                filename,
                extra,
            } => ContentBlock::File {
                data,
                file_id,
                file_url,
                media_type,
                filename,
                extra,
            },
            KnownContentBlock::Audio {
                data,
                media_type,
                format,
                extra,
            } => ContentBlock::Audio {
                data,
                media_type,
                format,
                extra,
            },
            KnownContentBlock::ToolUse {
                tool_id,
                tool_name,
                tool_input,
                extra,
            } => ContentBlock::ToolUse {
                tool_id,
                tool_name,
                tool_input,
                extra,
            },
            KnownContentBlock::ToolResult {
                tool_use_id,
                tool_name,
                output,
                content_text,
                is_error,
                extra,
            } => ContentBlock::ToolResult {
                tool_use_id,
                tool_name,
                output,
                content_text,
                is_error,
                extra,
            },
        }
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match KnownContentBlock::deserialize(value.clone()) {
            Ok(known) => Ok(known.into()),
            Err(_) => {
                let raw_type = value
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                Ok(ContentBlock::Unknown { raw_type, payload: value })
            }
        }
    }
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            extra: Extra::default(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, ContentBlock::ToolUse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_block_round_trips_with_tag() {
        let block = ContentBlock::text("hello");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["text"], "hello");

        let parsed: ContentBlock = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.as_text(), Some("hello"));
    }

    #[test]
    fn unrecognized_type_falls_back_to_unknown() {
        let value = serde_json::json!({"type": "carrier_pigeon", "note": "fly"});
        let block: ContentBlock = serde_json::from_value(value).unwrap();
        match block {
            ContentBlock::Unknown { raw_type, payload } => {
                assert_eq!(raw_type, "carrier_pigeon");
                assert_eq!(payload["note"], "fly");
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }
}

/// An ordered system/developer prompt segment.
///
/// `InternalRequest::system` is a convenience concatenation of these; never
/// duplicate content between the two — a normalizer either reads `system`
/// (string-only formats) or `instructions` (array-capable formats), never
/// both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionSegment {
    pub role: InstructionRole,
    pub text: String,
    #[serde(default, flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionRole {
    System,
    Developer,
}

/// A complete message: a role plus an ordered list of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: crate::role::Role,
    pub content: Vec<ContentBlock>,
    #[serde(default, flatten)]
    pub extra: Extra,
}

impl Message {
    pub fn new(role: crate::role::Role, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            extra: Extra::default(),
        }
    }

    pub fn text(role: crate::role::Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![ContentBlock::text(text)])
    }
}
