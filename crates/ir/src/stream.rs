use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::InternalError, response::StopReason, usage::UsageInfo};

/// Discriminant for the block a `ContentBlockStart` is opening. Kept
/// separate from [`crate::content::ContentBlock`] because a stream doesn't
/// know a block's full content up front — only its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Text,
    Thinking,
    ToolUse,
}

/// One incremental event in the canonical stream representation. Producers
/// (source-format parsers) and consumers (target-format renderers) both
/// operate purely on this type; see spec §3.1's block invariant for the
/// lifecycle every `block_index` must follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message_id: String,
        model: String,
        #[serde(default)]
        usage: Option<UsageInfo>,
    },
    ContentBlockStart {
        block_index: u32,
        block_type: BlockType,
        #[serde(default)]
        tool_id: Option<String>,
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        extra: HashMap<String, Value>,
    },
    ContentDelta {
        block_index: u32,
        text_delta: String,
        #[serde(default)]
        extra: HashMap<String, Value>,
    },
    /// `input_delta` is a fragment of the tool call's JSON arguments; the
    /// full value is only valid once every fragment for `block_index` has
    /// been concatenated, in order.
    ToolCallDelta {
        block_index: u32,
        tool_id: String,
        input_delta: String,
    },
    ContentBlockStop {
        block_index: u32,
    },
    UsageEvent {
        usage: UsageInfo,
    },
    MessageStop {
        #[serde(default)]
        stop_reason: Option<StopReason>,
        #[serde(default)]
        usage: Option<UsageInfo>,
    },
    ErrorEvent {
        error: InternalError,
    },
    UnknownStreamEvent {
        raw_type: String,
        payload: Value,
    },
}

impl StreamEvent {
    pub fn block_index(&self) -> Option<u32> {
        match self {
            StreamEvent::ContentBlockStart { block_index, .. }
            | StreamEvent::ContentDelta { block_index, .. }
            | StreamEvent::ToolCallDelta { block_index, .. }
            | StreamEvent::ContentBlockStop { block_index } => Some(*block_index),
            _ => None,
        }
    }
}
