use std::collections::BTreeMap;

use ir::{BlockType, ContentBlock, InternalError, InternalResponse, StopReason, StreamEvent, UsageInfo};
use serde_json::Value;

enum BlockBuilder {
    Text(String),
    Thinking { thinking: String, signature: Option<String> },
    ToolUse { tool_id: String, tool_name: String, input_json: String },
}

impl BlockBuilder {
    fn start(block_type: BlockType, tool_id: Option<String>, tool_name: Option<String>) -> Self {
        match block_type {
            BlockType::Text => BlockBuilder::Text(String::new()),
            BlockType::Thinking => BlockBuilder::Thinking {
                thinking: String::new(),
                signature: None,
            },
            BlockType::ToolUse => BlockBuilder::ToolUse {
                tool_id: tool_id.unwrap_or_default(),
                tool_name: tool_name.unwrap_or_default(),
                input_json: String::new(),
            },
        }
    }

    fn push_text(&mut self, delta: &str) {
        match self {
            BlockBuilder::Text(text) => text.push_str(delta),
            BlockBuilder::Thinking { thinking, .. } => thinking.push_str(delta),
            BlockBuilder::ToolUse { .. } => {}
        }
    }

    fn push_tool_input(&mut self, delta: &str) {
        if let BlockBuilder::ToolUse { input_json, .. } = self {
            input_json.push_str(delta);
        }
    }

    fn finish(self) -> ContentBlock {
        match self {
            BlockBuilder::Text(text) => ContentBlock::text(text),
            BlockBuilder::Thinking { thinking, signature } => ContentBlock::Thinking {
                thinking,
                signature,
                extra: Default::default(),
            },
            BlockBuilder::ToolUse {
                tool_id,
                tool_name,
                input_json,
            } => ContentBlock::ToolUse {
                tool_id,
                tool_name,
                tool_input: if input_json.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&input_json).unwrap_or(Value::Null)
                },
                extra: Default::default(),
            },
        }
    }
}

/// Folds a stream of IR events into one [`InternalResponse`]. Maintains one
/// [`BlockBuilder`] per `block_index`, keyed in a `BTreeMap` so the final
/// `content` array comes out ordered by index regardless of arrival or
/// flush order. `MessageStop` (or stream end without one) flushes any block
/// still open.
#[derive(Default)]
pub struct Aggregator {
    message_id: String,
    model: String,
    usage: UsageInfo,
    stop_reason: Option<StopReason>,
    blocks: BTreeMap<u32, BlockBuilder>,
    error: Option<InternalError>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::MessageStart { message_id, model, usage } => {
                self.message_id = message_id;
                self.model = model;
                if let Some(usage) = usage {
                    self.usage.merge_latest(&usage);
                }
            }
            StreamEvent::ContentBlockStart {
                block_index,
                block_type,
                tool_id,
                tool_name,
                ..
            } => {
                self.blocks.insert(block_index, BlockBuilder::start(block_type, tool_id, tool_name));
            }
            StreamEvent::ContentDelta {
                block_index, text_delta, ..
            } => {
                if let Some(builder) = self.blocks.get_mut(&block_index) {
                    builder.push_text(&text_delta);
                }
            }
            StreamEvent::ToolCallDelta {
                block_index, input_delta, ..
            } => {
                if let Some(builder) = self.blocks.get_mut(&block_index) {
                    builder.push_tool_input(&input_delta);
                }
            }
            StreamEvent::ContentBlockStop { .. } => {
                // Finalization happens in `finish`; the block index staying
                // in `self.blocks` until then is what lets a missing
                // `ContentBlockStop` (abnormal stream end) still flush.
            }
            StreamEvent::UsageEvent { usage } => self.usage.merge_latest(&usage),
            StreamEvent::MessageStop { stop_reason, usage } => {
                self.stop_reason = stop_reason;
                if let Some(usage) = usage {
                    self.usage.merge_latest(&usage);
                }
            }
            StreamEvent::ErrorEvent { error } => self.error = Some(error),
            StreamEvent::UnknownStreamEvent { .. } => {}
        }
    }

    /// Consumes every event from `events` in order, then finalizes. This is
    /// the `Aggregator` used end-to-end over a completed event sequence;
    /// [`Aggregator::push`] is exposed separately for incremental callers.
    pub fn aggregate(events: impl IntoIterator<Item = StreamEvent>) -> Result<InternalResponse, InternalError> {
        let mut aggregator = Self::new();
        for event in events {
            aggregator.push(event);
        }
        aggregator.finish()
    }

    pub fn finish(self) -> Result<InternalResponse, InternalError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let content = self.blocks.into_values().map(BlockBuilder::finish).collect();

        Ok(InternalResponse {
            id: self.message_id,
            model: self.model,
            content,
            stop_reason: self.stop_reason,
            usage: self.usage,
            extra: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_text_deltas_in_order() {
        let events = vec![
            StreamEvent::MessageStart {
                message_id: "msg_1".into(),
                model: "test-model".into(),
                usage: None,
            },
            StreamEvent::ContentBlockStart {
                block_index: 0,
                block_type: BlockType::Text,
                tool_id: None,
                tool_name: None,
                extra: Default::default(),
            },
            StreamEvent::ContentDelta {
                block_index: 0,
                text_delta: "Hel".into(),
                extra: Default::default(),
            },
            StreamEvent::ContentDelta {
                block_index: 0,
                text_delta: "lo".into(),
                extra: Default::default(),
            },
            StreamEvent::ContentBlockStop { block_index: 0 },
            StreamEvent::MessageStop {
                stop_reason: Some(StopReason::EndTurn),
                usage: Some(UsageInfo::new(5, 2)),
            },
        ];

        let response = Aggregator::aggregate(events).unwrap();
        assert_eq!(response.content.len(), 1);
        assert_eq!(response.content[0].as_text(), Some("Hello"));
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage.input_tokens, 5);
    }

    #[test]
    fn flushes_still_open_block_without_explicit_stop() {
        let events = vec![
            StreamEvent::MessageStart {
                message_id: "msg_1".into(),
                model: "test-model".into(),
                usage: None,
            },
            StreamEvent::ContentBlockStart {
                block_index: 0,
                block_type: BlockType::Text,
                tool_id: None,
                tool_name: None,
                extra: Default::default(),
            },
            StreamEvent::ContentDelta {
                block_index: 0,
                text_delta: "partial".into(),
                extra: Default::default(),
            },
        ];

        let response = Aggregator::aggregate(events).unwrap();
        assert_eq!(response.content[0].as_text(), Some("partial"));
    }

    #[test]
    fn tool_call_delta_fragments_concatenate_into_valid_json() {
        let events = vec![
            StreamEvent::ContentBlockStart {
                block_index: 0,
                block_type: BlockType::ToolUse,
                tool_id: Some("call_1".into()),
                tool_name: Some("get_weather".into()),
                extra: Default::default(),
            },
            StreamEvent::ToolCallDelta {
                block_index: 0,
                tool_id: "call_1".into(),
                input_delta: "{\"city\":".into(),
            },
            StreamEvent::ToolCallDelta {
                block_index: 0,
                tool_id: "call_1".into(),
                input_delta: "\"SF\"}".into(),
            },
            StreamEvent::ContentBlockStop { block_index: 0 },
        ];

        let response = Aggregator::aggregate(events).unwrap();
        match &response.content[0] {
            ContentBlock::ToolUse { tool_input, tool_id, .. } => {
                assert_eq!(tool_id, "call_1");
                assert_eq!(tool_input["city"], "SF");
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }
    }

    #[test]
    fn error_event_short_circuits_to_err() {
        let events = vec![StreamEvent::ErrorEvent {
            error: InternalError::server_error("boom"),
        }];
        assert!(Aggregator::aggregate(events).is_err());
    }
}
