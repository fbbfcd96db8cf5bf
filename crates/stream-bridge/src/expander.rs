use ir::{BlockType, ContentBlock, InternalResponse, StreamEvent};

/// Controls how [`Expander`] breaks response text into `ContentDelta`
/// chunks. `None` emits the whole block's text as a single delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpanderOptions {
    pub text_chunk_size: Option<usize>,
}

impl ExpanderOptions {
    pub fn chunked(text_chunk_size: usize) -> Self {
        Self {
            text_chunk_size: Some(text_chunk_size),
        }
    }
}

/// Expands one [`InternalResponse`] into the synthetic IR event sequence a
/// streaming client would have seen had the upstream actually streamed:
/// `MessageStart` → per block `ContentBlockStart` + deltas + `ContentBlockStop`
/// → `MessageStop`. Deterministic and stateless beyond the response given at
/// construction; implemented as a plain [`Iterator`] so downstream code
/// drives it the same way it drives a real stream.
pub struct Expander {
    events: std::vec::IntoIter<StreamEvent>,
}

impl Expander {
    pub fn new(response: &InternalResponse, options: ExpanderOptions) -> Self {
        let mut events = vec![StreamEvent::MessageStart {
            message_id: response.id.clone(),
            model: response.model.clone(),
            usage: Some(response.usage.clone()),
        }];

        for (index, block) in response.content.iter().enumerate() {
            let block_index = index as u32;
            push_block_events(&mut events, block_index, block, options);
        }

        events.push(StreamEvent::MessageStop {
            stop_reason: response.stop_reason,
            usage: Some(response.usage.clone()),
        });

        Self {
            events: events.into_iter(),
        }
    }
}

fn push_block_events(events: &mut Vec<StreamEvent>, block_index: u32, block: &ContentBlock, options: ExpanderOptions) {
    match block {
        ContentBlock::Text { text, .. } => {
            events.push(StreamEvent::ContentBlockStart {
                block_index,
                block_type: BlockType::Text,
                tool_id: None,
                tool_name: None,
                extra: Default::default(),
            });
            for chunk in chunk_text(text, options.text_chunk_size) {
                events.push(StreamEvent::ContentDelta {
                    block_index,
                    text_delta: chunk,
                    extra: Default::default(),
                });
            }
            events.push(StreamEvent::ContentBlockStop { block_index });
        }
        ContentBlock::Thinking { thinking, .. } => {
            events.push(StreamEvent::ContentBlockStart {
                block_index,
                block_type: BlockType::Thinking,
                tool_id: None,
                tool_name: None,
                extra: Default::default(),
            });
            for chunk in chunk_text(thinking, options.text_chunk_size) {
                events.push(StreamEvent::ContentDelta {
                    block_index,
                    text_delta: chunk,
                    extra: Default::default(),
                });
            }
            events.push(StreamEvent::ContentBlockStop { block_index });
        }
        ContentBlock::ToolUse {
            tool_id,
            tool_name,
            tool_input,
            ..
        } => {
            events.push(StreamEvent::ContentBlockStart {
                block_index,
                block_type: BlockType::ToolUse,
                tool_id: Some(tool_id.clone()),
                tool_name: Some(tool_name.clone()),
                extra: Default::default(),
            });
            events.push(StreamEvent::ToolCallDelta {
                block_index,
                tool_id: tool_id.clone(),
                input_delta: tool_input.to_string(),
            });
            events.push(StreamEvent::ContentBlockStop { block_index });
        }
        // Image/File/Audio/ToolResult/Unknown blocks have no streaming
        // delta shape in the canonical event set; a synthetic expansion of
        // a response containing one is not something the source path
        // normally produces, so there's nothing to emit here.
        ContentBlock::Image { .. } | ContentBlock::File { .. } | ContentBlock::Audio { .. } => {}
        ContentBlock::ToolResult { .. } | ContentBlock::Unknown { .. } => {}
    }
}

fn chunk_text(text: &str, chunk_size: Option<usize>) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    match chunk_size {
        None | Some(0) => vec![text.to_string()],
        Some(size) => text.chars().collect::<Vec<_>>().chunks(size).map(|c| c.iter().collect()).collect(),
    }
}

impl Iterator for Expander {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.next()
    }
}

#[cfg(test)]
mod tests {
    use ir::{StopReason, UsageInfo};

    use super::*;

    #[test]
    fn expands_text_response_into_full_event_sequence() {
        let response = InternalResponse {
            id: "r1".into(),
            model: "test-model".into(),
            content: vec![ContentBlock::text("hi")],
            stop_reason: Some(StopReason::EndTurn),
            usage: UsageInfo::new(3, 1),
            extra: Default::default(),
        };

        let events: Vec<_> = Expander::new(&response, ExpanderOptions::default()).collect();
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(
            events[1],
            StreamEvent::ContentBlockStart {
                block_type: BlockType::Text,
                ..
            }
        ));
        assert!(matches!(&events[2], StreamEvent::ContentDelta { text_delta, .. } if text_delta == "hi"));
        assert!(matches!(events[3], StreamEvent::ContentBlockStop { block_index: 0 }));
        assert!(matches!(events[4], StreamEvent::MessageStop { .. }));
    }

    #[test]
    fn chunks_text_when_configured() {
        let response = InternalResponse {
            id: "r1".into(),
            model: "test-model".into(),
            content: vec![ContentBlock::text("abcdef")],
            stop_reason: None,
            usage: UsageInfo::default(),
            extra: Default::default(),
        };

        let deltas: Vec<_> = Expander::new(&response, ExpanderOptions::chunked(2))
            .filter_map(|event| match event {
                StreamEvent::ContentDelta { text_delta, .. } => Some(text_delta),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["ab", "cd", "ef"]);
    }

    #[test]
    fn tool_use_emits_single_delta_with_full_json() {
        let response = InternalResponse {
            id: "r1".into(),
            model: "test-model".into(),
            content: vec![ContentBlock::ToolUse {
                tool_id: "call_1".into(),
                tool_name: "get_weather".into(),
                tool_input: serde_json::json!({"city": "SF"}),
                extra: Default::default(),
            }],
            stop_reason: Some(StopReason::ToolUse),
            usage: UsageInfo::default(),
            extra: Default::default(),
        };

        let tool_deltas: Vec<_> = Expander::new(&response, ExpanderOptions::default())
            .filter_map(|event| match event {
                StreamEvent::ToolCallDelta { input_delta, .. } => Some(input_delta),
                _ => None,
            })
            .collect();
        assert_eq!(tool_deltas.len(), 1);
        assert!(tool_deltas[0].contains("SF"));
    }
}
