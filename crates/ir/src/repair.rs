use std::collections::VecDeque;

use crate::{content::ContentBlock, request::InternalRequest};

/// Fills in empty tool-call ids left by source formats that don't assign one
/// (spec §3.1). Walks messages in order, and for every `ToolUse` with an
/// empty `tool_id` assigns a fresh `call_auto_N` id; any `ToolResult` with an
/// empty `tool_use_id` is paired, in order, against the oldest still-open
/// generated id (FIFO), mirroring how a client that dropped ids still sends
/// its tool results in call order.
///
/// Idempotent: a request with no empty ids is returned unchanged, and
/// running this twice on the same request is identical to running it once.
pub fn repair_tool_call_ids(request: &mut InternalRequest) {
    let mut next_id = 1u64;
    let mut pending: VecDeque<String> = VecDeque::new();

    for message in &mut request.messages {
        for block in &mut message.content {
            match block {
                ContentBlock::ToolUse { tool_id, .. } if tool_id.is_empty() => {
                    *tool_id = format!("call_auto_{next_id}");
                    next_id += 1;
                    pending.push_back(tool_id.clone());
                }
                ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id.is_empty() => {
                    if let Some(id) = pending.pop_front() {
                        *tool_use_id = id;
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{content::Message, role::Role};

    fn request_with(blocks: Vec<ContentBlock>) -> InternalRequest {
        InternalRequest::new("gpt-4o", vec![Message::new(Role::Assistant, blocks)])
    }

    #[test]
    fn assigns_sequential_ids_and_pairs_results_in_order() {
        let mut request = request_with(vec![
            ContentBlock::ToolUse {
                tool_id: String::new(),
                tool_name: "lookup".into(),
                tool_input: json!({}),
                extra: Default::default(),
            },
            ContentBlock::ToolUse {
                tool_id: String::new(),
                tool_name: "write".into(),
                tool_input: json!({}),
                extra: Default::default(),
            },
        ]);
        request.messages.push(Message::new(
            Role::Tool,
            vec![
                ContentBlock::ToolResult {
                    tool_use_id: String::new(),
                    tool_name: None,
                    output: json!("ok"),
                    content_text: None,
                    is_error: false,
                    extra: Default::default(),
                },
                ContentBlock::ToolResult {
                    tool_use_id: String::new(),
                    tool_name: None,
                    output: json!("ok"),
                    content_text: None,
                    is_error: false,
                    extra: Default::default(),
                },
            ],
        ));

        repair_tool_call_ids(&mut request);

        let ContentBlock::ToolUse { tool_id: first_use, .. } = &request.messages[0].content[0] else {
            panic!("expected tool use");
        };
        let ContentBlock::ToolUse { tool_id: second_use, .. } = &request.messages[0].content[1] else {
            panic!("expected tool use");
        };
        let ContentBlock::ToolResult {
            tool_use_id: first_result,
            ..
        } = &request.messages[1].content[0]
        else {
            panic!("expected tool result");
        };
        let ContentBlock::ToolResult {
            tool_use_id: second_result,
            ..
        } = &request.messages[1].content[1]
        else {
            panic!("expected tool result");
        };

        assert_eq!(first_use, "call_auto_1");
        assert_eq!(second_use, "call_auto_2");
        assert_eq!(first_result, first_use);
        assert_eq!(second_result, second_use);
    }

    #[test]
    fn leaves_non_empty_ids_untouched() {
        let mut request = request_with(vec![ContentBlock::ToolUse {
            tool_id: "call_from_client".into(),
            tool_name: "lookup".into(),
            tool_input: json!({}),
            extra: Default::default(),
        }]);

        repair_tool_call_ids(&mut request);

        let ContentBlock::ToolUse { tool_id, .. } = &request.messages[0].content[0] else {
            panic!("expected tool use");
        };
        assert_eq!(tool_id, "call_from_client");
    }

    #[test]
    fn is_idempotent() {
        let mut request = request_with(vec![ContentBlock::ToolUse {
            tool_id: String::new(),
            tool_name: "lookup".into(),
            tool_input: json!({}),
            extra: Default::default(),
        }]);

        repair_tool_call_ids(&mut request);
        let first_pass = request.clone();
        repair_tool_call_ids(&mut request);

        assert_eq!(
            serde_json::to_value(&first_pass).unwrap(),
            serde_json::to_value(&request).unwrap()
        );
    }
}
