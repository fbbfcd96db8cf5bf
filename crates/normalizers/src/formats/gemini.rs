//! `gemini:chat` — Google's Generative Language `generateContent`/
//! `streamGenerateContent` API.
//!
//! Two quirks drive most of this module: Gemini has no tool role or system
//! role (`functionResponse` rides inside a `user` turn, `systemInstruction`
//! is a separate top-level field), and its streaming chunks carry the
//! *cumulative* text seen so far rather than an incremental delta — we have
//! to diff each chunk against the last one we saw per block.

use std::collections::HashMap;

use ir::{
    BlockType, ContentBlock, ErrorType, InternalError, InternalRequest, InternalResponse, Message, Role,
    StopReason, StreamEvent, StreamState, ToolChoice, ToolChoiceType, ToolDefinition, UsageInfo,
};
use serde_json::{Value, json};

use crate::{Capabilities, Normalizer, NormalizeError, NormalizeResult};

#[derive(Default)]
pub struct GeminiChatNormalizer;

fn role_to_wire(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        _ => "user",
    }
}

fn role_from_wire(role: &str) -> Role {
    match role {
        "model" => Role::Assistant,
        "user" => Role::User,
        other => {
            log::warn!("unrecognized gemini:chat role {other}");
            Role::Unknown
        }
    }
}

fn part_to_wire(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text, .. } => json!({"text": text}),
        ContentBlock::Thinking { thinking, .. } => json!({"text": thinking, "thought": true}),
        ContentBlock::Image { data, media_type, .. } => json!({
            "inlineData": {"mimeType": media_type.clone().unwrap_or_else(|| "image/png".into()), "data": data},
        }),
        ContentBlock::ToolUse {
            tool_name, tool_input, ..
        } => json!({"functionCall": {"name": tool_name, "args": tool_input}}),
        ContentBlock::ToolResult {
            tool_name, output, content_text, ..
        } => json!({
            "functionResponse": {
                "name": tool_name.clone().unwrap_or_default(),
                "response": {"content": content_text.clone().map(Value::String).unwrap_or_else(|| output.clone())},
            },
        }),
        ContentBlock::File { filename, .. } => json!({"text": format!("[unsupported file: {}]", filename.as_deref().unwrap_or(""))}),
        ContentBlock::Audio { .. } => json!({"text": "[unsupported audio]"}),
        ContentBlock::Unknown { raw_type, .. } => json!({"text": format!("[unknown block: {raw_type}]")}),
    }
}

fn part_from_wire(part: &Value) -> Option<ContentBlock> {
    if let Some(text) = part.get("text").and_then(Value::as_str) {
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            return Some(ContentBlock::Thinking {
                thinking: text.to_string(),
                signature: None,
                extra: Default::default(),
            });
        }
        return Some(ContentBlock::text(text));
    }
    if let Some(call) = part.get("functionCall") {
        return Some(ContentBlock::ToolUse {
            tool_id: String::new(),
            tool_name: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            tool_input: call.get("args").cloned().unwrap_or(Value::Null),
            extra: Default::default(),
        });
    }
    if let Some(response) = part.get("functionResponse") {
        return Some(ContentBlock::ToolResult {
            tool_use_id: String::new(),
            tool_name: response.get("name").and_then(Value::as_str).map(str::to_string),
            output: response.get("response").cloned().unwrap_or(Value::Null),
            content_text: None,
            is_error: false,
            extra: Default::default(),
        });
    }
    if let Some(inline) = part.get("inlineData") {
        return Some(ContentBlock::Image {
            data: inline.get("data").and_then(Value::as_str).map(str::to_string),
            url: None,
            media_type: inline.get("mimeType").and_then(Value::as_str).map(str::to_string),
            extra: Default::default(),
        });
    }
    None
}

fn finish_reason_to_wire(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "STOP",
        StopReason::MaxTokens => "MAX_TOKENS",
        StopReason::ContentFiltered | StopReason::Refusal => "SAFETY",
        StopReason::ToolUse => "STOP",
        _ => "OTHER",
    }
}

fn finish_reason_from_wire(reason: &str) -> StopReason {
    match reason {
        "STOP" => StopReason::EndTurn,
        "MAX_TOKENS" => StopReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => StopReason::ContentFiltered,
        _ => StopReason::Unknown,
    }
}

#[derive(Default)]
struct GeminiStreamSubstate {
    /// Cumulative text already emitted per block index, so incoming
    /// cumulative snapshots can be diffed into a delta.
    emitted_text: HashMap<u32, String>,
    opened_blocks: HashMap<u32, bool>,
}

impl Normalizer for GeminiChatNormalizer {
    fn id(&self) -> &'static str {
        "gemini:chat"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_system_array: false,
            ..Capabilities::full()
        }
    }

    fn request_to_internal(&self, body: Value) -> NormalizeResult<InternalRequest> {
        let model = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or("gemini-pro")
            .to_string();

        let contents = body.get("contents").and_then(Value::as_array).cloned().unwrap_or_default();
        let messages = contents
            .iter()
            .map(|entry| {
                let role = role_from_wire(entry.get("role").and_then(Value::as_str).unwrap_or("user"));
                let parts = entry.get("parts").and_then(Value::as_array).cloned().unwrap_or_default();
                let content = parts.iter().filter_map(part_from_wire).collect();
                Message::new(role, content)
            })
            .collect();

        let mut request = InternalRequest::new(model, messages);

        if let Some(system) = body.get("systemInstruction") {
            let text = system
                .get("parts")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            request.system = Some(text);
        }

        if let Some(config) = body.get("generationConfig") {
            request.temperature = config.get("temperature").and_then(Value::as_f64).map(|v| v as f32);
            request.top_p = config.get("topP").and_then(Value::as_f64).map(|v| v as f32);
            request.top_k = config.get("topK").and_then(Value::as_u64).map(|v| v as u32);
            request.max_tokens = config.get("maxOutputTokens").and_then(Value::as_u64).map(|v| v as u32);
            request.n = config.get("candidateCount").and_then(Value::as_u64).map(|v| v as u32);
            request.stop_sequences = config
                .get("stopSequences")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());
        }

        if let Some(declarations) = body
            .get("tools")
            .and_then(Value::as_array)
            .and_then(|tools| tools.first())
            .and_then(|tool| tool.get("functionDeclarations"))
            .and_then(Value::as_array)
        {
            request.tools = Some(
                declarations
                    .iter()
                    .map(|decl| ToolDefinition {
                        name: decl.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                        description: decl.get("description").and_then(Value::as_str).map(str::to_string),
                        parameters: decl.get("parameters").cloned(),
                        extra: Default::default(),
                    })
                    .collect(),
            );
        }

        if let Some(mode) = body
            .get("toolConfig")
            .and_then(|c| c.get("functionCallingConfig"))
            .and_then(|c| c.get("mode"))
            .and_then(Value::as_str)
        {
            request.tool_choice = Some(ToolChoice {
                choice_type: match mode {
                    "ANY" => ToolChoiceType::Required,
                    "NONE" => ToolChoiceType::None,
                    _ => ToolChoiceType::Auto,
                },
                tool_name: None,
                extra: Default::default(),
            });
        }

        ir::repair_tool_call_ids(&mut request);
        Ok(request)
    }

    fn request_from_internal(&self, request: &InternalRequest) -> NormalizeResult<Value> {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .map(|message| {
                json!({
                    "role": role_to_wire(message.role),
                    "parts": message.content.iter().map(part_to_wire).collect::<Vec<_>>(),
                })
            })
            .collect();

        let mut body = json!({"contents": contents});

        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = request.top_p {
            generation_config.insert("topP".into(), json!(top_p));
        }
        if let Some(top_k) = request.top_k {
            generation_config.insert("topK".into(), json!(top_k));
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if let Some(stop) = &request.stop_sequences {
            generation_config.insert("stopSequences".into(), json!(stop));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        if let Some(tools) = &request.tools {
            body["tools"] = json!([{
                "functionDeclarations": tools.iter().map(|tool| json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                })).collect::<Vec<_>>(),
            }]);
        }

        if let Some(choice) = &request.tool_choice {
            let mode = match choice.choice_type {
                ToolChoiceType::Required => "ANY",
                ToolChoiceType::None => "NONE",
                _ => "AUTO",
            };
            body["toolConfig"] = json!({"functionCallingConfig": {"mode": mode}});
        }

        Ok(body)
    }

    fn response_to_internal(&self, body: Value) -> NormalizeResult<InternalResponse> {
        let candidate = body
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .cloned()
            .ok_or_else(|| NormalizeError::MalformedBody {
                format: self.id(),
                message: "missing candidates".into(),
            })?;

        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let content = parts.iter().filter_map(part_from_wire).collect();

        let mut response = InternalResponse::new(String::new(), String::new(), content);
        response.stop_reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .map(finish_reason_from_wire);
        if let Some(usage) = body.get("usageMetadata") {
            response.usage = UsageInfo::new(
                usage.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
                usage.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
            );
        }
        Ok(response)
    }

    fn response_from_internal(&self, response: &InternalResponse) -> NormalizeResult<Value> {
        Ok(json!({
            "candidates": [{
                "content": {"role": "model", "parts": response.content.iter().map(part_to_wire).collect::<Vec<_>>()},
                "finishReason": response.stop_reason.map(finish_reason_to_wire),
                "index": 0,
            }],
            "usageMetadata": {
                "promptTokenCount": response.usage.input_tokens,
                "candidatesTokenCount": response.usage.output_tokens,
                "totalTokenCount": response.usage.total_tokens,
            },
        }))
    }

    fn stream_chunk_to_internal(&self, chunk: Value, state: &mut StreamState) -> NormalizeResult<Vec<StreamEvent>> {
        let substate = state.substate::<GeminiStreamSubstate>("gemini:chat");
        let mut events = Vec::new();

        if substate.emitted_text.is_empty() && substate.opened_blocks.is_empty() {
            events.push(StreamEvent::MessageStart {
                message_id: state.message_id.clone(),
                model: state.model.clone(),
                usage: None,
            });
        }

        let candidate = chunk
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .cloned()
            .unwrap_or(Value::Null);
        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for (index, part) in parts.iter().enumerate() {
            let block_index = index as u32;
            if !substate.opened_blocks.contains_key(&block_index) {
                substate.opened_blocks.insert(block_index, true);
                let block_type = if part.get("functionCall").is_some() {
                    BlockType::ToolUse
                } else if part.get("thought").and_then(Value::as_bool) == Some(true) {
                    BlockType::Thinking
                } else {
                    BlockType::Text
                };
                let tool_name = part
                    .get("functionCall")
                    .and_then(|c| c.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                events.push(StreamEvent::ContentBlockStart {
                    block_index,
                    block_type,
                    tool_id: None,
                    tool_name,
                    extra: HashMap::new(),
                });
            }

            if let Some(text) = part.get("text").and_then(Value::as_str) {
                let previous = substate.emitted_text.entry(block_index).or_default();
                if let Some(delta) = text.strip_prefix(previous.as_str()) {
                    if !delta.is_empty() {
                        events.push(StreamEvent::ContentDelta {
                            block_index,
                            text_delta: delta.to_string(),
                            extra: HashMap::new(),
                        });
                    }
                    *previous = text.to_string();
                } else {
                    events.push(StreamEvent::ContentDelta {
                        block_index,
                        text_delta: text.to_string(),
                        extra: HashMap::new(),
                    });
                    *previous = text.to_string();
                }
            } else if let Some(call) = part.get("functionCall") {
                events.push(StreamEvent::ToolCallDelta {
                    block_index,
                    tool_id: String::new(),
                    input_delta: call.get("args").map(|v| v.to_string()).unwrap_or_default(),
                });
            }
        }

        if let Some(finish_reason) = candidate.get("finishReason").and_then(Value::as_str) {
            let usage = chunk.get("usageMetadata").map(|u| {
                UsageInfo::new(
                    u.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
                    u.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
                )
            });
            for block_index in substate.opened_blocks.keys().copied().collect::<Vec<_>>() {
                events.push(StreamEvent::ContentBlockStop { block_index });
            }
            events.push(StreamEvent::MessageStop {
                stop_reason: Some(finish_reason_from_wire(finish_reason)),
                usage,
            });
        }

        Ok(events)
    }

    fn stream_event_from_internal(&self, event: &StreamEvent, _state: &mut StreamState) -> NormalizeResult<Vec<Value>> {
        match event {
            StreamEvent::MessageStart { .. } | StreamEvent::ContentBlockStart { .. } | StreamEvent::ContentBlockStop { .. } => {
                Ok(vec![])
            }
            StreamEvent::ContentDelta { text_delta, .. } => Ok(vec![json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": text_delta}]}, "index": 0}],
            })]),
            StreamEvent::ToolCallDelta { tool_id: _, input_delta, .. } => Ok(vec![json!({
                "candidates": [{"content": {"role": "model", "parts": [{"functionCall": {"args": serde_json::from_str::<Value>(input_delta).unwrap_or(Value::Null)}}]}, "index": 0}],
            })]),
            StreamEvent::UsageEvent { .. } => Ok(vec![]),
            StreamEvent::MessageStop { stop_reason, usage } => Ok(vec![json!({
                "candidates": [{"finishReason": stop_reason.map(|r| finish_reason_to_wire(r)), "index": 0}],
                "usageMetadata": usage.as_ref().map(|u| json!({
                    "promptTokenCount": u.input_tokens,
                    "candidatesTokenCount": u.output_tokens,
                    "totalTokenCount": u.total_tokens,
                })),
            })]),
            StreamEvent::ErrorEvent { error } => Ok(vec![json!({
                "error": {"code": 500, "message": error.message, "status": error_type_to_wire_status(error.error_type)},
            })]),
            StreamEvent::UnknownStreamEvent { payload, .. } => Ok(vec![payload.clone()]),
        }
    }

    fn error_to_internal(&self, body: Value) -> NormalizeResult<InternalError> {
        let error = body.get("error").cloned().unwrap_or(body);
        let status = error.get("status").and_then(Value::as_str).unwrap_or("UNKNOWN");
        let error_type = match status {
            "INVALID_ARGUMENT" => ErrorType::InvalidRequest,
            "UNAUTHENTICATED" => ErrorType::Authentication,
            "PERMISSION_DENIED" => ErrorType::PermissionDenied,
            "NOT_FOUND" => ErrorType::NotFound,
            "RESOURCE_EXHAUSTED" => ErrorType::RateLimit,
            "UNAVAILABLE" => ErrorType::Overloaded,
            _ => ErrorType::ServerError,
        };
        Ok(InternalError::new(
            error_type,
            error.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
        ))
    }

    fn error_from_internal(&self, error: &InternalError) -> NormalizeResult<Value> {
        Ok(json!({
            "error": {"code": 500, "message": error.message, "status": error_type_to_wire_status(error.error_type)},
        }))
    }

    fn is_error_response(&self, body: &Value) -> bool {
        body.get("error").is_some() && body.get("candidates").is_none()
    }
}

fn error_type_to_wire_status(error_type: ErrorType) -> &'static str {
    match error_type {
        ErrorType::InvalidRequest | ErrorType::ContentFiltered | ErrorType::ContextLengthExceeded => "INVALID_ARGUMENT",
        ErrorType::Authentication => "UNAUTHENTICATED",
        ErrorType::PermissionDenied => "PERMISSION_DENIED",
        ErrorType::NotFound => "NOT_FOUND",
        ErrorType::RateLimit => "RESOURCE_EXHAUSTED",
        ErrorType::Overloaded => "UNAVAILABLE",
        ErrorType::ServerError | ErrorType::Unknown => "INTERNAL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_system_instruction_and_roles() {
        let normalizer = GeminiChatNormalizer;
        let body = json!({
            "systemInstruction": {"parts": [{"text": "be terse"}]},
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
        });

        let request = normalizer.request_to_internal(body).unwrap();
        assert_eq!(request.system.as_deref(), Some("be terse"));
        assert_eq!(request.messages[0].role, Role::User);
    }

    #[test]
    fn diffs_cumulative_stream_text_into_deltas() {
        let normalizer = GeminiChatNormalizer;
        let mut state = StreamState::new("gemini-1", "gemini-2.0-flash");

        let first = json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hel"}]}, "index": 0}]});
        let events_one = normalizer.stream_chunk_to_internal(first, &mut state).unwrap();
        assert!(events_one.iter().any(|e| matches!(e, StreamEvent::ContentDelta { text_delta, .. } if text_delta == "Hel")));

        let second = json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hello"}]}, "index": 0}]});
        let events_two = normalizer.stream_chunk_to_internal(second, &mut state).unwrap();
        assert!(events_two.iter().any(|e| matches!(e, StreamEvent::ContentDelta { text_delta, .. } if text_delta == "lo")));
    }
}
