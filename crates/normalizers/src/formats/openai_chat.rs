//! `openai:chat` — OpenAI's Chat Completions API.
//!
//! String-or-array content, a flat `tool_calls` array keyed by index rather
//! than nested blocks, and a `[DONE]`-terminated SSE stream. Grounded on
//! `messages/unified/from_openai.rs` and `provider/openai/input.rs`.

use std::collections::HashMap;

use ir::{
    BlockType, ContentBlock, ErrorType, InternalError, InternalRequest, InternalResponse, Message, Role,
    StopReason, StreamEvent, StreamState, ToolChoice, ToolChoiceType, ToolDefinition, UsageInfo,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Capabilities, Normalizer, NormalizeError, NormalizeResult};

#[derive(Default)]
pub struct OpenAiChatNormalizer;

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default)]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_str")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_str() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTool {
    #[serde(rename = "type", default = "function_str")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<Value>,
}

fn finish_reason_to_wire(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "stop",
        StopReason::MaxTokens => "length",
        StopReason::StopSequence => "stop",
        StopReason::ToolUse => "tool_calls",
        StopReason::ContentFiltered => "content_filter",
        StopReason::PauseTurn | StopReason::Refusal | StopReason::Unknown => "stop",
    }
}

fn finish_reason_from_wire(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::EndTurn,
        "length" => StopReason::MaxTokens,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "content_filter" => StopReason::ContentFiltered,
        _ => StopReason::Unknown,
    }
}

fn error_code_to_type(body: &Value) -> ErrorType {
    match body.get("error").and_then(|e| e.get("code")).and_then(Value::as_str) {
        Some("rate_limit_exceeded") => ErrorType::RateLimit,
        Some("context_length_exceeded") => ErrorType::ContextLengthExceeded,
        Some("invalid_api_key") => ErrorType::Authentication,
        _ => match body.get("error").and_then(|e| e.get("type")).and_then(Value::as_str) {
            Some("invalid_request_error") => ErrorType::InvalidRequest,
            Some("authentication_error") => ErrorType::Authentication,
            Some("permission_error") => ErrorType::PermissionDenied,
            Some("rate_limit_error") => ErrorType::RateLimit,
            Some("server_error") | Some("api_error") => ErrorType::ServerError,
            _ => ErrorType::Unknown,
        },
    }
}

fn error_type_to_wire(error_type: ErrorType) -> &'static str {
    match error_type {
        ErrorType::InvalidRequest | ErrorType::ContentFiltered | ErrorType::ContextLengthExceeded => {
            "invalid_request_error"
        }
        ErrorType::Authentication => "authentication_error",
        ErrorType::PermissionDenied => "permission_error",
        ErrorType::NotFound => "invalid_request_error",
        ErrorType::RateLimit => "rate_limit_error",
        ErrorType::Overloaded | ErrorType::ServerError | ErrorType::Unknown => "server_error",
    }
}

#[derive(Default)]
struct OpenAiStreamSubstate {
    /// claude tool indices are keyed by content block index; openai keys its
    /// `tool_calls` array by its own index. This maps one to the other so
    /// deltas land on the right array slot.
    tool_call_indices: HashMap<u32, usize>,
    role_sent: bool,
}

impl Normalizer for OpenAiChatNormalizer {
    fn id(&self) -> &'static str {
        "openai:chat"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_system_array: false,
            supports_thinking: false,
            ..Capabilities::full()
        }
    }

    fn request_to_internal(&self, body: Value) -> NormalizeResult<InternalRequest> {
        let model = body
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| NormalizeError::MalformedBody {
                format: self.id(),
                message: "missing model".into(),
            })?
            .to_string();

        let wire_messages: Vec<WireMessage> =
            serde_json::from_value(body.get("messages").cloned().unwrap_or(Value::Array(vec![]))).map_err(|e| {
                NormalizeError::MalformedBody {
                    format: self.id(),
                    message: e.to_string(),
                }
            })?;

        let mut system_texts = Vec::new();
        let mut messages = Vec::new();

        for wire in wire_messages {
            let role = match wire.role.as_str() {
                "system" | "developer" => {
                    if let Some(WireContent::Text(text)) = &wire.content {
                        system_texts.push(text.clone());
                    }
                    continue;
                }
                "user" => Role::User,
                "assistant" => Role::Assistant,
                "tool" => Role::Tool,
                other => {
                    log::warn!("unrecognized openai:chat role {other}");
                    Role::Unknown
                }
            };

            let mut content = match wire.content {
                Some(WireContent::Text(text)) if !text.is_empty() => vec![ContentBlock::text(text)],
                Some(WireContent::Parts(parts)) => parts
                    .into_iter()
                    .filter_map(|part| match part {
                        WirePart::Text { text } => Some(ContentBlock::text(text)),
                        WirePart::ImageUrl { image_url } => Some(ContentBlock::Image {
                            data: None,
                            url: Some(image_url.url),
                            media_type: None,
                            extra: Default::default(),
                        }),
                        WirePart::Unknown => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };

            if let Some(tool_call_id) = &wire.tool_call_id {
                let text = content
                    .iter()
                    .find_map(ContentBlock::as_text)
                    .map(str::to_string)
                    .unwrap_or_default();
                content = vec![ContentBlock::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    tool_name: None,
                    output: Value::String(text.clone()),
                    content_text: Some(text),
                    is_error: false,
                    extra: Default::default(),
                }];
            }

            if let Some(tool_calls) = wire.tool_calls {
                for call in tool_calls {
                    content.push(ContentBlock::ToolUse {
                        tool_id: call.id,
                        tool_name: call.function.name,
                        tool_input: serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null),
                        extra: Default::default(),
                    });
                }
            }

            messages.push(Message::new(role, content));
        }

        let mut request = InternalRequest::new(model, messages);
        if !system_texts.is_empty() {
            request.system = Some(system_texts.join("\n\n"));
        }

        request.max_tokens = body
            .get("max_completion_tokens")
            .or_else(|| body.get("max_tokens"))
            .and_then(Value::as_u64)
            .map(|v| v as u32);
        request.temperature = body.get("temperature").and_then(Value::as_f64).map(|v| v as f32);
        request.top_p = body.get("top_p").and_then(Value::as_f64).map(|v| v as f32);
        request.presence_penalty = body.get("presence_penalty").and_then(Value::as_f64).map(|v| v as f32);
        request.frequency_penalty = body.get("frequency_penalty").and_then(Value::as_f64).map(|v| v as f32);
        request.n = body.get("n").and_then(Value::as_u64).map(|v| v as u32);
        request.seed = body.get("seed").and_then(Value::as_i64);
        request.logprobs = body.get("logprobs").and_then(Value::as_bool);
        request.top_logprobs = body.get("top_logprobs").and_then(Value::as_u64).map(|v| v as u32);
        request.response_format = body.get("response_format").cloned();
        request.parallel_tool_calls = body.get("parallel_tool_calls").and_then(Value::as_bool);
        request.stream = body.get("stream").and_then(Value::as_bool);
        request.stop_sequences = match body.get("stop") {
            Some(Value::String(s)) => Some(vec![s.clone()]),
            Some(Value::Array(values)) => Some(values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()),
            _ => None,
        };

        if let Some(effort) = body.get("reasoning_effort").and_then(Value::as_str) {
            request.thinking = ir::thinking::effort_to_budget_tokens(effort).map(|budget_tokens| ir::ThinkingConfig {
                enabled: true,
                budget_tokens: Some(budget_tokens),
                extra: Default::default(),
            });
        }

        if let Some(tools) = body.get("tools").and_then(Value::as_array) {
            let wire_tools: Vec<WireTool> = tools
                .iter()
                .cloned()
                .map(serde_json::from_value)
                .collect::<Result<_, _>>()
                .map_err(|e: serde_json::Error| NormalizeError::MalformedBody {
                    format: self.id(),
                    message: e.to_string(),
                })?;
            request.tools = Some(
                wire_tools
                    .into_iter()
                    .map(|tool| ToolDefinition {
                        name: tool.function.name,
                        description: tool.function.description,
                        parameters: tool.function.parameters,
                        extra: Default::default(),
                    })
                    .collect(),
            );
        }

        if let Some(choice) = body.get("tool_choice") {
            request.tool_choice = Some(match choice {
                Value::String(mode) => ToolChoice {
                    choice_type: match mode.as_str() {
                        "required" => ToolChoiceType::Required,
                        "none" => ToolChoiceType::None,
                        _ => ToolChoiceType::Auto,
                    },
                    tool_name: None,
                    extra: Default::default(),
                },
                other => ToolChoice {
                    choice_type: ToolChoiceType::Tool,
                    tool_name: other
                        .get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    extra: Default::default(),
                },
            });
        }

        ir::repair_tool_call_ids(&mut request);
        Ok(request)
    }

    fn request_from_internal(&self, request: &InternalRequest) -> NormalizeResult<Value> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }

        for message in &request.messages {
            let text_blocks: Vec<&str> = message.content.iter().filter_map(ContentBlock::as_text).collect();
            let tool_calls: Vec<Value> = message
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse {
                        tool_id, tool_name, tool_input, ..
                    } => Some(json!({
                        "id": tool_id,
                        "type": "function",
                        "function": {"name": tool_name, "arguments": tool_input.to_string()},
                    })),
                    _ => None,
                })
                .collect();
            let tool_result = message.content.iter().find_map(|b| match b {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content_text,
                    output,
                    ..
                } => Some((tool_use_id.clone(), content_text.clone().unwrap_or_else(|| output.to_string()))),
                _ => None,
            });

            if let Some((tool_call_id, text)) = tool_result {
                messages.push(json!({"role": "tool", "tool_call_id": tool_call_id, "content": text}));
                continue;
            }

            let mut entry = json!({
                "role": match message.role {
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                    _ => "user",
                },
                "content": if text_blocks.is_empty() { Value::Null } else { json!(text_blocks.join("")) },
            });
            if !tool_calls.is_empty() {
                entry["tool_calls"] = json!(tool_calls);
            }
            messages.push(entry);
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_completion_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(stream) = request.stream {
            body["stream"] = json!(stream);
        }
        if let Some(stop) = &request.stop_sequences {
            body["stop"] = json!(stop);
        }
        if let Some(n) = request.n {
            body["n"] = json!(n);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = json!(
                tools
                    .iter()
                    .map(|tool| WireTool {
                        tool_type: "function".into(),
                        function: WireFunction {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.parameters.clone(),
                        },
                    })
                    .collect::<Vec<_>>()
            );
        }
        if let Some(thinking) = &request.thinking
            && let Some(budget) = thinking.budget_tokens
        {
            body["reasoning_effort"] = json!(ir::thinking::budget_tokens_to_effort(budget));
        }

        Ok(body)
    }

    fn response_to_internal(&self, body: Value) -> NormalizeResult<InternalResponse> {
        let id = body.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let model = body.get("model").and_then(Value::as_str).unwrap_or_default().to_string();
        let choice = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .cloned()
            .unwrap_or(Value::Null);
        let message: WireMessage = serde_json::from_value(choice.get("message").cloned().unwrap_or(Value::Null))
            .map_err(|e| NormalizeError::MalformedBody {
                format: self.id(),
                message: e.to_string(),
            })?;

        let mut content = Vec::new();
        match message.content {
            Some(WireContent::Text(text)) if !text.is_empty() => content.push(ContentBlock::text(text)),
            Some(WireContent::Parts(parts)) => {
                content.extend(parts.into_iter().filter_map(|part| match part {
                    WirePart::Text { text } => Some(ContentBlock::text(text)),
                    _ => None,
                }));
            }
            _ => {}
        }
        if let Some(tool_calls) = message.tool_calls {
            for call in tool_calls {
                content.push(ContentBlock::ToolUse {
                    tool_id: call.id,
                    tool_name: call.function.name,
                    tool_input: serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null),
                    extra: Default::default(),
                });
            }
        }

        let mut response = InternalResponse::new(id, model, content);
        response.stop_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(finish_reason_from_wire);
        if let Some(usage) = body.get("usage") {
            response.usage = UsageInfo::new(
                usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            );
        }
        Ok(response)
    }

    fn response_from_internal(&self, response: &InternalResponse) -> NormalizeResult<Value> {
        let text: String = response.content.iter().filter_map(ContentBlock::as_text).collect();
        let tool_calls: Vec<Value> = response
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse {
                    tool_id, tool_name, tool_input, ..
                } => Some(json!({
                    "id": tool_id,
                    "type": "function",
                    "function": {"name": tool_name, "arguments": tool_input.to_string()},
                })),
                _ => None,
            })
            .collect();

        let mut message = json!({
            "role": "assistant",
            "content": if text.is_empty() { Value::Null } else { json!(text) },
        });
        if !tool_calls.is_empty() {
            message["tool_calls"] = json!(tool_calls);
        }

        Ok(json!({
            "id": response.id,
            "object": "chat.completion",
            "model": response.model,
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": response.stop_reason.map(finish_reason_to_wire),
            }],
            "usage": {
                "prompt_tokens": response.usage.input_tokens,
                "completion_tokens": response.usage.output_tokens,
                "total_tokens": response.usage.total_tokens,
            },
        }))
    }

    fn stream_chunk_to_internal(&self, chunk: Value, state: &mut StreamState) -> NormalizeResult<Vec<StreamEvent>> {
        if chunk.get("id").and_then(Value::as_str).is_some() {
            state.message_id = chunk.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        }
        if let Some(model) = chunk.get("model").and_then(Value::as_str) {
            state.model = model.to_string();
        }

        let mut events = Vec::new();
        let choice = chunk
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .cloned()
            .unwrap_or(Value::Null);
        let delta = choice.get("delta").cloned().unwrap_or(Value::Null);

        if delta.get("role").is_some() {
            events.push(StreamEvent::MessageStart {
                message_id: state.message_id.clone(),
                model: state.model.clone(),
                usage: None,
            });
            events.push(StreamEvent::ContentBlockStart {
                block_index: 0,
                block_type: BlockType::Text,
                tool_id: None,
                tool_name: None,
                extra: HashMap::new(),
            });
        }

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            events.push(StreamEvent::ContentDelta {
                block_index: 0,
                text_delta: text.to_string(),
                extra: HashMap::new(),
            });
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in tool_calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as u32 + 1;
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    events.push(StreamEvent::ContentBlockStart {
                        block_index: index,
                        block_type: BlockType::ToolUse,
                        tool_id: Some(id.to_string()),
                        tool_name: call
                            .get("function")
                            .and_then(|f| f.get("name"))
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        extra: HashMap::new(),
                    });
                }
                if let Some(arguments) = call.get("function").and_then(|f| f.get("arguments")).and_then(Value::as_str) {
                    events.push(StreamEvent::ToolCallDelta {
                        block_index: index,
                        tool_id: call.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                        input_delta: arguments.to_string(),
                    });
                }
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            let usage = chunk.get("usage").map(|u| {
                UsageInfo::new(
                    u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                    u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                )
            });
            events.push(StreamEvent::MessageStop {
                stop_reason: Some(finish_reason_from_wire(reason)),
                usage,
            });
        }

        Ok(events)
    }

    fn stream_event_from_internal(&self, event: &StreamEvent, state: &mut StreamState) -> NormalizeResult<Vec<Value>> {
        let substate = state.substate::<OpenAiStreamSubstate>("openai:chat");
        let base = |delta: Value, finish_reason: Option<&str>| {
            json!({
                "id": state.message_id,
                "object": "chat.completion.chunk",
                "model": state.model,
                "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}],
            })
        };

        match event {
            StreamEvent::MessageStart { .. } => {
                if substate.role_sent {
                    return Ok(vec![]);
                }
                substate.role_sent = true;
                Ok(vec![base(json!({"role": "assistant", "content": ""}), None)])
            }
            StreamEvent::ContentBlockStart {
                tool_id: Some(tool_id),
                tool_name,
                block_index,
                ..
            } => {
                let array_index = substate.tool_call_indices.len();
                substate.tool_call_indices.insert(*block_index, array_index);
                Ok(vec![base(
                    json!({"tool_calls": [{"index": array_index, "id": tool_id, "type": "function", "function": {"name": tool_name, "arguments": ""}}]}),
                    None,
                )])
            }
            StreamEvent::ContentBlockStart { .. } | StreamEvent::ContentBlockStop { .. } => Ok(vec![]),
            StreamEvent::ContentDelta { text_delta, .. } => Ok(vec![base(json!({"content": text_delta}), None)]),
            StreamEvent::ToolCallDelta {
                block_index, input_delta, ..
            } => {
                let array_index = *substate.tool_call_indices.get(block_index).unwrap_or(&0);
                Ok(vec![base(
                    json!({"tool_calls": [{"index": array_index, "function": {"arguments": input_delta}}]}),
                    None,
                )])
            }
            StreamEvent::UsageEvent { .. } => Ok(vec![]),
            StreamEvent::MessageStop { stop_reason, .. } => Ok(vec![
                base(json!({}), Some(finish_reason_to_wire(stop_reason.unwrap_or(StopReason::EndTurn)))),
                Value::String("[DONE]".to_string()),
            ]),
            StreamEvent::ErrorEvent { error } => Ok(vec![json!({
                "error": {"type": error_type_to_wire(error.error_type), "message": error.message},
            })]),
            StreamEvent::UnknownStreamEvent { payload, .. } => Ok(vec![payload.clone()]),
        }
    }

    fn error_to_internal(&self, body: Value) -> NormalizeResult<InternalError> {
        let error_type = error_code_to_type(&body);
        let message = body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        Ok(InternalError::new(error_type, message))
    }

    fn error_from_internal(&self, error: &InternalError) -> NormalizeResult<Value> {
        Ok(json!({
            "error": {
                "message": error.message,
                "type": error_type_to_wire(error.error_type),
                "code": error.code,
            },
        }))
    }

    fn is_error_response(&self, body: &Value) -> bool {
        body.get("error").is_some() && body.get("choices").is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_system_message_into_system_field() {
        let normalizer = OpenAiChatNormalizer;
        let body = json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"},
            ],
        });

        let request = normalizer.request_to_internal(body).unwrap();
        assert_eq!(request.system.as_deref(), Some("be terse"));
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn maps_reasoning_effort_to_budget_tokens() {
        let normalizer = OpenAiChatNormalizer;
        let body = json!({
            "model": "o3",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "high",
        });

        let request = normalizer.request_to_internal(body).unwrap();
        assert_eq!(request.thinking.unwrap().budget_tokens, Some(4096));
    }
}
