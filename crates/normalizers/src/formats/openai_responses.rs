//! `openai:cli` — OpenAI's Responses API, as used by the `codex` CLI and the
//! `/v1/responses` endpoint. Heterogeneous `input` items (message / function
//! call / function call output) instead of a flat message array, and a
//! top-level `instructions` string instead of a system message.
//!
//! The `codex` conversion variant pins `stream: true, store: false` on every
//! outbound request regardless of what the client asked for, matching the
//! CLI's own hardcoded client behavior.

use std::collections::HashMap;

use ir::{
    BlockType, ContentBlock, ErrorType, InternalError, InternalRequest, InternalResponse, Message, Role,
    StopReason, StreamEvent, StreamState, ToolChoice, ToolChoiceType, ToolDefinition, UsageInfo,
};
use serde_json::{Value, json};

use crate::{Capabilities, Normalizer, NormalizeError, NormalizeResult};

pub struct OpenAiResponsesNormalizer {
    /// When true, `request_from_internal` forces `stream: true, store: false`
    /// the way the codex CLI's own client does.
    pub codex_variant: bool,
}

impl Default for OpenAiResponsesNormalizer {
    fn default() -> Self {
        Self { codex_variant: false }
    }
}

fn finish_reason_from_status(status: &str) -> StopReason {
    match status {
        "completed" => StopReason::EndTurn,
        "incomplete" => StopReason::MaxTokens,
        "failed" => StopReason::Unknown,
        _ => StopReason::Unknown,
    }
}

fn error_type_from_wire(error_type: &str) -> ErrorType {
    match error_type {
        "invalid_request_error" => ErrorType::InvalidRequest,
        "authentication_error" => ErrorType::Authentication,
        "permission_error" => ErrorType::PermissionDenied,
        "rate_limit_error" => ErrorType::RateLimit,
        "server_error" => ErrorType::ServerError,
        _ => ErrorType::Unknown,
    }
}

impl Normalizer for OpenAiResponsesNormalizer {
    fn id(&self) -> &'static str {
        "openai:cli"
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
            .ok_or_else(|| NormalizeError::MalformedBody {
                format: self.id(),
                message: "missing model".into(),
            })?
            .to_string();

        let items = body.get("input").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut messages = Vec::new();

        for item in items {
            let item_type = item.get("type").and_then(Value::as_str).unwrap_or("message");
            match item_type {
                "message" => {
                    let role = match item.get("role").and_then(Value::as_str) {
                        Some("assistant") => Role::Assistant,
                        Some("system") | Some("developer") => Role::Developer,
                        _ => Role::User,
                    };
                    let content = item
                        .get("content")
                        .and_then(Value::as_array)
                        .map(|parts| {
                            parts
                                .iter()
                                .filter_map(|part| part.get("text").and_then(Value::as_str))
                                .map(ContentBlock::text)
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default();
                    messages.push(Message::new(role, content));
                }
                "function_call" => {
                    messages.push(Message::new(
                        Role::Assistant,
                        vec![ContentBlock::ToolUse {
                            tool_id: item.get("call_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                            tool_name: item.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                            tool_input: item
                                .get("arguments")
                                .and_then(Value::as_str)
                                .and_then(|s| serde_json::from_str(s).ok())
                                .unwrap_or(Value::Null),
                            extra: Default::default(),
                        }],
                    ));
                }
                "function_call_output" => {
                    let output = item.get("output").cloned().unwrap_or(Value::Null);
                    let content_text = output.as_str().map(str::to_string);
                    messages.push(Message::new(
                        Role::Tool,
                        vec![ContentBlock::ToolResult {
                            tool_use_id: item.get("call_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                            tool_name: None,
                            output,
                            content_text,
                            is_error: false,
                            extra: Default::default(),
                        }],
                    ));
                }
                other => log::warn!("unrecognized openai:cli input item type {other}"),
            }
        }

        let mut request = InternalRequest::new(model, messages);
        request.system = body.get("instructions").and_then(Value::as_str).map(str::to_string);
        request.max_tokens = body.get("max_output_tokens").and_then(Value::as_u64).map(|v| v as u32);
        request.temperature = body.get("temperature").and_then(Value::as_f64).map(|v| v as f32);
        request.top_p = body.get("top_p").and_then(Value::as_f64).map(|v| v as f32);
        request.stream = body.get("stream").and_then(Value::as_bool);
        request.parallel_tool_calls = body.get("parallel_tool_calls").and_then(Value::as_bool);

        if let Some(effort) = body.get("reasoning").and_then(|r| r.get("effort")).and_then(Value::as_str) {
            request.thinking = ir::thinking::effort_to_budget_tokens(effort).map(|budget_tokens| ir::ThinkingConfig {
                enabled: true,
                budget_tokens: Some(budget_tokens),
                extra: Default::default(),
            });
        }

        if let Some(tools) = body.get("tools").and_then(Value::as_array) {
            request.tools = Some(
                tools
                    .iter()
                    .map(|tool| ToolDefinition {
                        name: tool.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                        description: tool.get("description").and_then(Value::as_str).map(str::to_string),
                        parameters: tool.get("parameters").cloned(),
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
                    tool_name: other.get("name").and_then(Value::as_str).map(str::to_string),
                    extra: Default::default(),
                },
            });
        }

        ir::repair_tool_call_ids(&mut request);
        Ok(request)
    }

    fn request_from_internal(&self, request: &InternalRequest) -> NormalizeResult<Value> {
        let mut input = Vec::new();
        for message in &request.messages {
            let tool_use = message.content.iter().find_map(|b| match b {
                ContentBlock::ToolUse {
                    tool_id, tool_name, tool_input, ..
                } => Some((tool_id.clone(), tool_name.clone(), tool_input.clone())),
                _ => None,
            });
            if let Some((call_id, name, arguments)) = tool_use {
                input.push(json!({
                    "type": "function_call",
                    "call_id": call_id,
                    "name": name,
                    "arguments": arguments.to_string(),
                }));
                continue;
            }

            let tool_result = message.content.iter().find_map(|b| match b {
                ContentBlock::ToolResult {
                    tool_use_id, content_text, output, ..
                } => Some((tool_use_id.clone(), content_text.clone().unwrap_or_else(|| output.to_string()))),
                _ => None,
            });
            if let Some((call_id, output)) = tool_result {
                input.push(json!({"type": "function_call_output", "call_id": call_id, "output": output}));
                continue;
            }

            let text: String = message.content.iter().filter_map(ContentBlock::as_text).collect();
            input.push(json!({
                "type": "message",
                "role": match message.role { Role::Assistant => "assistant", _ => "user" },
                "content": [{"type": if message.role == Role::Assistant { "output_text" } else { "input_text" }, "text": text}],
            }));
        }

        let mut body = json!({
            "model": request.model,
            "input": input,
        });
        if let Some(system) = &request.system {
            body["instructions"] = json!(system);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_output_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = json!(
                tools
                    .iter()
                    .map(|tool| json!({"type": "function", "name": tool.name, "description": tool.description, "parameters": tool.parameters}))
                    .collect::<Vec<_>>()
            );
        }
        if let Some(thinking) = &request.thinking
            && let Some(budget) = thinking.budget_tokens
        {
            body["reasoning"] = json!({"effort": ir::thinking::budget_tokens_to_effort(budget)});
        }

        if self.codex_variant {
            body["stream"] = json!(true);
            body["store"] = json!(false);
        } else if let Some(stream) = request.stream {
            body["stream"] = json!(stream);
        }

        Ok(body)
    }

    fn response_to_internal(&self, body: Value) -> NormalizeResult<InternalResponse> {
        let id = body.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let model = body.get("model").and_then(Value::as_str).unwrap_or_default().to_string();
        let output = body.get("output").and_then(Value::as_array).cloned().unwrap_or_default();

        let mut content = Vec::new();
        for item in output {
            match item.get("type").and_then(Value::as_str) {
                Some("message") => {
                    if let Some(parts) = item.get("content").and_then(Value::as_array) {
                        content.extend(
                            parts
                                .iter()
                                .filter_map(|p| p.get("text").and_then(Value::as_str))
                                .map(ContentBlock::text),
                        );
                    }
                }
                Some("function_call") => content.push(ContentBlock::ToolUse {
                    tool_id: item.get("call_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    tool_name: item.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    tool_input: item
                        .get("arguments")
                        .and_then(Value::as_str)
                        .and_then(|s| serde_json::from_str(s).ok())
                        .unwrap_or(Value::Null),
                    extra: Default::default(),
                }),
                _ => {}
            }
        }

        let mut response = InternalResponse::new(id, model, content);
        response.stop_reason = body.get("status").and_then(Value::as_str).map(finish_reason_from_status);
        if let Some(usage) = body.get("usage") {
            response.usage = UsageInfo::new(
                usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            );
        }
        Ok(response)
    }

    fn response_from_internal(&self, response: &InternalResponse) -> NormalizeResult<Value> {
        let text: String = response.content.iter().filter_map(ContentBlock::as_text).collect();
        let mut output = vec![json!({
            "type": "message",
            "role": "assistant",
            "content": [{"type": "output_text", "text": text}],
        })];
        for block in &response.content {
            if let ContentBlock::ToolUse {
                tool_id, tool_name, tool_input, ..
            } = block
            {
                output.push(json!({
                    "type": "function_call",
                    "call_id": tool_id,
                    "name": tool_name,
                    "arguments": tool_input.to_string(),
                }));
            }
        }

        Ok(json!({
            "id": response.id,
            "model": response.model,
            "status": "completed",
            "output": output,
            "usage": {
                "input_tokens": response.usage.input_tokens,
                "output_tokens": response.usage.output_tokens,
                "total_tokens": response.usage.total_tokens,
            },
        }))
    }

    fn stream_chunk_to_internal(&self, chunk: Value, state: &mut StreamState) -> NormalizeResult<Vec<StreamEvent>> {
        let event_type = chunk.get("type").and_then(Value::as_str).unwrap_or("");
        match event_type {
            "response.created" => {
                if let Some(id) = chunk.get("response").and_then(|r| r.get("id")).and_then(Value::as_str) {
                    state.message_id = id.to_string();
                }
                Ok(vec![StreamEvent::MessageStart {
                    message_id: state.message_id.clone(),
                    model: state.model.clone(),
                    usage: None,
                }])
            }
            "response.output_item.added" => {
                let index = chunk.get("output_index").and_then(Value::as_u64).unwrap_or(0) as u32;
                let item = chunk.get("item").cloned().unwrap_or(Value::Null);
                let block_type = if item.get("type").and_then(Value::as_str) == Some("function_call") {
                    BlockType::ToolUse
                } else {
                    BlockType::Text
                };
                Ok(vec![StreamEvent::ContentBlockStart {
                    block_index: index,
                    block_type,
                    tool_id: item.get("call_id").and_then(Value::as_str).map(str::to_string),
                    tool_name: item.get("name").and_then(Value::as_str).map(str::to_string),
                    extra: HashMap::new(),
                }])
            }
            "response.output_text.delta" => Ok(vec![StreamEvent::ContentDelta {
                block_index: chunk.get("output_index").and_then(Value::as_u64).unwrap_or(0) as u32,
                text_delta: chunk.get("delta").and_then(Value::as_str).unwrap_or("").to_string(),
                extra: HashMap::new(),
            }]),
            "response.function_call_arguments.delta" => Ok(vec![StreamEvent::ToolCallDelta {
                block_index: chunk.get("output_index").and_then(Value::as_u64).unwrap_or(0) as u32,
                tool_id: String::new(),
                input_delta: chunk.get("delta").and_then(Value::as_str).unwrap_or("").to_string(),
            }]),
            "response.output_item.done" => Ok(vec![StreamEvent::ContentBlockStop {
                block_index: chunk.get("output_index").and_then(Value::as_u64).unwrap_or(0) as u32,
            }]),
            "response.completed" => {
                let usage = chunk
                    .get("response")
                    .and_then(|r| r.get("usage"))
                    .map(|u| {
                        UsageInfo::new(
                            u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                            u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                        )
                    });
                Ok(vec![StreamEvent::MessageStop {
                    stop_reason: Some(StopReason::EndTurn),
                    usage,
                }])
            }
            "error" => Ok(vec![StreamEvent::ErrorEvent {
                error: InternalError::new(
                    error_type_from_wire(chunk.get("code").and_then(Value::as_str).unwrap_or("server_error")),
                    chunk.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
                ),
            }]),
            other => Ok(vec![StreamEvent::UnknownStreamEvent {
                raw_type: other.to_string(),
                payload: chunk,
            }]),
        }
    }

    fn stream_event_from_internal(&self, event: &StreamEvent, state: &mut StreamState) -> NormalizeResult<Vec<Value>> {
        match event {
            StreamEvent::MessageStart { message_id, .. } => Ok(vec![json!({
                "type": "response.created",
                "response": {"id": message_id, "status": "in_progress"},
            })]),
            StreamEvent::ContentBlockStart {
                block_index,
                block_type,
                tool_id,
                tool_name,
                ..
            } => Ok(vec![json!({
                "type": "response.output_item.added",
                "output_index": block_index,
                "item": match block_type {
                    BlockType::ToolUse => json!({"type": "function_call", "call_id": tool_id, "name": tool_name}),
                    _ => json!({"type": "message", "role": "assistant"}),
                },
            })]),
            StreamEvent::ContentDelta { block_index, text_delta, .. } => Ok(vec![json!({
                "type": "response.output_text.delta",
                "output_index": block_index,
                "delta": text_delta,
            })]),
            StreamEvent::ToolCallDelta { block_index, input_delta, .. } => Ok(vec![json!({
                "type": "response.function_call_arguments.delta",
                "output_index": block_index,
                "delta": input_delta,
            })]),
            StreamEvent::ContentBlockStop { block_index } => Ok(vec![json!({
                "type": "response.output_item.done",
                "output_index": block_index,
            })]),
            StreamEvent::UsageEvent { .. } => Ok(vec![]),
            StreamEvent::MessageStop { usage, .. } => Ok(vec![json!({
                "type": "response.completed",
                "response": {
                    "id": state.message_id,
                    "status": "completed",
                    "usage": usage.as_ref().map(|u| json!({"input_tokens": u.input_tokens, "output_tokens": u.output_tokens, "total_tokens": u.total_tokens})),
                },
            })]),
            StreamEvent::ErrorEvent { error } => Ok(vec![json!({
                "type": "error",
                "code": error_type_to_code(error.error_type),
                "message": error.message,
            })]),
            StreamEvent::UnknownStreamEvent { payload, .. } => Ok(vec![payload.clone()]),
        }
    }

    fn error_to_internal(&self, body: Value) -> NormalizeResult<InternalError> {
        let error = body.get("error").cloned().unwrap_or(body);
        Ok(InternalError::new(
            error_type_from_wire(error.get("type").and_then(Value::as_str).unwrap_or("server_error")),
            error.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
        ))
    }

    fn error_from_internal(&self, error: &InternalError) -> NormalizeResult<Value> {
        Ok(json!({"error": {"type": error_type_to_code(error.error_type), "message": error.message}}))
    }

    fn is_error_response(&self, body: &Value) -> bool {
        body.get("error").is_some() && body.get("output").is_none()
    }
}

fn error_type_to_code(error_type: ErrorType) -> &'static str {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_message_input_items() {
        let normalizer = OpenAiResponsesNormalizer::default();
        let body = json!({
            "model": "gpt-5-codex",
            "instructions": "be terse",
            "input": [{"type": "message", "role": "user", "content": [{"type": "input_text", "text": "hi"}]}],
        });

        let request = normalizer.request_to_internal(body).unwrap();
        assert_eq!(request.system.as_deref(), Some("be terse"));
        assert_eq!(request.messages[0].content[0].as_text(), Some("hi"));
    }

    #[test]
    fn codex_variant_forces_stream_and_store() {
        let normalizer = OpenAiResponsesNormalizer { codex_variant: true };
        let request = InternalRequest::new("gpt-5-codex", vec![Message::text(Role::User, "hi")]);
        let body = normalizer.request_from_internal(&request).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["store"], false);
    }
}
