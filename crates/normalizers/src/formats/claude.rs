//! `claude:chat` — Anthropic's native Messages API
//! (<https://docs.anthropic.com/en/api/messages>).
//!
//! Closest format to the canonical representation: blocks, a dedicated
//! `system` field, and a typed streaming event sequence that maps almost
//! one-to-one onto [`ir::StreamEvent`]. Grounded on the wire shapes in
//! `provider/anthropic/output.rs` and `provider/anthropic/input.rs`.

use std::collections::HashMap;

use ir::{
    BlockType, ContentBlock, ErrorType, InstructionRole, InstructionSegment, InternalError,
    InternalRequest, InternalResponse, Message, Role, StopReason, StreamEvent, StreamState, ThinkingConfig,
    ToolChoice, ToolChoiceType, ToolDefinition, UsageInfo,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Capabilities, Normalizer, NormalizeError, NormalizeResult};

#[derive(Default)]
pub struct ClaudeChatNormalizer;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireSystem {
    Text(String),
    Blocks(Vec<WireSystemBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
struct WireSystemBlock {
    #[serde(default)]
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_control: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: WireContentContainer,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireContentContainer {
    Text(String),
    Blocks(Vec<WireBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<Value>,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    Image {
        source: Value,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<WireContentContainer>,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireToolChoice {
    Mode {
        #[serde(rename = "type")]
        choice_type: String,
    },
    Named {
        #[serde(rename = "type")]
        choice_type: String,
        name: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct WireThinking {
    #[serde(rename = "type")]
    thinking_type: String,
    #[serde(default)]
    budget_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
}

impl From<WireUsage> for UsageInfo {
    fn from(usage: WireUsage) -> Self {
        let mut info = UsageInfo::new(usage.input_tokens, usage.output_tokens);
        info.cache_read_tokens = usage.cache_read_input_tokens;
        info.cache_write_tokens = usage.cache_creation_input_tokens;
        info
    }
}

/// Claude rejects two consecutive messages with the same role; fold them
/// into one, concatenating content blocks in order.
fn merge_consecutive_same_role(messages: Vec<WireMessage>) -> Vec<WireMessage> {
    let mut merged: Vec<WireMessage> = Vec::with_capacity(messages.len());

    for message in messages {
        match merged.last_mut() {
            Some(last) if last.role == message.role => match (&mut last.content, message.content) {
                (WireContentContainer::Blocks(existing), WireContentContainer::Blocks(mut incoming)) => {
                    existing.append(&mut incoming);
                }
                (_, content) => {
                    let role = last.role.clone();
                    merged.push(WireMessage { role, content });
                }
            },
            _ => merged.push(message),
        }
    }

    merged
}

/// Claude requires the conversation to open with a `user` turn; a request
/// that starts with `assistant` (common when replaying a prior response as
/// context) gets an empty `user` message prepended.
fn prefix_empty_user_if_needed(mut messages: Vec<WireMessage>) -> Vec<WireMessage> {
    if messages.first().is_some_and(|m| m.role != "user") {
        messages.insert(
            0,
            WireMessage {
                role: "user".to_string(),
                content: WireContentContainer::Blocks(Vec::new()),
            },
        );
    }

    messages
}

fn role_to_wire(role: Role) -> &'static str {
    match role {
        Role::Assistant => "assistant",
        // claude:chat has no tool/system/developer role; tool results ride
        // inside a user message's content blocks.
        _ => "user",
    }
}

fn role_from_wire(role: &str) -> Role {
    match role {
        "assistant" => Role::Assistant,
        "user" => Role::User,
        other => {
            log::warn!("unrecognized claude:chat role {other}");
            Role::Unknown
        }
    }
}

fn block_to_wire(block: &ContentBlock) -> WireBlock {
    match block {
        ContentBlock::Text { text, extra } => WireBlock::Text {
            text: text.clone(),
            cache_control: extra.get("cache_control").cloned(),
        },
        ContentBlock::Thinking { thinking, signature, .. } => WireBlock::Thinking {
            thinking: thinking.clone(),
            signature: signature.clone(),
        },
        ContentBlock::Image { data, url, media_type, .. } => WireBlock::Image {
            source: if let Some(data) = data {
                json!({"type": "base64", "media_type": media_type, "data": data})
            } else {
                json!({"type": "url", "url": url})
            },
        },
        ContentBlock::ToolUse {
            tool_id,
            tool_name,
            tool_input,
            ..
        } => WireBlock::ToolUse {
            id: tool_id.clone(),
            name: tool_name.clone(),
            input: tool_input.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            output,
            content_text,
            is_error,
            ..
        } => WireBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: Some(WireContentContainer::Text(
                content_text.clone().unwrap_or_else(|| output.to_string()),
            )),
            is_error: *is_error,
        },
        ContentBlock::File { filename, .. } => WireBlock::Text {
            text: format!("[unsupported file block: {}]", filename.as_deref().unwrap_or("unnamed")),
            cache_control: None,
        },
        ContentBlock::Audio { .. } => WireBlock::Text {
            text: "[unsupported audio block]".to_string(),
            cache_control: None,
        },
        ContentBlock::Unknown { raw_type, .. } => WireBlock::Text {
            text: format!("[unknown block: {raw_type}]"),
            cache_control: None,
        },
    }
}

fn block_from_wire(block: WireBlock) -> Option<ContentBlock> {
    match block {
        WireBlock::Text { text, cache_control } => Some(match cache_control {
            Some(cache_control) => {
                let mut extra = HashMap::new();
                extra.insert("cache_control".to_string(), cache_control);
                ContentBlock::Text { text, extra }
            }
            None => ContentBlock::text(text),
        }),
        WireBlock::Thinking { thinking, signature } => Some(ContentBlock::Thinking {
            thinking,
            signature,
            extra: Default::default(),
        }),
        WireBlock::Image { source } => Some(ContentBlock::Image {
            data: source.get("data").and_then(Value::as_str).map(str::to_string),
            url: source.get("url").and_then(Value::as_str).map(str::to_string),
            media_type: source.get("media_type").and_then(Value::as_str).map(str::to_string),
            extra: Default::default(),
        }),
        WireBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse {
            tool_id: id,
            tool_name: name,
            tool_input: input,
            extra: Default::default(),
        }),
        WireBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let content_text = content.map(|c| match c {
                WireContentContainer::Text(text) => text,
                WireContentContainer::Blocks(blocks) => blocks
                    .into_iter()
                    .filter_map(|b| match b {
                        WireBlock::Text { text, .. } => Some(text),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(""),
            });
            Some(ContentBlock::ToolResult {
                tool_use_id,
                tool_name: None,
                output: content_text.clone().map(Value::String).unwrap_or(Value::Null),
                content_text,
                is_error,
                extra: Default::default(),
            })
        }
        WireBlock::Unknown => None,
    }
}

fn stop_reason_to_wire(reason: StopReason) -> Option<&'static str> {
    Some(match reason {
        StopReason::EndTurn => "end_turn",
        StopReason::MaxTokens => "max_tokens",
        StopReason::StopSequence => "stop_sequence",
        StopReason::ToolUse => "tool_use",
        StopReason::PauseTurn => "pause_turn",
        StopReason::Refusal => "refusal",
        StopReason::ContentFiltered => "refusal",
        StopReason::Unknown => return None,
    })
}

fn stop_reason_from_wire(reason: &str) -> StopReason {
    match reason {
        "end_turn" => StopReason::EndTurn,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        "tool_use" => StopReason::ToolUse,
        "pause_turn" => StopReason::PauseTurn,
        "refusal" => StopReason::Refusal,
        _ => StopReason::Unknown,
    }
}

fn error_type_to_wire(error_type: ErrorType) -> &'static str {
    match error_type {
        ErrorType::InvalidRequest => "invalid_request_error",
        ErrorType::Authentication => "authentication_error",
        ErrorType::PermissionDenied => "permission_error",
        ErrorType::NotFound => "not_found_error",
        ErrorType::RateLimit => "rate_limit_error",
        ErrorType::Overloaded => "overloaded_error",
        ErrorType::ServerError => "api_error",
        ErrorType::ContentFiltered => "invalid_request_error",
        ErrorType::ContextLengthExceeded => "invalid_request_error",
        ErrorType::Unknown => "api_error",
    }
}

fn error_type_from_wire(error_type: &str) -> ErrorType {
    match error_type {
        "invalid_request_error" => ErrorType::InvalidRequest,
        "authentication_error" => ErrorType::Authentication,
        "permission_error" => ErrorType::PermissionDenied,
        "not_found_error" => ErrorType::NotFound,
        "rate_limit_error" => ErrorType::RateLimit,
        "overloaded_error" => ErrorType::Overloaded,
        "api_error" => ErrorType::ServerError,
        _ => ErrorType::Unknown,
    }
}

#[derive(Default)]
struct ClaudeStreamSubstate {
    next_block_index: u32,
}

impl Normalizer for ClaudeChatNormalizer {
    fn id(&self) -> &'static str {
        "claude:chat"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::full()
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

        let messages = wire_messages
            .into_iter()
            .map(|message| {
                let content = match message.content {
                    WireContentContainer::Text(text) => vec![ContentBlock::text(text)],
                    WireContentContainer::Blocks(blocks) => blocks.into_iter().filter_map(block_from_wire).collect(),
                };
                Message::new(role_from_wire(&message.role), content)
            })
            .collect::<Vec<_>>();

        let mut request = InternalRequest::new(model, messages);

        if let Some(system) = body.get("system") {
            let wire_system: WireSystem = serde_json::from_value(system.clone()).unwrap_or(WireSystem::Text(String::new()));
            request.instructions = match wire_system {
                WireSystem::Text(text) => vec![InstructionSegment {
                    role: InstructionRole::System,
                    text,
                    extra: Default::default(),
                }],
                WireSystem::Blocks(blocks) => blocks
                    .into_iter()
                    .map(|b| {
                        let mut extra = HashMap::new();
                        if let Some(cache_control) = b.cache_control {
                            extra.insert("cache_control".to_string(), cache_control);
                        }
                        InstructionSegment {
                            role: InstructionRole::System,
                            text: b.text,
                            extra,
                        }
                    })
                    .collect(),
            };
            request.sync_system_from_instructions();
        }

        request.max_tokens = body.get("max_tokens").and_then(Value::as_u64).map(|v| v as u32);
        request.temperature = body.get("temperature").and_then(Value::as_f64).map(|v| v as f32);
        request.top_p = body.get("top_p").and_then(Value::as_f64).map(|v| v as f32);
        request.top_k = body.get("top_k").and_then(Value::as_u64).map(|v| v as u32);
        request.stop_sequences = body
            .get("stop_sequences")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());
        request.stream = body.get("stream").and_then(Value::as_bool);

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
                        name: tool.name,
                        description: tool.description,
                        parameters: Some(tool.input_schema),
                        extra: Default::default(),
                    })
                    .collect(),
            );
        }

        if let Some(choice) = body.get("tool_choice") {
            let wire_choice: WireToolChoice =
                serde_json::from_value(choice.clone()).unwrap_or(WireToolChoice::Mode { choice_type: "auto".into() });
            request.tool_choice = Some(match wire_choice {
                WireToolChoice::Mode { choice_type } => ToolChoice {
                    choice_type: match choice_type.as_str() {
                        "any" => ToolChoiceType::Required,
                        "none" => ToolChoiceType::None,
                        _ => ToolChoiceType::Auto,
                    },
                    tool_name: None,
                    extra: Default::default(),
                },
                WireToolChoice::Named { name, .. } => ToolChoice {
                    choice_type: ToolChoiceType::Tool,
                    tool_name: Some(name),
                    extra: Default::default(),
                },
            });
        }

        if let Some(thinking) = body.get("thinking") {
            let wire: WireThinking = serde_json::from_value(thinking.clone()).map_err(|e| NormalizeError::MalformedBody {
                format: self.id(),
                message: e.to_string(),
            })?;
            request.thinking = Some(ThinkingConfig {
                enabled: wire.thinking_type == "enabled",
                budget_tokens: wire.budget_tokens,
                extra: Default::default(),
            });
        }

        Ok(request)
    }

    fn request_from_internal(&self, request: &InternalRequest) -> NormalizeResult<Value> {
        let messages: Vec<WireMessage> = request
            .messages
            .iter()
            .map(|message| WireMessage {
                role: role_to_wire(message.role).to_string(),
                content: WireContentContainer::Blocks(message.content.iter().map(block_to_wire).collect()),
            })
            .collect();
        let messages = merge_consecutive_same_role(messages);
        let messages = prefix_empty_user_if_needed(messages);

        let max_tokens = request
            .max_tokens
            .or_else(|| request.extra.get("output_limit").and_then(Value::as_u64).map(|v| v as u32))
            .unwrap_or(8192);

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": max_tokens,
        });

        if !request.instructions.is_empty() {
            let blocks: Vec<WireSystemBlock> = request
                .instructions
                .iter()
                .map(|segment| WireSystemBlock {
                    text: segment.text.clone(),
                    cache_control: segment.extra.get("cache_control").cloned(),
                })
                .collect();
            let any_cache_control = blocks.iter().any(|b| b.cache_control.is_some());
            body["system"] = if blocks.len() == 1 && !any_cache_control {
                json!(blocks[0].text)
            } else {
                serde_json::to_value(blocks)?
            };
        } else if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(top_k) = request.top_k {
            body["top_k"] = json!(top_k);
        }
        if let Some(stop) = &request.stop_sequences {
            body["stop_sequences"] = json!(stop);
        }
        if let Some(stream) = request.stream {
            body["stream"] = json!(stream);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = json!(
                tools
                    .iter()
                    .map(|tool| WireTool {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        input_schema: tool.parameters.clone().unwrap_or(json!({"type": "object", "properties": {}})),
                    })
                    .collect::<Vec<_>>()
            );
        }
        if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = match choice.choice_type {
                ToolChoiceType::Auto => json!({"type": "auto"}),
                ToolChoiceType::None => json!({"type": "none"}),
                ToolChoiceType::Required => json!({"type": "any"}),
                ToolChoiceType::Tool => json!({"type": "tool", "name": choice.tool_name}),
            };
        }
        if let Some(thinking) = &request.thinking {
            let budget_tokens = if thinking.enabled {
                thinking.budget_tokens.map(|budget_tokens| {
                    let budget_tokens = budget_tokens.max(1024);
                    if budget_tokens >= max_tokens {
                        body["max_tokens"] = json!(budget_tokens + 1);
                    }
                    budget_tokens
                })
            } else {
                thinking.budget_tokens
            };
            body["thinking"] = json!({
                "type": if thinking.enabled { "enabled" } else { "disabled" },
                "budget_tokens": budget_tokens,
            });
        }

        Ok(body)
    }

    fn response_to_internal(&self, body: Value) -> NormalizeResult<InternalResponse> {
        let id = body.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let model = body.get("model").and_then(Value::as_str).unwrap_or_default().to_string();
        let blocks: Vec<WireBlock> = serde_json::from_value(body.get("content").cloned().unwrap_or(Value::Array(vec![])))
            .map_err(|e| NormalizeError::MalformedBody {
                format: self.id(),
                message: e.to_string(),
            })?;
        let content = blocks.into_iter().filter_map(block_from_wire).collect();

        let usage: WireUsage = body
            .get("usage")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| NormalizeError::MalformedBody {
                format: self.id(),
                message: e.to_string(),
            })?
            .unwrap_or(WireUsage {
                input_tokens: 0,
                output_tokens: 0,
                cache_read_input_tokens: 0,
                cache_creation_input_tokens: 0,
            });

        let mut response = InternalResponse::new(id, model, content);
        response.usage = usage.into();
        response.stop_reason = body
            .get("stop_reason")
            .and_then(Value::as_str)
            .map(stop_reason_from_wire);
        Ok(response)
    }

    fn response_from_internal(&self, response: &InternalResponse) -> NormalizeResult<Value> {
        let content: Vec<WireBlock> = response.content.iter().map(block_to_wire).collect();
        Ok(json!({
            "id": response.id,
            "type": "message",
            "role": "assistant",
            "model": response.model,
            "content": content,
            "stop_reason": response.stop_reason.and_then(stop_reason_to_wire),
            "stop_sequence": Value::Null,
            "usage": {
                "input_tokens": response.usage.input_tokens,
                "output_tokens": response.usage.output_tokens,
                "cache_read_input_tokens": response.usage.cache_read_tokens,
                "cache_creation_input_tokens": response.usage.cache_write_tokens,
            },
        }))
    }

    fn stream_chunk_to_internal(&self, chunk: Value, state: &mut StreamState) -> NormalizeResult<Vec<StreamEvent>> {
        let event_type = chunk.get("type").and_then(Value::as_str).unwrap_or("");
        match event_type {
            "message_start" => {
                let message = chunk.get("message").cloned().unwrap_or(Value::Null);
                state.message_id = message
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or(&state.message_id)
                    .to_string();
                let model = message.get("model").and_then(Value::as_str).map(str::to_string);
                if let Some(model) = &model {
                    state.model = model.clone();
                }
                let usage: Option<UsageInfo> = message
                    .get("usage")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<WireUsage>(v).ok())
                    .map(Into::into);
                Ok(vec![StreamEvent::MessageStart {
                    message_id: state.message_id.clone(),
                    model: state.model.clone(),
                    usage,
                }])
            }
            "content_block_start" => {
                let index = chunk.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
                let block: WireBlock = serde_json::from_value(chunk.get("content_block").cloned().unwrap_or(Value::Null))
                    .unwrap_or(WireBlock::Unknown);
                let (block_type, tool_id, tool_name) = match &block {
                    WireBlock::Text { .. } => (BlockType::Text, None, None),
                    WireBlock::Thinking { .. } => (BlockType::Thinking, None, None),
                    WireBlock::ToolUse { id, name, .. } => (BlockType::ToolUse, Some(id.clone()), Some(name.clone())),
                    _ => (BlockType::Text, None, None),
                };
                Ok(vec![StreamEvent::ContentBlockStart {
                    block_index: index,
                    block_type,
                    tool_id,
                    tool_name,
                    extra: HashMap::new(),
                }])
            }
            "content_block_delta" => {
                let index = chunk.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
                let delta = chunk.get("delta").cloned().unwrap_or(Value::Null);
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => Ok(vec![StreamEvent::ContentDelta {
                        block_index: index,
                        text_delta: delta.get("text").and_then(Value::as_str).unwrap_or("").to_string(),
                        extra: HashMap::new(),
                    }]),
                    Some("thinking_delta") => Ok(vec![StreamEvent::ContentDelta {
                        block_index: index,
                        text_delta: delta.get("thinking").and_then(Value::as_str).unwrap_or("").to_string(),
                        extra: HashMap::new(),
                    }]),
                    Some("input_json_delta") => Ok(vec![StreamEvent::ToolCallDelta {
                        block_index: index,
                        tool_id: String::new(),
                        input_delta: delta.get("partial_json").and_then(Value::as_str).unwrap_or("").to_string(),
                    }]),
                    _ => Ok(vec![]),
                }
            }
            "content_block_stop" => {
                let index = chunk.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
                Ok(vec![StreamEvent::ContentBlockStop { block_index: index }])
            }
            "message_delta" => {
                let delta = chunk.get("delta").cloned().unwrap_or(Value::Null);
                let stop_reason = delta.get("stop_reason").and_then(Value::as_str).map(stop_reason_from_wire);
                let usage: Option<UsageInfo> = chunk
                    .get("usage")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<WireUsage>(v).ok())
                    .map(Into::into);
                Ok(vec![StreamEvent::MessageStop { stop_reason, usage }])
            }
            "message_stop" => Ok(vec![]),
            "ping" => Ok(vec![]),
            "error" => {
                let error = chunk.get("error").cloned().unwrap_or(Value::Null);
                Ok(vec![StreamEvent::ErrorEvent {
                    error: InternalError::new(
                        error_type_from_wire(error.get("type").and_then(Value::as_str).unwrap_or("api_error")),
                        error.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
                    ),
                }])
            }
            other => Ok(vec![StreamEvent::UnknownStreamEvent {
                raw_type: other.to_string(),
                payload: chunk,
            }]),
        }
    }

    fn stream_event_from_internal(&self, event: &StreamEvent, state: &mut StreamState) -> NormalizeResult<Vec<Value>> {
        let substate = state.substate::<ClaudeStreamSubstate>("claude:chat");
        match event {
            StreamEvent::MessageStart { message_id, model, usage } => Ok(vec![json!({
                "type": "message_start",
                "message": {
                    "id": message_id,
                    "type": "message",
                    "role": "assistant",
                    "model": model,
                    "content": [],
                    "stop_reason": Value::Null,
                    "stop_sequence": Value::Null,
                    "usage": usage.as_ref().map(|u| json!({"input_tokens": u.input_tokens, "output_tokens": u.output_tokens})).unwrap_or(json!({"input_tokens": 0, "output_tokens": 0})),
                },
            })]),
            StreamEvent::ContentBlockStart {
                block_index,
                block_type,
                tool_id,
                tool_name,
                ..
            } => {
                substate.next_block_index = substate.next_block_index.max(*block_index + 1);
                let content_block = match block_type {
                    BlockType::Text => json!({"type": "text", "text": ""}),
                    BlockType::Thinking => json!({"type": "thinking", "thinking": ""}),
                    BlockType::ToolUse => json!({
                        "type": "tool_use",
                        "id": tool_id.clone().unwrap_or_default(),
                        "name": tool_name.clone().unwrap_or_default(),
                        "input": {},
                    }),
                };
                Ok(vec![json!({
                    "type": "content_block_start",
                    "index": block_index,
                    "content_block": content_block,
                })])
            }
            StreamEvent::ContentDelta { block_index, text_delta, .. } => Ok(vec![json!({
                "type": "content_block_delta",
                "index": block_index,
                "delta": {"type": "text_delta", "text": text_delta},
            })]),
            StreamEvent::ToolCallDelta { block_index, input_delta, .. } => Ok(vec![json!({
                "type": "content_block_delta",
                "index": block_index,
                "delta": {"type": "input_json_delta", "partial_json": input_delta},
            })]),
            StreamEvent::ContentBlockStop { block_index } => Ok(vec![json!({
                "type": "content_block_stop",
                "index": block_index,
            })]),
            StreamEvent::UsageEvent { .. } => Ok(vec![]),
            StreamEvent::MessageStop { stop_reason, usage } => {
                let mut out = vec![json!({
                    "type": "message_delta",
                    "delta": {
                        "stop_reason": stop_reason.and_then(|r| stop_reason_to_wire(r)),
                        "stop_sequence": Value::Null,
                    },
                    "usage": usage.as_ref().map(|u| json!({"input_tokens": u.input_tokens, "output_tokens": u.output_tokens})).unwrap_or(json!({"output_tokens": 0})),
                })];
                out.push(json!({"type": "message_stop"}));
                Ok(out)
            }
            StreamEvent::ErrorEvent { error } => Ok(vec![json!({
                "type": "error",
                "error": {"type": error_type_to_wire(error.error_type), "message": error.message},
            })]),
            StreamEvent::UnknownStreamEvent { payload, .. } => Ok(vec![payload.clone()]),
        }
    }

    fn error_to_internal(&self, body: Value) -> NormalizeResult<InternalError> {
        let error = body.get("error").cloned().unwrap_or(body);
        Ok(InternalError::new(
            error_type_from_wire(error.get("type").and_then(Value::as_str).unwrap_or("api_error")),
            error.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
        ))
    }

    fn error_from_internal(&self, error: &InternalError) -> NormalizeResult<Value> {
        Ok(json!({
            "type": "error",
            "error": {"type": error_type_to_wire(error.error_type), "message": error.message},
        }))
    }

    fn is_error_response(&self, body: &Value) -> bool {
        body.get("type").and_then(Value::as_str) == Some("error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_text_request() {
        let normalizer = ClaudeChatNormalizer;
        let body = json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 1024,
            "system": "be terse",
            "messages": [{"role": "user", "content": "hi"}],
        });

        let request = normalizer.request_to_internal(body).unwrap();
        assert_eq!(request.model, "claude-3-5-sonnet-20241022");
        assert_eq!(request.system.as_deref(), Some("be terse"));
        assert_eq!(request.messages[0].content[0].as_text(), Some("hi"));

        let rendered = normalizer.request_from_internal(&request).unwrap();
        assert_eq!(rendered["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(rendered["system"], "be terse");
    }

    #[test]
    fn system_cache_control_forces_array_form() {
        let normalizer = ClaudeChatNormalizer;
        let mut request = InternalRequest::new("claude-3-5-sonnet-20241022", vec![Message::text(Role::User, "hi")]);
        let mut extra = HashMap::new();
        extra.insert("cache_control".to_string(), json!({"type": "ephemeral"}));
        request.instructions = vec![InstructionSegment {
            role: InstructionRole::System,
            text: "be terse".to_string(),
            extra,
        }];

        let rendered = normalizer.request_from_internal(&request).unwrap();
        let system = rendered["system"].as_array().expect("array form");
        assert_eq!(system[0]["text"], "be terse");
        assert_eq!(system[0]["cache_control"], json!({"type": "ephemeral"}));
    }

    #[test]
    fn max_tokens_falls_back_through_output_limit_to_model_default() {
        let normalizer = ClaudeChatNormalizer;

        let mut request = InternalRequest::new("claude-3-5-sonnet-20241022", vec![Message::text(Role::User, "hi")]);
        request.extra.insert("output_limit".to_string(), json!(2048));
        let rendered = normalizer.request_from_internal(&request).unwrap();
        assert_eq!(rendered["max_tokens"], 2048);

        let request = InternalRequest::new("claude-3-5-sonnet-20241022", vec![Message::text(Role::User, "hi")]);
        let rendered = normalizer.request_from_internal(&request).unwrap();
        assert_eq!(rendered["max_tokens"], 8192);
    }

    #[test]
    fn consecutive_same_role_messages_are_merged() {
        let normalizer = ClaudeChatNormalizer;
        let request = InternalRequest::new(
            "claude-3-5-sonnet-20241022",
            vec![Message::text(Role::User, "hi"), Message::text(Role::User, "again")],
        );

        let rendered = normalizer.request_from_internal(&request).unwrap();
        let messages = rendered["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn non_user_first_message_gets_empty_user_prefix() {
        let normalizer = ClaudeChatNormalizer;
        let request = InternalRequest::new(
            "claude-3-5-sonnet-20241022",
            vec![Message::text(Role::Assistant, "continuing")],
        );

        let rendered = normalizer.request_from_internal(&request).unwrap();
        let messages = rendered["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"].as_array().unwrap().len(), 0);
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[test]
    fn thinking_budget_raises_max_tokens_when_violated() {
        let normalizer = ClaudeChatNormalizer;
        let mut request = InternalRequest::new("claude-3-5-sonnet-20241022", vec![Message::text(Role::User, "hi")]);
        request.max_tokens = Some(100);
        request.thinking = Some(ThinkingConfig {
            enabled: true,
            budget_tokens: Some(100),
            extra: Default::default(),
        });

        let rendered = normalizer.request_from_internal(&request).unwrap();
        assert_eq!(rendered["thinking"]["budget_tokens"], 1024);
        assert_eq!(rendered["max_tokens"], 1025);
    }

    #[test]
    fn parses_tool_use_response() {
        let normalizer = ClaudeChatNormalizer;
        let body = json!({
            "id": "msg_1",
            "model": "claude-3-5-sonnet-20241022",
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {"q": "rust"}}],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5},
        });

        let response = normalizer.response_to_internal(body).unwrap();
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert!(response.content[0].is_tool_use());
    }
}
