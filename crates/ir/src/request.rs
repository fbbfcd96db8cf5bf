use serde::{Deserialize, Serialize};

use crate::{
    content::{InstructionSegment, Message},
    extra::Extra,
    tool::{ToolChoice, ToolDefinition},
};

/// Reasoning/thinking configuration, normalized across OpenAI's
/// `reasoning_effort` levels and Anthropic's `thinking.budget_tokens`.
///
/// See [`crate::thinking`] for the fixed piecewise mapping table between the
/// two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingConfig {
    pub enabled: bool,
    #[serde(default)]
    pub budget_tokens: Option<u32>,
    #[serde(default, flatten)]
    pub extra: Extra,
}

/// The canonical, format-agnostic request every normalizer converts to and
/// from. `stream` is the *client's* stream intent — never the upstream's;
/// the upstream hop's actual mode is decided separately by the stream
/// policy (`upstream` crate) and is not represented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Concatenation of `instructions` (joined by a blank line), kept as a
    /// convenience for string-only formats. Never hand-author both this and
    /// `instructions` independently — derive one from the other.
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub instructions: Vec<InstructionSegment>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub logprobs: Option<bool>,
    #[serde(default)]
    pub top_logprobs: Option<u32>,
    #[serde(default)]
    pub response_format: Option<serde_json::Value>,
    #[serde(default)]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub thinking: Option<ThinkingConfig>,
    #[serde(default, flatten)]
    pub extra: Extra,
}

impl InternalRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            instructions: Vec::new(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            n: None,
            presence_penalty: None,
            frequency_penalty: None,
            seed: None,
            logprobs: None,
            top_logprobs: None,
            response_format: None,
            parallel_tool_calls: None,
            stream: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            extra: Extra::default(),
        }
    }

    /// Fold `instructions` into `system` per the invariant in spec §3.1:
    /// both fields represent the same content, joined by a blank line.
    pub fn sync_system_from_instructions(&mut self) {
        if self.instructions.is_empty() {
            return;
        }

        let joined = self
            .instructions
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        self.system = Some(joined);
    }

    pub fn is_tool_using(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }
}
