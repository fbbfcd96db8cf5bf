use serde::{Deserialize, Serialize};

use crate::{content::ContentBlock, extra::Extra, usage::UsageInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    PauseTurn,
    Refusal,
    ContentFiltered,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    pub usage: UsageInfo,
    #[serde(default, flatten)]
    pub extra: Extra,
}

impl InternalResponse {
    pub fn new(id: impl Into<String>, model: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            content,
            stop_reason: None,
            usage: UsageInfo::default(),
            extra: Extra::default(),
        }
    }
}
