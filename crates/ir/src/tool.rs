use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extra::Extra;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for the tool's parameters. `None` means "no arguments".
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default, flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoiceType {
    Auto,
    None,
    Required,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoice {
    #[serde(rename = "type")]
    pub choice_type: ToolChoiceType,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default, flatten)]
    pub extra: Extra,
}

impl ToolChoice {
    pub fn auto() -> Self {
        Self {
            choice_type: ToolChoiceType::Auto,
            tool_name: None,
            extra: Extra::default(),
        }
    }
}
