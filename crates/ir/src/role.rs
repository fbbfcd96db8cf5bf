use serde::{Deserialize, Serialize};

/// Message sender role, closed set per the gateway's canonical representation.
///
/// Individual wire formats fold this down further at render time (Gemini has
/// no `developer` role and no dedicated `system` role either — both collapse
/// into `instructions`/`system_instruction`; OpenAI Chat has no `developer`
/// distinct from `system` on older models).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Developer,
    Tool,
    /// Forward-compatibility bucket for a role string we don't recognize.
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Developer => "developer",
            Role::Tool => "tool",
            Role::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
