//! Per-endpoint config objects consumed by the compatibility gate. These
//! mirror the closed set of endpoint config keys; loading them from the
//! on-disk config format is out of scope here (see the `config` crate).

/// Normalizes a format id to its data-format family. Claude/Claude-CLI and
/// Gemini/Gemini-CLI share a wire shape closely enough that cross-member
/// traffic never needs IR conversion; OpenAI Chat and OpenAI Responses do
/// not (different message shapes), so they stay distinct families.
pub fn format_family(format_id: &str) -> &str {
    match format_id {
        "claude:chat" | "claude:cli" => "claude",
        "gemini:chat" | "gemini:cli" => "gemini",
        other => other,
    }
}

#[derive(Debug, Clone, Default)]
pub struct EndpointPolicy {
    pub enabled: bool,
    pub stream_conversion: bool,
    pub accept_formats: Vec<String>,
    pub reject_formats: Vec<String>,
}

impl EndpointPolicy {
    pub fn accepts(&self, format_id: &str) -> bool {
        if self.reject_formats.iter().any(|f| f.eq_ignore_ascii_case(format_id)) {
            return false;
        }
        if !self.accept_formats.is_empty() && !self.accept_formats.iter().any(|f| f.eq_ignore_ascii_case(format_id)) {
            return false;
        }
        true
    }
}
