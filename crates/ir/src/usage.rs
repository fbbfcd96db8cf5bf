use serde::{Deserialize, Serialize};

use crate::extra::Extra;

/// Token accounting for a single request/response exchange.
///
/// `total_tokens` is computed as `input_tokens + output_tokens` by
/// [`UsageInfo::new`] whenever the source format doesn't report a total of
/// its own (OpenAI always does; Anthropic never does).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageInfo {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default)]
    pub cache_read_tokens: u32,
    #[serde(default)]
    pub cache_write_tokens: u32,
    #[serde(default, flatten)]
    pub extra: Extra,
}

impl UsageInfo {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
            extra: Extra::default(),
        }
    }

    /// Merge another usage snapshot in, preferring the newer non-zero values.
    /// Used when the "last reported usage wins" rule from the aggregator
    /// applies (see `stream-bridge`'s `Aggregator`).
    pub fn merge_latest(&mut self, other: &UsageInfo) {
        if other.input_tokens != 0 || other.output_tokens != 0 || other.total_tokens != 0 {
            *self = other.clone();
        }
    }
}
