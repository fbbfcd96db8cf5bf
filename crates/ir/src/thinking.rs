//! Fixed piecewise mapping between OpenAI's `reasoning_effort` levels and
//! Anthropic-style `thinking.budget_tokens`, used by normalizers converting
//! in either direction. The table is deliberately small and hand-tuned
//! rather than a formula: upstream providers don't publish an exact
//! conversion, so these are the values normalizers have settled on.

/// `reasoning_effort` -> `budget_tokens`, per the forward mapping.
pub fn effort_to_budget_tokens(effort: &str) -> Option<u32> {
    match effort {
        "low" => Some(1280),
        "medium" => Some(2048),
        "high" => Some(4096),
        _ => None,
    }
}

/// `budget_tokens` -> `reasoning_effort`, picking the closest bucket by the
/// midpoint between adjacent table entries.
pub fn budget_tokens_to_effort(budget_tokens: u32) -> &'static str {
    if budget_tokens <= 1664 {
        "low"
    } else if budget_tokens <= 3072 {
        "medium"
    } else {
        "high"
    }
}

/// `web_search_context_size` knob shared by the OpenAI formats, mapped to an
/// approximate result count for formats that express it that way instead.
pub fn web_search_size_to_result_count(size: &str) -> Option<u32> {
    match size {
        "low" => Some(1),
        "medium" => Some(5),
        "high" => Some(10),
        _ => None,
    }
}

pub fn result_count_to_web_search_size(count: u32) -> &'static str {
    if count <= 2 {
        "low"
    } else if count <= 7 {
        "medium"
    } else {
        "high"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bucket_boundaries() {
        assert_eq!(budget_tokens_to_effort(effort_to_budget_tokens("low").unwrap()), "low");
        assert_eq!(
            budget_tokens_to_effort(effort_to_budget_tokens("medium").unwrap()),
            "medium"
        );
        assert_eq!(budget_tokens_to_effort(effort_to_budget_tokens("high").unwrap()), "high");
    }

    #[test]
    fn unknown_effort_is_unmapped() {
        assert_eq!(effort_to_budget_tokens("extreme"), None);
    }

    #[test]
    fn bucket_boundaries_are_inclusive() {
        assert_eq!(budget_tokens_to_effort(1664), "low");
        assert_eq!(budget_tokens_to_effort(1665), "medium");
        assert_eq!(budget_tokens_to_effort(3072), "medium");
        assert_eq!(budget_tokens_to_effort(3073), "high");
    }
}
