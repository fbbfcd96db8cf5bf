use crate::{ConversionRegistry, policy::EndpointPolicy, policy::format_family};

/// Result of the nine-step compatibility gate. `compatible=false` always
/// implies `needs_conversion=false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compatibility {
    pub compatible: bool,
    pub needs_conversion: bool,
}

impl Compatibility {
    const INCOMPATIBLE: Self = Self {
        compatible: false,
        needs_conversion: false,
    };

    const PASSTHROUGH: Self = Self {
        compatible: true,
        needs_conversion: false,
    };

    const CONVERT: Self = Self {
        compatible: true,
        needs_conversion: true,
    };
}

impl ConversionRegistry {
    /// The compatibility gate from the Conversion Registry's design: an
    /// ordered sequence of checks, first match wins. Each numbered comment
    /// corresponds to one step of that sequence.
    pub fn is_format_compatible(
        &self,
        client_format: &str,
        endpoint_format: &str,
        is_stream: bool,
        global_switch: bool,
        endpoint_policy: Option<&EndpointPolicy>,
    ) -> Compatibility {
        // 1. Same format id.
        if client_format.eq_ignore_ascii_case(endpoint_format) {
            return Compatibility::PASSTHROUGH;
        }

        // 2. Different ids, global switch off.
        if !global_switch {
            return Compatibility::INCOMPATIBLE;
        }

        // 3. No endpoint policy or policy disabled.
        let Some(policy) = endpoint_policy else {
            return Compatibility::INCOMPATIBLE;
        };
        if !policy.enabled {
            return Compatibility::INCOMPATIBLE;
        }

        // 4 & 5. reject_formats / accept_formats.
        if !policy.accepts(client_format) {
            return Compatibility::INCOMPATIBLE;
        }

        // 6. Shared data-format family.
        if format_family(client_format) == format_family(endpoint_format) {
            return Compatibility::PASSTHROUGH;
        }

        // 7. Streaming requested but the endpoint disallows stream conversion.
        if is_stream && !policy.stream_conversion {
            return Compatibility::INCOMPATIBLE;
        }

        // 8. Both normalizers must exist and declare the needed capability.
        let (Some(source), Some(target)) = (self.get(client_format), self.get(endpoint_format)) else {
            return Compatibility::INCOMPATIBLE;
        };
        if is_stream && !(source.capabilities().supports_streaming && target.capabilities().supports_streaming) {
            return Compatibility::INCOMPATIBLE;
        }

        // 9. Otherwise compatible, conversion required.
        Compatibility::CONVERT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConversionRegistry;

    fn enabled_policy() -> EndpointPolicy {
        EndpointPolicy {
            enabled: true,
            stream_conversion: true,
            accept_formats: Vec::new(),
            reject_formats: Vec::new(),
        }
    }

    #[test]
    fn claude_cli_and_claude_chat_are_passthrough() {
        let registry = ConversionRegistry::with_default_normalizers();
        let result = registry.is_format_compatible("claude:cli", "claude:chat", false, true, Some(&enabled_policy()));
        assert_eq!(result, Compatibility::PASSTHROUGH);
    }

    #[test]
    fn global_switch_off_blocks_cross_format() {
        let registry = ConversionRegistry::with_default_normalizers();
        let result = registry.is_format_compatible("claude:chat", "openai:chat", false, false, Some(&enabled_policy()));
        assert_eq!(result, Compatibility::INCOMPATIBLE);
    }

    #[test]
    fn missing_policy_is_incompatible_for_cross_format() {
        let registry = ConversionRegistry::with_default_normalizers();
        let result = registry.is_format_compatible("claude:chat", "openai:chat", false, true, None);
        assert_eq!(result, Compatibility::INCOMPATIBLE);
    }

    #[test]
    fn reject_formats_blocks_client() {
        let registry = ConversionRegistry::with_default_normalizers();
        let mut policy = enabled_policy();
        policy.reject_formats.push("claude:chat".to_string());
        let result = registry.is_format_compatible("claude:chat", "openai:chat", false, true, Some(&policy));
        assert_eq!(result, Compatibility::INCOMPATIBLE);
    }

    #[test]
    fn cross_family_conversion_is_compatible_when_capable() {
        let registry = ConversionRegistry::with_default_normalizers();
        let result = registry.is_format_compatible("claude:chat", "openai:chat", true, true, Some(&enabled_policy()));
        assert_eq!(result, Compatibility::CONVERT);
    }

    #[test]
    fn streaming_without_conversion_support_is_incompatible() {
        let registry = ConversionRegistry::with_default_normalizers();
        let mut policy = enabled_policy();
        policy.stream_conversion = false;
        let result = registry.is_format_compatible("claude:chat", "openai:chat", true, true, Some(&policy));
        assert_eq!(result, Compatibility::INCOMPATIBLE);
    }
}
