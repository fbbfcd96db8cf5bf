//! Header transformation rules applied by the upstream dispatcher when
//! building the outbound request (§4.4 step 8, "Build headers and URL").
//!
//! Kept deliberately small: insert a literal value, remove a header, rename
//! one header to another, or forward any header whose name matches a
//! pattern. Evaluated in order, so a `Remove` after an `Insert` for the
//! same name wins.

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HeaderRule {
    Insert { name: String, value: String },
    Remove { name: String },
    Rename { from: String, to: String },
    /// Forwards any header from the incoming client request whose name
    /// matches `pattern` verbatim onto the outbound request.
    Forward {
        #[serde(with = "regex_pattern")]
        pattern: Regex,
    },
}

mod regex_pattern {
    use regex::Regex;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Regex, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Regex::new(&raw).map_err(serde::de::Error::custom)
    }

    pub fn serialize<S>(pattern: &Regex, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(pattern.as_str())
    }
}

/// Applies `rules` in order to `outbound`, optionally forwarding matched
/// headers from `incoming` (the original client request, if any).
pub fn apply_rules(rules: &[HeaderRule], outbound: &mut HeaderMap, incoming: Option<&HeaderMap>) {
    for rule in rules {
        match rule {
            HeaderRule::Insert { name, value } => {
                if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                    outbound.insert(name, value);
                } else {
                    log::warn!("header-rules: invalid insert rule for header {name}");
                }
            }
            HeaderRule::Remove { name } => {
                if let Ok(name) = HeaderName::try_from(name.as_str()) {
                    outbound.remove(name);
                }
            }
            HeaderRule::Rename { from, to } => {
                let (Ok(from_name), Ok(to_name)) = (HeaderName::try_from(from.as_str()), HeaderName::try_from(to.as_str()))
                else {
                    log::warn!("header-rules: invalid rename rule {from} -> {to}");
                    continue;
                };
                if let Some(value) = outbound.remove(&from_name) {
                    outbound.insert(to_name, value);
                }
            }
            HeaderRule::Forward { pattern } => {
                let Some(incoming) = incoming else { continue };
                for (name, value) in incoming.iter() {
                    if pattern.is_match(name.as_str()) {
                        outbound.insert(name.clone(), value.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_drops_header() {
        let rules = vec![
            HeaderRule::Insert {
                name: "x-api-key".into(),
                value: "secret".into(),
            },
            HeaderRule::Remove {
                name: "x-api-key".into(),
            },
        ];
        let mut headers = HeaderMap::new();
        apply_rules(&rules, &mut headers, None);
        assert!(headers.get("x-api-key").is_none());
    }

    #[test]
    fn rename_moves_value_to_new_name() {
        let rules = vec![HeaderRule::Rename {
            from: "x-old".into(),
            to: "x-new".into(),
        }];
        let mut headers = HeaderMap::new();
        headers.insert("x-old", HeaderValue::from_static("v"));
        apply_rules(&rules, &mut headers, None);
        assert_eq!(headers.get("x-new").unwrap(), "v");
        assert!(headers.get("x-old").is_none());
    }

    #[test]
    fn forward_matches_incoming_by_pattern() {
        let rules = vec![HeaderRule::Forward {
            pattern: Regex::new("^x-trace-").unwrap(),
        }];
        let mut incoming = HeaderMap::new();
        incoming.insert("x-trace-id", HeaderValue::from_static("abc"));
        incoming.insert("x-unrelated", HeaderValue::from_static("nope"));

        let mut outbound = HeaderMap::new();
        apply_rules(&rules, &mut outbound, Some(&incoming));
        assert_eq!(outbound.get("x-trace-id").unwrap(), "abc");
        assert!(outbound.get("x-unrelated").is_none());
    }
}
