//! A `T` parsed from a string after expanding `${ENV_VAR}` and
//! `{{ env.ENV_VAR }}` references against the process environment.
//!
//! Config values that look like secrets (API keys, base URLs pulled from a
//! deployment environment) are written in TOML as a reference rather than a
//! literal, e.g. `api_key = "${OPENAI_API_KEY}"`. `DynamicString<T>` is the
//! wrapper that resolves those references at parse time, failing loudly when
//! a referenced variable isn't set rather than passing the literal `${...}`
//! text through to the rest of the config.

use std::{fmt, str::FromStr, sync::OnceLock};

use itertools::Itertools;
use regex::Regex;
use serde_with::DeserializeFromStr;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
            .expect("static pattern is valid")
    })
}

/// A value of type `T` parsed from a string after environment expansion.
///
/// Implements [`FromStr`] directly for callers that walk a parsed document
/// themselves (see `config::loader`), and [`serde::Deserialize`] for use as
/// an ordinary struct field.
#[derive(Debug, Clone, PartialEq, Eq, DeserializeFromStr)]
pub struct DynamicString<T>(T);

impl<T> DynamicString<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for DynamicString<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug)]
pub enum DynamicStringError<E> {
    MissingEnvVars(Vec<String>),
    Parse(E),
}

impl<E: fmt::Display> fmt::Display for DynamicStringError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEnvVars(names) => {
                write!(f, "environment variable(s) not set: {}", names.iter().join(", "))
            }
            Self::Parse(e) => e.fmt(f),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for DynamicStringError<E> {}

impl<T> FromStr for DynamicString<T>
where
    T: FromStr,
    T::Err: fmt::Debug + fmt::Display,
{
    type Err = DynamicStringError<T::Err>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expanded = expand(s).map_err(DynamicStringError::MissingEnvVars)?;

        expanded.parse::<T>().map(DynamicString).map_err(DynamicStringError::Parse)
    }
}

/// Replaces every `${VAR}` / `{{ env.VAR }}` occurrence in `input` with the
/// value of the named environment variable. Strings with no such pattern are
/// returned unchanged. Collects every missing variable before failing so a
/// single bad config value doesn't take multiple round trips to fix.
fn expand(input: &str) -> Result<String, Vec<String>> {
    if !pattern().is_match(input) {
        return Ok(input.to_owned());
    }

    let mut out = String::with_capacity(input.len());
    let mut missing = Vec::new();
    let mut last_end = 0;

    for caps in pattern().captures_iter(input) {
        let whole = caps.get(0).expect("capture 0 is always present");
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .expect("one of the two alternatives always captures")
            .as_str();

        out.push_str(&input[last_end..whole.start()]);

        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => missing.push(name.to_owned()),
        }

        last_end = whole.end();
    }

    out.push_str(&input[last_end..]);

    if missing.is_empty() { Ok(out) } else { Err(missing) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_without_pattern() {
        let value = DynamicString::<String>::from_str("https://api.openai.com/v1").unwrap();
        assert_eq!(value.into_inner(), "https://api.openai.com/v1");
    }

    #[test]
    fn dollar_brace_syntax() {
        temp_env::with_var("SDS_TEST_DOLLAR", Some("sk-dollar"), || {
            let value = DynamicString::<String>::from_str("${SDS_TEST_DOLLAR}").unwrap();
            assert_eq!(value.into_inner(), "sk-dollar");
        });
    }

    #[test]
    fn mustache_env_syntax() {
        temp_env::with_var("SDS_TEST_MUSTACHE", Some("sk-mustache"), || {
            let value = DynamicString::<String>::from_str("{{ env.SDS_TEST_MUSTACHE }}").unwrap();
            assert_eq!(value.into_inner(), "sk-mustache");
        });
    }

    #[test]
    fn mixed_literal_and_reference() {
        temp_env::with_var("SDS_TEST_HOST", Some("api.example.com"), || {
            let value = DynamicString::<String>::from_str("https://${SDS_TEST_HOST}/v1").unwrap();
            assert_eq!(value.into_inner(), "https://api.example.com/v1");
        });
    }

    #[test]
    fn missing_variable_errors() {
        temp_env::with_var_unset("SDS_TEST_MISSING_XYZ", || {
            let err = DynamicString::<String>::from_str("${SDS_TEST_MISSING_XYZ}").unwrap_err();
            assert!(err.to_string().contains("SDS_TEST_MISSING_XYZ"));
        });
    }

    #[test]
    fn parses_into_non_string_types() {
        temp_env::with_var("SDS_TEST_PORT", Some("8080"), || {
            let value = DynamicString::<u16>::from_str("${SDS_TEST_PORT}").unwrap();
            assert_eq!(value.into_inner(), 8080);
        });
    }
}
