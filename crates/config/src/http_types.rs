//! Validated wrappers around `http`'s header types so config deserialization
//! rejects malformed header names/values at load time instead of at request
//! time.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, de::Error as _};

/// A validated HTTP header name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderName(http::HeaderName);

impl HeaderName {
    /// Returns the header name as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for HeaderName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        http::HeaderName::from_str(&raw).map(HeaderName).map_err(|err| D::Error::custom(format!("invalid header name '{raw}': {err}")))
    }
}

/// A validated HTTP header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValue(http::HeaderValue);

impl HeaderValue {
    /// Returns the header value as a string slice, if it is valid UTF-8.
    pub fn to_str(&self) -> Result<&str, http::header::ToStrError> {
        self.0.to_str()
    }
}

impl<'de> Deserialize<'de> for HeaderValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        http::HeaderValue::from_str(&raw).map(HeaderValue).map_err(|err| D::Error::custom(format!("invalid header value '{raw}': {err}")))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        name: HeaderName,
    }

    #[test]
    fn rejects_invalid_header_name() {
        let result: Result<Wrapper, _> = toml::from_str("name = \"bad header\"");
        assert!(result.is_err());
    }

    #[test]
    fn accepts_valid_header_name() {
        let wrapper: Wrapper = toml::from_str("name = \"x-request-id\"").unwrap();
        assert_eq!(wrapper.name.as_str(), "x-request-id");
    }
}
