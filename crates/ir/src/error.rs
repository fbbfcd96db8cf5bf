use serde::{Deserialize, Serialize};

use crate::extra::Extra;

/// Closed set of error categories every normalizer's `error_to_internal`
/// must classify into. `retryable()` mirrors exactly what §7 of the spec
/// calls "transient/retryable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InvalidRequest,
    Authentication,
    PermissionDenied,
    NotFound,
    RateLimit,
    Overloaded,
    ServerError,
    ContentFiltered,
    ContextLengthExceeded,
    Unknown,
}

impl ErrorType {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorType::RateLimit | ErrorType::Overloaded | ErrorType::ServerError)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalError {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    pub retryable: bool,
    #[serde(default, flatten)]
    pub extra: Extra,
}

impl InternalError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            retryable: error_type.is_retryable(),
            error_type,
            message: message.into(),
            code: None,
            param: None,
            extra: Extra::default(),
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorType::ServerError, message)
    }
}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error_type, self.message)
    }
}

impl std::error::Error for InternalError {}
