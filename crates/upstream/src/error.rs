use thiserror::Error;

pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

/// Kinds from §7, organized by failure semantics rather than just by
/// source. The dispatcher surfaces these to the scheduler with
/// `upstream_response` attached (truncated to 4 KB) wherever one is
/// available, so the scheduler can fail over.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transient/retryable: connect or time-to-first-byte deadline expired.
    #[error("timed out connecting to upstream")]
    Timeout,

    /// Transient/retryable: connection-level failure before any response.
    #[error("connection error: {0}")]
    Connection(String),

    /// Fatal to this attempt, retryable at the next candidate: HTTP status
    /// >= 400. Carries at most 4 KB of the upstream body for diagnostics.
    #[error("upstream returned HTTP {status}")]
    HttpStatus { status: u16, upstream_response: String },

    /// Fatal to this attempt, retryable at the next candidate: a 200-status
    /// body encoding an error per the source normalizer's
    /// `is_error_response`.
    #[error("embedded error in 200 response")]
    EmbeddedError { upstream_response: String },

    /// Auth-recoverable: OAuth 401, one force-refresh retry already
    /// attempted and it still failed.
    #[error("authentication failed after refresh retry")]
    AuthRetryExhausted { upstream_response: String },

    /// Transient/retryable: no `data` line arrived within the
    /// empty-stream threshold.
    #[error("empty stream: no data within threshold")]
    EmptyStream,

    /// Fatal to the request: the client disconnected mid-prefetch.
    #[error("client disconnected")]
    ClientDisconnected,

    /// Fatal to the request: conversion between formats failed and
    /// couldn't be salvaged with a generic fallback.
    #[error("format conversion error: {0}")]
    Conversion(#[from] registry::RegistryError),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::Timeout
                | UpstreamError::Connection(_)
                | UpstreamError::HttpStatus { .. }
                | UpstreamError::EmbeddedError { .. }
                | UpstreamError::EmptyStream
        )
    }

    /// Truncates an upstream body to the 4 KB cap used across §4.4/§7.
    pub fn truncate_upstream_body(body: &str) -> String {
        const CAP: usize = 4000;
        if body.len() <= CAP {
            body.to_string()
        } else {
            body.chars().take(CAP).collect()
        }
    }
}
