use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TunnelError {
    #[error("no tunnel connection for node {0}")]
    NotConnected(String),

    #[error("tunnel stream limit reached for node {0}")]
    StreamLimitReached(String),

    #[error("stream ID space exhausted")]
    StreamIdSpaceExhausted,

    #[error("tunnel stream error: {0}")]
    Stream(String),

    #[error("tunnel operation timed out")]
    Timeout,

    #[error("frame decode error: {0}")]
    Frame(String),
}
