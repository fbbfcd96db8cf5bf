//! Per-stream response state (spec §3.3 "StreamState (per tunnel stream)"),
//! tracked in a `TunnelConnection`'s stream table while a request's response
//! is in flight.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Notify, mpsc};

use crate::error::TunnelError;

/// Response headers as received off the wire: ordered, multi-value pairs
/// (spec §4.5 — `RESPONSE_HEADERS` payload is `[[name, value], ...]`).
pub type HeaderPairs = Vec<(String, String)>;

struct Inner {
    status: u16,
    headers: HeaderPairs,
    error: Option<String>,
}

/// Tracks one in-flight tunnel stream's response: headers arrive once, body
/// chunks arrive as an ordered queue, and the stream ends either on
/// `STREAM_END` or on an error.
pub struct TunnelStreamState {
    pub stream_id: u32,
    inner: std::sync::Mutex<Inner>,
    header_ready: Notify,
    body_tx: mpsc::UnboundedSender<Option<Bytes>>,
    body_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<Bytes>>>,
}

impl TunnelStreamState {
    pub fn new(stream_id: u32) -> Self {
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        Self {
            stream_id,
            inner: std::sync::Mutex::new(Inner {
                status: 0,
                headers: Vec::new(),
                error: None,
            }),
            header_ready: Notify::new(),
            body_tx,
            body_rx: tokio::sync::Mutex::new(body_rx),
        }
    }

    pub fn set_response_headers(&self, status: u16, headers: HeaderPairs) {
        let mut inner = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
        inner.status = status;
        inner.headers = headers;
        drop(inner);
        self.header_ready.notify_waiters();
    }

    pub fn push_body_chunk(&self, data: Bytes) {
        let _ = self.body_tx.send(Some(data));
    }

    pub fn set_done(&self) {
        let _ = self.body_tx.send(None);
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
        inner.error = Some(message.into());
        drop(inner);
        self.header_ready.notify_waiters();
        let _ = self.body_tx.send(None);
    }

    /// Blocks until `RESPONSE_HEADERS` arrives or the stream errors out
    /// before headers were ever seen.
    pub async fn wait_headers(&self, timeout: Duration) -> Result<(u16, HeaderPairs), TunnelError> {
        loop {
            {
                let inner = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
                if let Some(error) = &inner.error {
                    return Err(TunnelError::Stream(error.clone()));
                }
                if inner.status != 0 {
                    return Ok((inner.status, inner.headers.clone()));
                }
            }
            tokio::time::timeout(timeout, self.header_ready.notified())
                .await
                .map_err(|_| TunnelError::Timeout)?;
        }
    }

    /// Returns the next body chunk, `None` on normal end, or an error if the
    /// stream failed or no chunk arrived within `chunk_timeout`.
    pub async fn next_chunk(&self, chunk_timeout: Duration) -> Result<Option<Bytes>, TunnelError> {
        let mut rx = self.body_rx.lock().await;
        let received = tokio::time::timeout(chunk_timeout, rx.recv())
            .await
            .map_err(|_| TunnelError::Timeout)?;

        match received {
            Some(Some(chunk)) => Ok(Some(chunk)),
            Some(None) | None => {
                let inner = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
                match &inner.error {
                    Some(error) => Err(TunnelError::Stream(error.clone())),
                    None => Ok(None),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn headers_then_body_then_done() {
        let state = TunnelStreamState::new(2);
        state.set_response_headers(200, vec![("content-type".into(), "text/plain".into())]);

        let (status, headers) = state.wait_headers(Duration::from_secs(1)).await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(headers, vec![("content-type".to_string(), "text/plain".to_string())]);

        state.push_body_chunk(Bytes::from_static(b"chunk-1"));
        state.set_done();

        assert_eq!(state.next_chunk(Duration::from_secs(1)).await.unwrap(), Some(Bytes::from_static(b"chunk-1")));
        assert_eq!(state.next_chunk(Duration::from_secs(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn error_before_headers_surfaces_on_wait() {
        let state = TunnelStreamState::new(4);
        state.set_error("tunnel disconnected");

        let err = state.wait_headers(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, TunnelError::Stream(msg) if msg == "tunnel disconnected"));
    }
}
