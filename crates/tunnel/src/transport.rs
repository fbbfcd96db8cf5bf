//! C10 Tunnel HTTP Transport: an HTTP-request-shaped façade over the tunnel
//! protocol (spec §4.8), so a dispatcher can send a request to a tunnel-mode
//! node the same way it would send one over `reqwest` directly.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{error::TunnelError, manager::TunnelManager, stream::TunnelStreamState};

/// Headers stripped before forwarding onto the tunnel, matching what a
/// direct HTTP hop would strip: connection-management headers that are
/// meaningless (or actively wrong) once re-framed as tunnel protocol
/// messages.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "transfer-encoding",
    "content-length",
    "connection",
    "upgrade",
    "keep-alive",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
];

pub fn is_hop_by_hop(header_name: &str) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(header_name))
}

pub fn filter_headers(headers: impl IntoIterator<Item = (String, String)>) -> Vec<(String, String)> {
    headers.into_iter().filter(|(name, _)| !is_hop_by_hop(name)).collect()
}

/// One HTTP-shaped response received over the tunnel: status, headers, and
/// a body the caller consumes chunk-by-chunk.
pub struct TunnelHttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    manager: Arc<TunnelManager>,
    node_id: String,
    stream: Arc<TunnelStreamState>,
    chunk_timeout: Duration,
    done: bool,
}

impl TunnelHttpResponse {
    /// Returns the next body chunk, `None` once the stream has ended. On end
    /// (normal or error) the stream is removed from its owning connection so
    /// connection-pool bookkeeping never races with a reused stream id.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, TunnelError> {
        if self.done {
            return Ok(None);
        }
        match self.stream.next_chunk(self.chunk_timeout).await {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.cleanup().await;
                Ok(None)
            }
            Err(err) => {
                self.cleanup().await;
                Err(err)
            }
        }
    }

    /// Releases the stream slot early, e.g. when the caller stops reading
    /// the response body before it naturally ends.
    pub async fn close(&mut self) {
        self.cleanup().await;
    }

    async fn cleanup(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if let Some(conn) = self.manager.get_connection(&self.node_id).await {
            conn.remove_stream(self.stream.stream_id).await;
        }
    }
}

pub struct TunnelHttpTransport {
    manager: Arc<TunnelManager>,
    node_id: String,
    timeout: Duration,
}

impl TunnelHttpTransport {
    pub fn new(manager: Arc<TunnelManager>, node_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            manager,
            node_id: node_id.into(),
            timeout,
        }
    }

    /// Sends one HTTP request over the tunnel and waits for response headers
    /// before returning; the body is read incrementally via
    /// [`TunnelHttpResponse::next_chunk`].
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Result<TunnelHttpResponse, TunnelError> {
        let headers = filter_headers(headers);
        let stream = self
            .manager
            .send_request(&self.node_id, method, url, &headers, body, self.timeout.as_secs())
            .await?;

        let result = stream.wait_headers(self.timeout).await;
        let (status, response_headers) = match result {
            Ok(pair) => pair,
            Err(err) => {
                if let Some(conn) = self.manager.get_connection(&self.node_id).await {
                    conn.remove_stream(stream.stream_id).await;
                }
                return Err(err);
            }
        };

        Ok(TunnelHttpResponse {
            status,
            headers: response_headers,
            manager: self.manager.clone(),
            node_id: self.node_id.clone(),
            stream,
            chunk_timeout: self.timeout,
            done: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_headers_case_insensitively() {
        let filtered = filter_headers(vec![
            ("Host".to_string(), "example.com".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Connection".to_string(), "keep-alive".to_string()),
            ("Authorization".to_string(), "Bearer abc".to_string()),
        ]);

        assert_eq!(
            filtered,
            vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), "Bearer abc".to_string()),
            ]
        );
    }

    #[test]
    fn is_hop_by_hop_matches_known_headers() {
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("te"));
        assert!(!is_hop_by_hop("x-request-id"));
    }
}
