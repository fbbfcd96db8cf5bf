//! C9 Tunnel Manager: the `node_id → [TunnelConnection]` pool, least-loaded
//! connection selection, and incoming-frame routing (spec §4.7).
//!
//! Redesigned from the original single-connection-per-node map to a list
//! per node, per spec §3.3/§4.7, so multiple proxy processes for the same
//! node add horizontal tunnel capacity instead of evicting each other.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{connection::TunnelConnection, error::TunnelError, frame::Frame};

pub struct TunnelManager {
    connections: RwLock<HashMap<String, Vec<Arc<TunnelConnection>>>>,
}

impl TunnelManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, conn: Arc<TunnelConnection>) {
        let mut table = self.connections.write().await;
        table.entry(conn.node_id.clone()).or_default().push(conn);
    }

    /// Removes `conn` from its node's pool by identity, not just by
    /// `node_id`, so unregistering a stale connection never evicts one that
    /// reconnected in its place.
    pub async fn unregister(&self, conn: &Arc<TunnelConnection>) {
        let mut table = self.connections.write().await;
        if let Some(pool) = table.get_mut(&conn.node_id) {
            pool.retain(|existing| !Arc::ptr_eq(existing, conn));
            if pool.is_empty() {
                table.remove(&conn.node_id);
            }
        }
    }

    /// Live connection count for a node, after reaping dead ones.
    pub async fn connection_count(&self, node_id: &str) -> usize {
        self.reap_dead(node_id).await;
        self.connections.read().await.get(node_id).map_or(0, Vec::len)
    }

    async fn reap_dead(&self, node_id: &str) {
        let mut table = self.connections.write().await;
        if let Some(pool) = table.get_mut(node_id) {
            pool.retain(|conn| conn.is_alive());
            if pool.is_empty() {
                table.remove(node_id);
            }
        }
    }

    /// Picks the alive connection for `node_id` with the smallest current
    /// stream count; reaps dead connections from the pool first.
    pub async fn get_connection(&self, node_id: &str) -> Option<Arc<TunnelConnection>> {
        self.reap_dead(node_id).await;
        let table = self.connections.read().await;
        let pool = table.get(node_id)?;

        let mut best: Option<(&Arc<TunnelConnection>, usize)> = None;
        for conn in pool {
            let count = conn.stream_count().await;
            if best.as_ref().is_none_or(|(_, best_count)| count < *best_count) {
                best = Some((conn, count));
            }
        }
        best.map(|(conn, _)| conn.clone())
    }

    pub async fn has_tunnel(&self, node_id: &str) -> bool {
        self.get_connection(node_id).await.is_some()
    }

    /// Routes one incoming frame from `conn` to the tunnel protocol
    /// handlers: response frames to the owning stream, `PING` to an echoed
    /// `PONG`, `HEARTBEAT_DATA` to the injected sink (returning the ack
    /// payload to send back as `HEARTBEAT_ACK`).
    pub async fn handle_incoming_frame(&self, conn: &Arc<TunnelConnection>, frame: Frame, heartbeat: &dyn HeartbeatSink) -> Result<(), TunnelError> {
        use crate::frame::MsgType;

        match frame.msg_type {
            MsgType::ResponseHeaders | MsgType::ResponseBody | MsgType::StreamEnd | MsgType::StreamError => {
                conn.handle_response_frame(frame).await;
                Ok(())
            }
            MsgType::Ping => conn.send_frame(&Frame::new(0, MsgType::Pong, 0, frame.payload)).await,
            MsgType::HeartbeatData => {
                let ack = heartbeat.on_heartbeat(&conn.node_id, &frame.payload).await;
                conn.send_frame(&Frame::new(0, MsgType::HeartbeatAck, 0, ack)).await
            }
            _ => Ok(()),
        }
    }

    /// Sends `REQUEST_HEADERS` then `REQUEST_BODY` (`END_STREAM` set) on a
    /// freshly allocated stream, returning the stream state to read the
    /// response from. Mirrors the original `send_request` shape.
    pub async fn send_request(
        &self,
        node_id: &str,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
        timeout_secs: u64,
    ) -> Result<Arc<crate::stream::TunnelStreamState>, TunnelError> {
        use crate::frame::{Flags, MsgType};

        let conn = self.get_connection(node_id).await.ok_or_else(|| TunnelError::NotConnected(node_id.to_string()))?;

        if conn.stream_count().await as u32 >= conn.max_streams {
            return Err(TunnelError::StreamLimitReached(node_id.to_string()));
        }

        let stream = conn.create_stream().await?;

        let meta = serde_json::json!({
            "method": method,
            "url": url,
            "headers": headers.iter().cloned().collect::<HashMap<_, _>>(),
            "timeout": timeout_secs,
        });

        let send_result = async {
            conn.send_frame(&Frame::new(stream.stream_id, MsgType::RequestHeaders, 0, serde_json::to_vec(&meta).unwrap()))
                .await?;
            conn.send_frame(&Frame::new(stream.stream_id, MsgType::RequestBody, Flags::END_STREAM, body.unwrap_or_default()))
                .await
        }
        .await;

        if let Err(err) = send_result {
            conn.remove_stream(stream.stream_id).await;
            return Err(err);
        }

        Ok(stream)
    }
}

impl Default for TunnelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink for `HEARTBEAT_DATA` reports (spec §4.7); returns the JSON ack
/// payload to send back as `HEARTBEAT_ACK`. Concrete node-stats/DB wiring is
/// out of scope for this crate — an injected no-op is provided for callers
/// that don't need it.
#[async_trait::async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn on_heartbeat(&self, node_id: &str, payload: &[u8]) -> Vec<u8>;
}

pub struct NoopHeartbeatSink;

#[async_trait::async_trait]
impl HeartbeatSink for NoopHeartbeatSink {
    async fn on_heartbeat(&self, _node_id: &str, _payload: &[u8]) -> Vec<u8> {
        b"{}".to_vec()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::connection::FrameWriter;

    struct NullWriter;
    #[async_trait]
    impl FrameWriter for NullWriter {
        async fn write_frame(&self, _bytes: Vec<u8>) -> Result<(), TunnelError> {
            Ok(())
        }
    }

    fn conn(node_id: &str) -> Arc<TunnelConnection> {
        Arc::new(TunnelConnection::new(node_id, node_id, None, Box::new(NullWriter)))
    }

    #[tokio::test]
    async fn selects_least_loaded_connection() {
        let manager = TunnelManager::new();
        let a = conn("node-1");
        let b = conn("node-1");
        manager.register(a.clone()).await;
        manager.register(b.clone()).await;

        a.create_stream().await.unwrap();
        a.create_stream().await.unwrap();
        b.create_stream().await.unwrap();

        let selected = manager.get_connection("node-1").await.unwrap();
        assert!(Arc::ptr_eq(&selected, &b));
    }

    #[tokio::test]
    async fn dead_connections_are_excluded_from_selection() {
        let manager = TunnelManager::new();
        let a = conn("node-1");
        let b = conn("node-1");
        manager.register(a.clone()).await;
        manager.register(b.clone()).await;
        a.mark_dead();

        let selected = manager.get_connection("node-1").await.unwrap();
        assert!(Arc::ptr_eq(&selected, &b));
        assert_eq!(manager.connection_count("node-1").await, 1);
    }

    #[tokio::test]
    async fn unregister_removes_only_the_matching_connection() {
        let manager = TunnelManager::new();
        let a = conn("node-1");
        let b = conn("node-1");
        manager.register(a.clone()).await;
        manager.register(b.clone()).await;

        manager.unregister(&a).await;
        assert_eq!(manager.connection_count("node-1").await, 1);
        let selected = manager.get_connection("node-1").await.unwrap();
        assert!(Arc::ptr_eq(&selected, &b));
    }

    #[tokio::test]
    async fn unknown_node_has_no_tunnel() {
        let manager = TunnelManager::new();
        assert!(!manager.has_tunnel("ghost").await);
    }
}
