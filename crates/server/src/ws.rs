//! Proxy-node tunnel WS endpoint (spec §4.6/§6.1): accepts the upgrade,
//! validates [`TunnelAuth`], registers a [`TunnelConnection`] with the
//! shared [`TunnelManager`], and runs the connection's read loop until the
//! socket closes or a protocol violation trips one of the close codes.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::extract::{
    State,
    ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::Mutex as AsyncMutex;
use tunnel::{Frame, FrameWriter, HeartbeatSink, NoopHeartbeatSink, TunnelConnection, TunnelError};

use crate::{
    state::AppState,
    tunnel_auth::{TunnelAuth, close_code},
};

/// Single binary WS frame payload cap (spec §4.6).
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;
/// Idle-read timeout covering the node's own reconnect window.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Server-initiated application PING interval.
const PING_INTERVAL: Duration = Duration::from_secs(15);
/// Consecutive oversized frames tolerated before the connection is closed.
const MAX_OVERSIZED_FRAMES: u32 = 3;

pub async fn tunnel_upgrade(auth: TunnelAuth, ws: WebSocketUpgrade, State(state): State<AppState>) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_connection(socket, auth, state))
}

struct AxumFrameWriter {
    sink: Arc<AsyncMutex<SplitSink<WebSocket, Message>>>,
}

#[async_trait]
impl FrameWriter for AxumFrameWriter {
    async fn write_frame(&self, bytes: Vec<u8>) -> Result<(), TunnelError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(bytes.into())).await.map_err(|e| TunnelError::Frame(e.to_string()))
    }
}

async fn handle_connection(socket: WebSocket, auth: TunnelAuth, state: AppState) {
    let (sink, mut stream) = socket.split();
    let sink = Arc::new(AsyncMutex::new(sink));
    let writer = Box::new(AxumFrameWriter { sink: sink.clone() });

    let conn = Arc::new(TunnelConnection::new(auth.node_id.clone(), auth.node_name.clone(), auth.max_streams, writer));
    state.tunnel_manager.register(conn.clone()).await;
    log::info!("tunnel node {} connected ({} max streams)", conn.node_id, conn.max_streams);

    let heartbeat: Arc<dyn HeartbeatSink> = Arc::new(NoopHeartbeatSink);
    let mut oversized_frames = 0u32;
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await; // first tick fires immediately; consume it

    let close = loop {
        tokio::select! {
            _ = ping.tick() => {
                if conn.send_frame(&Frame::new(0, tunnel::frame::MsgType::Ping, 0, Vec::new())).await.is_err() {
                    break None;
                }
            }
            message = tokio::time::timeout(IDLE_TIMEOUT, stream.next()) => {
                let Ok(message) = message else {
                    break Some((close_code::IDLE_TIMEOUT, "idle timeout"));
                };
                match message {
                    Some(Ok(Message::Binary(bytes))) => {
                        if bytes.len() > MAX_FRAME_SIZE {
                            oversized_frames += 1;
                            if oversized_frames >= MAX_OVERSIZED_FRAMES {
                                break Some((close_code::TOO_MANY_OVERSIZED_FRAMES, "too many oversized frames"));
                            }
                            continue;
                        }
                        oversized_frames = 0;

                        match Frame::decode(&bytes) {
                            Ok(frame) => {
                                if state.tunnel_manager.handle_incoming_frame(&conn, frame, heartbeat.as_ref()).await.is_err() {
                                    break None;
                                }
                            }
                            Err(e) => log::warn!("tunnel node {}: dropping undecodable frame: {e}", conn.node_id),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("tunnel node {}: socket error: {e}", conn.node_id);
                        break None;
                    }
                }
            }
        }
    };

    conn.mark_dead();
    conn.cancel_all_streams().await;
    state.tunnel_manager.unregister(&conn).await;
    log::info!("tunnel node {} disconnected", conn.node_id);

    if let Some((code, reason)) = close {
        log::warn!("tunnel node {} closed: {code} {reason}", conn.node_id);
        let mut sink = sink.lock().await;
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })))
            .await;
    }
}
