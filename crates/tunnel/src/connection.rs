//! C8 Tunnel Connection: one accepted WebSocket, its stream table, its
//! stream-id allocator, and its single serialized writer (spec §3.3/§4.6).

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Instant,
};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::{error::TunnelError, frame::Frame, stream::TunnelStreamState};

pub const MIN_MAX_STREAMS: u32 = 64;
pub const MAX_MAX_STREAMS: u32 = 2048;
const MAX_ALLOC_ATTEMPTS_OVERHEAD: u32 = 16;

/// Writes whole frames to the underlying WebSocket. Implemented over
/// `axum::extract::ws::WebSocket`'s split sink in `crates/server`; a plain
/// in-memory double is used in this crate's own tests so the connection
/// table, allocator, and stream bookkeeping are testable without a real
/// socket.
#[async_trait]
pub trait FrameWriter: Send + Sync {
    async fn write_frame(&self, bytes: Vec<u8>) -> Result<(), TunnelError>;
}

/// One tunnel connection: owns a stream table keyed by `stream_id`, a
/// monotonic even-id allocator starting at 2, and a serialized writer so
/// frames from concurrent dispatcher calls never interleave on the wire.
pub struct TunnelConnection {
    pub node_id: String,
    pub node_name: String,
    pub max_streams: u32,
    pub connected_at: Instant,
    alive: AtomicBool,
    next_stream_id: AtomicU32,
    streams: AsyncMutex<HashMap<u32, Arc<TunnelStreamState>>>,
    writer: AsyncMutex<Box<dyn FrameWriter>>,
}

impl TunnelConnection {
    pub fn new(node_id: impl Into<String>, node_name: impl Into<String>, max_streams: Option<u32>, writer: Box<dyn FrameWriter>) -> Self {
        let max_streams = max_streams.unwrap_or(MAX_MAX_STREAMS).clamp(MIN_MAX_STREAMS, MAX_MAX_STREAMS);
        Self {
            node_id: node_id.into(),
            node_name: node_name.into(),
            max_streams,
            connected_at: Instant::now(),
            alive: AtomicBool::new(true),
            next_stream_id: AtomicU32::new(2),
            streams: AsyncMutex::new(HashMap::new()),
            writer: AsyncMutex::new(writer),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub async fn stream_count(&self) -> usize {
        self.streams.lock().await.len()
    }

    pub async fn send_frame(&self, frame: &Frame) -> Result<(), TunnelError> {
        let writer = self.writer.lock().await;
        writer.write_frame(frame.encode()).await
    }

    pub async fn get_stream(&self, stream_id: u32) -> Option<Arc<TunnelStreamState>> {
        self.streams.lock().await.get(&stream_id).cloned()
    }

    pub async fn has_stream(&self, stream_id: u32) -> bool {
        self.streams.lock().await.contains_key(&stream_id)
    }

    pub async fn remove_stream(&self, stream_id: u32) {
        self.streams.lock().await.remove(&stream_id);
    }

    /// Allocates an unused even stream id starting at 2, wrapping at
    /// `0xFFFFFFFE`, skipping ids currently in the stream table. Fails if a
    /// full wrap around the allocation space finds none free.
    pub async fn alloc_stream_id(&self) -> Result<u32, TunnelError> {
        let streams = self.streams.lock().await;
        let attempts = self.max_streams + MAX_ALLOC_ATTEMPTS_OVERHEAD;
        for _ in 0..attempts {
            let candidate = self.next_stream_id.fetch_add(2, Ordering::AcqRel);
            if self.next_stream_id.load(Ordering::Acquire) > 0xFFFF_FFFE {
                self.next_stream_id.store(2, Ordering::Release);
            }
            if !streams.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(TunnelError::StreamIdSpaceExhausted)
    }

    /// Allocates a stream id and registers its state in one step, so the
    /// stream table can never observe an id that was allocated but never
    /// tracked.
    pub async fn create_stream(&self) -> Result<Arc<TunnelStreamState>, TunnelError> {
        let mut streams = self.streams.lock().await;
        let attempts = self.max_streams + MAX_ALLOC_ATTEMPTS_OVERHEAD;
        for _ in 0..attempts {
            let candidate = self.next_stream_id.fetch_add(2, Ordering::AcqRel);
            if self.next_stream_id.load(Ordering::Acquire) > 0xFFFF_FFFE {
                self.next_stream_id.store(2, Ordering::Release);
            }
            if let std::collections::hash_map::Entry::Vacant(entry) = streams.entry(candidate) {
                let state = Arc::new(TunnelStreamState::new(candidate));
                entry.insert(state.clone());
                return Ok(state);
            }
        }
        Err(TunnelError::StreamIdSpaceExhausted)
    }

    /// Routes frames destined for connection-scoped processing (heartbeat,
    /// ping) or a registered stream; unknown/removed stream ids are
    /// dropped (spec §4.7 "Removed stream frames ignored").
    pub async fn handle_response_frame(&self, frame: Frame) {
        use crate::frame::MsgType;

        let stream = self.get_stream(frame.stream_id).await;
        match frame.msg_type {
            MsgType::ResponseHeaders => {
                let Some(stream) = stream else { return };
                match serde_json::from_slice::<ResponseHeadersPayload>(&frame.payload) {
                    Ok(payload) => stream.set_response_headers(payload.status, payload.headers),
                    Err(e) => stream.set_error(format!("invalid response headers: {e}")),
                }
            }
            MsgType::ResponseBody => {
                if let Some(stream) = stream {
                    stream.push_body_chunk(bytes::Bytes::from(frame.payload));
                }
            }
            MsgType::StreamEnd => {
                if let Some(stream) = stream {
                    stream.set_done();
                    self.remove_stream(frame.stream_id).await;
                }
            }
            MsgType::StreamError => {
                if let Some(stream) = stream {
                    let message = if frame.payload.is_empty() {
                        "stream error".to_string()
                    } else {
                        String::from_utf8_lossy(&frame.payload).into_owned()
                    };
                    stream.set_error(message);
                    self.remove_stream(frame.stream_id).await;
                }
            }
            _ => {}
        }
    }

    /// Fails every in-flight stream with a disconnect error and clears the
    /// table; called on connection teardown (spec §3.3 lifecycle summary).
    pub async fn cancel_all_streams(&self) {
        let mut streams = self.streams.lock().await;
        for (_, state) in streams.drain() {
            state.set_error("tunnel disconnected");
        }
    }
}

#[derive(serde::Deserialize)]
struct ResponseHeadersPayload {
    status: u16,
    #[serde(default)]
    headers: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::frame::MsgType;

    struct RecordingWriter {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingWriter {
        fn new() -> Arc<Self> {
            Arc::new(Self { sent: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl FrameWriter for Arc<RecordingWriter> {
        async fn write_frame(&self, bytes: Vec<u8>) -> Result<(), TunnelError> {
            self.sent.lock().unwrap().push(bytes);
            Ok(())
        }
    }

    fn connection(max_streams: Option<u32>) -> (TunnelConnection, Arc<RecordingWriter>) {
        let writer = RecordingWriter::new();
        let conn = TunnelConnection::new("node-1", "node-1", max_streams, Box::new(writer.clone()));
        (conn, writer)
    }

    #[tokio::test]
    async fn allocates_even_ids_skipping_occupied() {
        let (conn, _writer) = connection(None);
        let first = conn.create_stream().await.unwrap();
        assert_eq!(first.stream_id, 2);

        let second = conn.create_stream().await.unwrap();
        assert_eq!(second.stream_id, 4);

        conn.remove_stream(4).await;
        let third = conn.create_stream().await.unwrap();
        assert_eq!(third.stream_id, 6);
        assert_ne!(third.stream_id, 0);
        assert_ne!(third.stream_id, 1);
    }

    #[tokio::test]
    async fn max_streams_clamped_to_bounds() {
        let (conn_low, _) = connection(Some(1));
        assert_eq!(conn_low.max_streams, MIN_MAX_STREAMS);

        let (conn_high, _) = connection(Some(1_000_000));
        assert_eq!(conn_high.max_streams, MAX_MAX_STREAMS);
    }

    #[tokio::test]
    async fn unknown_stream_frame_is_a_no_op() {
        let (conn, _writer) = connection(None);
        conn.handle_response_frame(Frame::new(999, MsgType::ResponseBody, 0, b"ignored".to_vec())).await;
        assert_eq!(conn.stream_count().await, 0);
    }

    #[tokio::test]
    async fn stream_end_completes_and_removes_stream() {
        let (conn, _writer) = connection(None);
        let stream = conn.create_stream().await.unwrap();
        let sid = stream.stream_id;

        let headers = serde_json::json!({"status": 200, "headers": [["content-type", "text/event-stream"]]});
        conn.handle_response_frame(Frame::new(sid, MsgType::ResponseHeaders, 0, serde_json::to_vec(&headers).unwrap()))
            .await;
        conn.handle_response_frame(Frame::new(sid, MsgType::ResponseBody, 0, b"chunk".to_vec())).await;
        conn.handle_response_frame(Frame::new(sid, MsgType::StreamEnd, 0, Vec::new())).await;

        assert!(!conn.has_stream(sid).await);
        let (status, _) = stream.wait_headers(std::time::Duration::from_millis(100)).await.unwrap();
        assert_eq!(status, 200);
    }
}
