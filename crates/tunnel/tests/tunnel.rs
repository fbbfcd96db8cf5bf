//! End-to-end exercise of the frame codec, connection stream table, and
//! manager pool together, without a real WebSocket.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tunnel::{Flags, Frame, FrameWriter, MsgType, TunnelConnection, TunnelError, TunnelManager};

struct RecordingWriter {
    sent: Mutex<Vec<Frame>>,
}

impl RecordingWriter {
    fn new() -> Arc<Self> {
        Arc::new(Self { sent: Mutex::new(Vec::new()) })
    }

    fn take(&self) -> Vec<Frame> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

#[async_trait]
impl FrameWriter for Arc<RecordingWriter> {
    async fn write_frame(&self, bytes: Vec<u8>) -> Result<(), TunnelError> {
        self.sent.lock().unwrap().push(Frame::decode(&bytes).unwrap());
        Ok(())
    }
}

#[tokio::test]
async fn send_request_emits_headers_then_body_with_end_stream() {
    let manager = TunnelManager::new();
    let writer = RecordingWriter::new();
    let conn = Arc::new(TunnelConnection::new("node-a", "node-a", None, Box::new(writer.clone())));
    manager.register(conn.clone()).await;

    let stream = manager
        .send_request(
            "node-a",
            "POST",
            "https://api.example.com/v1/chat/completions",
            &[("authorization".to_string(), "Bearer sk-test".to_string())],
            Some(b"{\"model\":\"gpt-4\"}".to_vec()),
            30,
        )
        .await
        .unwrap();

    let frames = writer.take();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].msg_type, MsgType::RequestHeaders);
    assert_eq!(frames[0].stream_id, stream.stream_id);
    assert_eq!(frames[1].msg_type, MsgType::RequestBody);
    assert!(frames[1].flags.is_end_stream());
}

#[tokio::test]
async fn full_response_round_trip_through_manager_dispatch() {
    let manager = TunnelManager::new();
    let writer = RecordingWriter::new();
    let conn = Arc::new(TunnelConnection::new("node-b", "node-b", None, Box::new(writer.clone())));
    manager.register(conn.clone()).await;

    let stream = manager.send_request("node-b", "GET", "https://api.example.com/v1/models", &[], None, 30).await.unwrap();
    writer.take();

    let headers_payload = serde_json::json!({"status": 200, "headers": [["content-type", "application/json"]]});
    manager
        .handle_incoming_frame(
            &conn,
            Frame::new(stream.stream_id, MsgType::ResponseHeaders, 0, serde_json::to_vec(&headers_payload).unwrap()),
            &tunnel::NoopHeartbeatSink,
        )
        .await
        .unwrap();
    manager
        .handle_incoming_frame(&conn, Frame::new(stream.stream_id, MsgType::ResponseBody, 0, b"{\"ok\":true}".to_vec()), &tunnel::NoopHeartbeatSink)
        .await
        .unwrap();
    manager
        .handle_incoming_frame(&conn, Frame::new(stream.stream_id, MsgType::StreamEnd, 0, Vec::new()), &tunnel::NoopHeartbeatSink)
        .await
        .unwrap();

    let (status, headers) = stream.wait_headers(Duration::from_secs(1)).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(headers, vec![("content-type".to_string(), "application/json".to_string())]);
    assert_eq!(stream.next_chunk(Duration::from_secs(1)).await.unwrap(), Some(bytes::Bytes::from_static(b"{\"ok\":true}")));
    assert_eq!(stream.next_chunk(Duration::from_secs(1)).await.unwrap(), None);
    assert!(!conn.has_stream(stream.stream_id).await);
}

#[tokio::test]
async fn heartbeat_data_is_acked_on_stream_zero() {
    let manager = TunnelManager::new();
    let writer = RecordingWriter::new();
    let conn = Arc::new(TunnelConnection::new("node-c", "node-c", None, Box::new(writer.clone())));
    manager.register(conn.clone()).await;

    manager
        .handle_incoming_frame(&conn, Frame::new(0, MsgType::HeartbeatData, 0, b"{\"load\":0.2}".to_vec()), &tunnel::NoopHeartbeatSink)
        .await
        .unwrap();

    let frames = writer.take();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].msg_type, MsgType::HeartbeatAck);
    assert_eq!(frames[0].stream_id, 0);
}

#[tokio::test]
async fn ping_is_echoed_as_pong() {
    let manager = TunnelManager::new();
    let writer = RecordingWriter::new();
    let conn = Arc::new(TunnelConnection::new("node-d", "node-d", None, Box::new(writer.clone())));
    manager.register(conn.clone()).await;

    manager
        .handle_incoming_frame(&conn, Frame::new(0, MsgType::Ping, 0, b"ping-payload".to_vec()), &tunnel::NoopHeartbeatSink)
        .await
        .unwrap();

    let frames = writer.take();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].msg_type, MsgType::Pong);
    assert_eq!(frames[0].payload, b"ping-payload");
}

#[tokio::test]
async fn send_request_fails_without_a_registered_connection() {
    let manager = TunnelManager::new();
    let err = manager.send_request("ghost-node", "GET", "https://example.com", &[], None, 30).await.unwrap_err();
    assert!(matches!(err, TunnelError::NotConnected(node) if node == "ghost-node"));
}
