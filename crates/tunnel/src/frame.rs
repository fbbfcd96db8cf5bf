//! C7 Tunnel Protocol: the binary frame format multiplexed over one
//! WebSocket connection (spec §3.3/§4.5).
//!
//! ```text
//! offset 0..4   stream_id   (uint32 big-endian)
//! offset 4      msg_type    (uint8)
//! offset 5      flags       (uint8)
//! offset 6..10  payload_len (uint32 big-endian)
//! offset 10..   payload     (exactly payload_len bytes)
//! ```

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

pub const HEADER_SIZE: usize = 10;

/// Stream id 0 is reserved for connection-scoped messages (PING/PONG/GOAWAY/
/// heartbeat). Stream id 1 is reserved by the original protocol for
/// undocumented future use; peers must not allocate it.
pub const CONNECTION_STREAM_ID: u32 = 0;
pub const RESERVED_STREAM_ID: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    RequestHeaders = 0x01,
    RequestBody = 0x02,
    ResponseHeaders = 0x03,
    ResponseBody = 0x04,
    StreamEnd = 0x05,
    StreamError = 0x06,
    Ping = 0x10,
    Pong = 0x11,
    GoAway = 0x12,
    HeartbeatData = 0x13,
    HeartbeatAck = 0x14,
}

impl MsgType {
    fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0x01 => MsgType::RequestHeaders,
            0x02 => MsgType::RequestBody,
            0x03 => MsgType::ResponseHeaders,
            0x04 => MsgType::ResponseBody,
            0x05 => MsgType::StreamEnd,
            0x06 => MsgType::StreamError,
            0x10 => MsgType::Ping,
            0x11 => MsgType::Pong,
            0x12 => MsgType::GoAway,
            0x13 => MsgType::HeartbeatData,
            0x14 => MsgType::HeartbeatAck,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u8);

impl Flags {
    pub const END_STREAM: u8 = 0x01;
    pub const GZIP_COMPRESSED: u8 = 0x02;

    pub fn is_end_stream(self) -> bool {
        self.0 & Self::END_STREAM != 0
    }

    pub fn is_gzip(self) -> bool {
        self.0 & Self::GZIP_COMPRESSED != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_id: u32,
    pub msg_type: MsgType,
    pub flags: Flags,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too short: need {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },
    #[error("incomplete frame: need {need} bytes total, have {have}")]
    Incomplete { need: usize, have: usize },
    #[error("unknown message type 0x{0:02x}")]
    UnknownMsgType(u8),
}

impl Frame {
    pub fn new(stream_id: u32, msg_type: MsgType, flags: u8, payload: Vec<u8>) -> Self {
        Self {
            stream_id,
            msg_type,
            flags: Flags(flags),
            payload,
        }
    }

    /// Encodes to exactly `10 + payload.len()` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u32(self.stream_id);
        buf.put_u8(self.msg_type as u8);
        buf.put_u8(self.flags.0);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Decodes one frame from a byte slice that must contain the full frame
    /// (header + payload); extra trailing bytes are an error by design — the
    /// caller is expected to pass exactly one WebSocket binary message.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < HEADER_SIZE {
            return Err(FrameError::TooShort {
                need: HEADER_SIZE,
                have: data.len(),
            });
        }

        let mut header = &data[..HEADER_SIZE];
        let stream_id = header.get_u32();
        let msg_type_raw = header.get_u8();
        let flags = header.get_u8();
        let payload_len = header.get_u32() as usize;

        let expected_total = HEADER_SIZE + payload_len;
        if data.len() < expected_total {
            return Err(FrameError::Incomplete {
                need: expected_total,
                have: data.len(),
            });
        }

        let msg_type = MsgType::from_u8(msg_type_raw).ok_or(FrameError::UnknownMsgType(msg_type_raw))?;
        let payload = data[HEADER_SIZE..expected_total].to_vec();

        Ok(Self {
            stream_id,
            msg_type,
            flags: Flags(flags),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bit_exactly() {
        let frame = Frame::new(42, MsgType::RequestBody, Flags::END_STREAM, b"hello".to_vec());
        let encoded = frame.encode();
        assert_eq!(encoded.len(), HEADER_SIZE + 5);

        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trips_empty_payload() {
        let frame = Frame::new(0, MsgType::Ping, 0, Vec::new());
        let encoded = frame.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(Frame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn rejects_short_header() {
        assert!(matches!(Frame::decode(&[0u8; 4]), Err(FrameError::TooShort { .. })));
    }

    #[test]
    fn rejects_truncated_payload() {
        let frame = Frame::new(1, MsgType::ResponseBody, 0, b"abcdef".to_vec());
        let encoded = frame.encode();
        let truncated = &encoded[..encoded.len() - 2];
        assert!(matches!(Frame::decode(truncated), Err(FrameError::Incomplete { .. })));
    }

    #[test]
    fn rejects_unknown_msg_type() {
        let mut bytes = Frame::new(1, MsgType::Ping, 0, Vec::new()).encode();
        bytes[4] = 0x99;
        assert!(matches!(Frame::decode(&bytes), Err(FrameError::UnknownMsgType(0x99))));
    }

    #[test]
    fn flags_decode_bitwise() {
        let flags = Flags(Flags::END_STREAM | Flags::GZIP_COMPRESSED);
        assert!(flags.is_end_stream());
        assert!(flags.is_gzip());
        assert!(!Flags(0).is_end_stream());
    }
}
