//! Proxy-node tunnel: a binary frame protocol multiplexed over a single
//! WebSocket connection that lets a gateway dispatch HTTP-shaped requests to
//! a node that has no inbound network reachability of its own (spec §4.5-§4.8).

pub mod connection;
pub mod error;
pub mod frame;
pub mod manager;
pub mod stream;
pub mod transport;

pub use connection::{FrameWriter, MAX_MAX_STREAMS, MIN_MAX_STREAMS, TunnelConnection};
pub use error::TunnelError;
pub use frame::{CONNECTION_STREAM_ID, Flags, Frame, FrameError, HEADER_SIZE, MsgType, RESERVED_STREAM_ID};
pub use manager::{HeartbeatSink, NoopHeartbeatSink, TunnelManager};
pub use stream::{HeaderPairs, TunnelStreamState};
pub use transport::{TunnelHttpResponse, TunnelHttpTransport, filter_headers, is_hop_by_hop};
