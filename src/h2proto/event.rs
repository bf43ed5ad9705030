use bytes::Bytes;

use crate::h2proto::{Reason, StreamId};

/// An update produced by feeding bytes to the [`Codec`](super::Codec).
/// Routed by the engine to the originating stream's FIFO in arrival order,
/// per the connection's delivery-ordering invariant.
#[derive(Debug)]
pub enum Event {
    /// Response HEADERS arrived; `status` and non-pseudo headers precede
    /// any DATA for this stream.
    ResponseReceived { stream_id: StreamId, status: u16, headers: Vec<(Bytes, Bytes)> },
    /// A DATA frame arrived. `flow_controlled_length` is the amount the
    /// receiver must acknowledge via `acknowledge_received_data`.
    DataReceived { stream_id: StreamId, data: Bytes, flow_controlled_length: u32, end_stream: bool },
    /// The stream's HEADERS or DATA carried END_STREAM.
    StreamEnded { stream_id: StreamId },
    /// Peer sent RST_STREAM. Exposes `error_code`, so the engine's
    /// `receive_events` loop raises a `ProtocolError` for it before it
    /// would ever reach a stream FIFO.
    StreamReset { stream_id: StreamId, error_code: Reason },
    /// Peer sent GOAWAY. Exposes `error_code`.
    ConnectionTerminated { error_code: Reason },
    Ping { payload: [u8; 8] },
}

impl Event {
    pub fn stream_id(&self) -> u32 {
        match self {
            Event::ResponseReceived { stream_id, .. }
            | Event::DataReceived { stream_id, .. }
            | Event::StreamEnded { stream_id }
            | Event::StreamReset { stream_id, .. } => stream_id.as_u32(),
            Event::ConnectionTerminated { .. } | Event::Ping { .. } => StreamId::CONNECTION,
        }
    }

    /// Mirrors h2's `hasattr(event, "error_code")`: events carrying a wire
    /// error code are treated as immediately fatal by the connection's
    /// reader loop.
    pub fn error_code(&self) -> Option<Reason> {
        match self {
            Event::StreamReset { error_code, .. } => Some(*error_code),
            Event::ConnectionTerminated { error_code } => Some(*error_code),
            _ => None,
        }
    }
}
