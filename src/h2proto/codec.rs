use bytes::{Bytes, BytesMut};
use fnv::FnvHashMap;

use crate::config::LocalSettings;
use crate::error::ProtocolError;
use crate::h2proto::frame::{self, FrameHead, Kind, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN, FLAG_ACK, FLAG_END_STREAM};
use crate::h2proto::hpack;
use crate::h2proto::settings::SettingCode;
use crate::h2proto::{Event, Reason, StreamId};

/// `PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n`, sent once by the client before any frame.
const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Frame-level engine: turns outbound calls into queued bytes
/// ([`data_to_send`](Codec::data_to_send)) and inbound bytes into
/// [`Event`]s ([`feed`](Codec::feed)). Owns no socket; the connection
/// engine is responsible for all I/O.
#[derive(Debug)]
pub struct Codec {
    next_stream_id: u32,
    peer_max_frame_size: u32,
    peer_initial_window_size: u32,
    connection_send_window: i64,
    stream_send_windows: FnvHashMap<u32, i64>,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Codec {
    pub fn new() -> Self {
        Codec {
            next_stream_id: 1,
            peer_max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            peer_initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            connection_send_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            stream_send_windows: FnvHashMap::default(),
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
        }
    }

    /// Sends the client preface and a single initial SETTINGS frame.
    /// `ENABLE_CONNECT_PROTOCOL` is never added to this list, matching a
    /// server compatibility quirk some deployments still carry.
    pub fn initiate(&mut self, local: LocalSettings) {
        self.write_buf.extend_from_slice(CONNECTION_PREFACE);
        let values = [
            (SettingCode::EnablePush as u16, local.enable_push),
            (SettingCode::MaxConcurrentStreams as u16, local.max_concurrent_streams),
            (SettingCode::MaxHeaderListSize as u16, local.max_header_list_size),
        ];
        frame::write_settings(&mut self.write_buf, &values);
    }

    /// Allocates the next stream id, returning `None` once the 31-bit id
    /// space is exhausted (the caller should signal `NewConnectionRequired`).
    pub fn get_next_stream_id(&mut self) -> Option<StreamId> {
        if self.next_stream_id > 0x7fff_ffff - 1 {
            return None;
        }
        let id = self.next_stream_id;
        self.next_stream_id += 2;
        self.stream_send_windows.insert(id, self.peer_initial_window_size as i64);
        Some(StreamId::new(id))
    }

    pub fn send_headers(&mut self, stream_id: StreamId, headers: &[(Bytes, Bytes)], end_stream: bool) {
        let mut block = BytesMut::new();
        for (name, value) in headers {
            hpack::encode_field(&mut block, name, value);
        }
        frame::write_headers(&mut self.write_buf, stream_id.as_u32(), &block, end_stream);
    }

    /// Queues a DATA frame. The caller must have already chunked `chunk`
    /// to at most `min(local_flow_window(stream_id), max_outbound_frame_size())`.
    pub fn send_data(&mut self, stream_id: StreamId, chunk: &[u8]) -> Result<(), ProtocolError> {
        let len = chunk.len() as i64;
        if len as u32 > self.peer_max_frame_size || len > self.connection_send_window {
            return Err(ProtocolError::new(Reason::FlowControlError, "DATA chunk exceeds available flow-control window"));
        }
        let window = self
            .stream_send_windows
            .entry(stream_id.as_u32())
            .or_insert(self.peer_initial_window_size as i64);
        if len > *window {
            return Err(ProtocolError::new(Reason::FlowControlError, "DATA chunk exceeds stream flow-control window"));
        }
        *window -= len;
        self.connection_send_window -= len;
        frame::write_data(&mut self.write_buf, stream_id.as_u32(), chunk, false);
        Ok(())
    }

    pub fn end_stream(&mut self, stream_id: StreamId) {
        frame::write_data(&mut self.write_buf, stream_id.as_u32(), &[], true);
    }

    /// `stream_id = None` targets the connection-level window.
    pub fn increment_window(&mut self, amount: u32, stream_id: Option<StreamId>) {
        let sid = stream_id.map(StreamId::as_u32).unwrap_or(StreamId::CONNECTION);
        frame::write_window_update(&mut self.write_buf, sid, amount);
    }

    /// Acks a received DATA frame's `flow_controlled_length`, replenishing
    /// both the stream and connection receive windows.
    pub fn acknowledge_received_data(&mut self, stream_id: StreamId, amount: u32) {
        frame::write_window_update(&mut self.write_buf, stream_id.as_u32(), amount);
        frame::write_window_update(&mut self.write_buf, StreamId::CONNECTION, amount);
    }

    /// `min(local_flow_window(stream_id), max_outbound_frame_size())`, i.e.
    /// the most this endpoint may send to `stream_id` in one DATA frame.
    pub fn local_flow_window(&self, stream_id: StreamId) -> u32 {
        let stream_window = self
            .stream_send_windows
            .get(&stream_id.as_u32())
            .copied()
            .unwrap_or(self.peer_initial_window_size as i64);
        let window = stream_window.min(self.connection_send_window);
        window.max(0) as u32
    }

    pub fn max_outbound_frame_size(&self) -> u32 {
        self.peer_max_frame_size
    }

    pub fn data_to_send(&mut self) -> Bytes {
        self.write_buf.split().freeze()
    }

    /// Feeds freshly read bytes into the frame parser, updating internal
    /// flow-control and settings state and returning the events produced.
    /// SETTINGS and PING frames that require an immediate reply are
    /// answered here, queued for the next `data_to_send`.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Event>, ProtocolError> {
        self.read_buf.extend_from_slice(bytes);
        let mut events = Vec::new();

        loop {
            if self.read_buf.len() < FRAME_HEADER_LEN {
                break;
            }
            let head = FrameHead::parse(&self.read_buf[..FRAME_HEADER_LEN]);
            let total = FRAME_HEADER_LEN + head.length as usize;
            if self.read_buf.len() < total {
                break;
            }
            let mut frame_buf = self.read_buf.split_to(total);
            let payload = frame_buf.split_off(FRAME_HEADER_LEN).freeze();

            match head.kind {
                Kind::Settings => self.handle_settings(&head, payload)?,
                Kind::WindowUpdate => self.handle_window_update(&head, &payload)?,
                Kind::Ping => self.handle_ping(&head, &payload, &mut events),
                Kind::GoAway => {
                    let (_last_stream_id, error_code) = frame::parse_goaway_payload(&payload)?;
                    events.push(Event::ConnectionTerminated { error_code });
                }
                Kind::RstStream => {
                    let stream_id = require_stream_id(head.stream_id)?;
                    let error_code = frame::parse_rst_stream_payload(&payload)?;
                    events.push(Event::StreamReset { stream_id, error_code });
                }
                Kind::Headers => self.handle_headers(&head, payload, &mut events)?,
                Kind::Data => self.handle_data(&head, payload, &mut events)?,
                Kind::Priority | Kind::PushPromise | Kind::Continuation | Kind::Unknown(_) => {
                    // Prioritization, push, and continuation frames are outside this
                    // engine's scope; unknown frame types are ignored per RFC 7540 §4.1.
                }
            }
        }

        Ok(events)
    }

    fn handle_settings(&mut self, head: &FrameHead, payload: Bytes) -> Result<(), ProtocolError> {
        if head.flags & FLAG_ACK != 0 {
            return Ok(());
        }
        for (id, value) in frame::parse_settings_payload(&payload)? {
            if id == SettingCode::MaxFrameSize as u16 {
                self.peer_max_frame_size = value.clamp(DEFAULT_MAX_FRAME_SIZE, 16_777_215);
            } else if id == SettingCode::InitialWindowSize as u16 {
                self.peer_initial_window_size = value;
            }
        }
        frame::write_settings_ack(&mut self.write_buf);
        Ok(())
    }

    fn handle_window_update(&mut self, head: &FrameHead, payload: &Bytes) -> Result<(), ProtocolError> {
        let increment = frame::parse_window_update_payload(payload)?;
        if head.stream_id == StreamId::CONNECTION {
            self.connection_send_window += increment as i64;
        } else {
            let window = self.stream_send_windows.entry(head.stream_id).or_insert(self.peer_initial_window_size as i64);
            *window += increment as i64;
        }
        Ok(())
    }

    fn handle_ping(&mut self, head: &FrameHead, payload: &Bytes, events: &mut Vec<Event>) {
        let mut body = [0u8; 8];
        let n = payload.len().min(8);
        body[..n].copy_from_slice(&payload[..n]);
        if head.flags & FLAG_ACK == 0 {
            frame::write_ping(&mut self.write_buf, body, true);
        } else {
            events.push(Event::Ping { payload: body });
        }
    }

    fn handle_headers(&mut self, head: &FrameHead, payload: Bytes, events: &mut Vec<Event>) -> Result<(), ProtocolError> {
        let stream_id = require_stream_id(head.stream_id)?;
        let fields = hpack::decode_fields(payload)?;

        let mut status = 200u16;
        let mut headers = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            if name.as_ref() == b":status" {
                status = std::str::from_utf8(&value).ok().and_then(|s| s.parse().ok()).unwrap_or(200);
            } else if !name.starts_with(b":") {
                headers.push((name, value));
            }
        }
        events.push(Event::ResponseReceived { stream_id, status, headers });
        if head.flags & FLAG_END_STREAM != 0 {
            events.push(Event::StreamEnded { stream_id });
        }
        Ok(())
    }

    fn handle_data(&mut self, head: &FrameHead, payload: Bytes, events: &mut Vec<Event>) -> Result<(), ProtocolError> {
        let stream_id = require_stream_id(head.stream_id)?;
        let end_stream = head.flags & FLAG_END_STREAM != 0;
        let flow_controlled_length = payload.len() as u32;
        events.push(Event::DataReceived { stream_id, data: payload, flow_controlled_length, end_stream });
        if end_stream {
            events.push(Event::StreamEnded { stream_id });
        }
        Ok(())
    }
}

impl Default for Codec {
    fn default() -> Self {
        Codec::new()
    }
}

fn require_stream_id(raw: u32) -> Result<StreamId, ProtocolError> {
    if raw == 0 || raw % 2 == 0 {
        return Err(ProtocolError::new(Reason::ProtocolError, "frame carries an invalid client stream id"));
    }
    Ok(StreamId::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_strictly_increasing_odd_stream_ids() {
        let mut codec = Codec::new();
        let a = codec.get_next_stream_id().unwrap();
        let b = codec.get_next_stream_id().unwrap();
        assert!(a.as_u32() < b.as_u32());
        assert_eq!(a.as_u32() % 2, 1);
        assert_eq!(b.as_u32() % 2, 1);
    }

    #[test]
    fn flow_window_shrinks_on_send_and_grows_on_window_update() {
        let mut codec = Codec::new();
        let sid = codec.get_next_stream_id().unwrap();
        let before = codec.local_flow_window(sid);
        codec.send_data(sid, &[0u8; 100]).unwrap();
        assert_eq!(codec.local_flow_window(sid), before - 100);

        let mut wu = BytesMut::new();
        frame::write_window_update(&mut wu, sid.as_u32(), 50);
        let _ = codec.data_to_send(); // drain our own DATA frame first
        codec.feed(&wu).unwrap();
        assert_eq!(codec.local_flow_window(sid), before - 100 + 50);
    }

    #[test]
    fn rejects_data_over_the_advertised_window() {
        let mut codec = Codec::new();
        let sid = codec.get_next_stream_id().unwrap();
        let oversized = vec![0u8; DEFAULT_INITIAL_WINDOW_SIZE as usize + 1];
        assert!(codec.send_data(sid, &oversized).is_err());
    }

    #[test]
    fn settings_update_peer_max_frame_size() {
        let mut codec = Codec::new();
        let mut buf = BytesMut::new();
        frame::write_settings(&mut buf, &[(SettingCode::MaxFrameSize as u16, 20_000)]);
        codec.feed(&buf).unwrap();
        assert_eq!(codec.max_outbound_frame_size(), 20_000);
    }
}
