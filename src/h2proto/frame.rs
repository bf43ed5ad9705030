use std::num::NonZeroU32;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

pub const FRAME_HEADER_LEN: usize = 9;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;

/// An odd, positive stream identifier, unique within a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(NonZeroU32);

impl StreamId {
    pub const CONNECTION: u32 = 0;

    pub fn new(id: u32) -> Self {
        debug_assert!(id != 0 && id % 2 == 1, "stream ids must be odd and non-zero");
        StreamId(NonZeroU32::new(id).expect("stream id must be non-zero"))
    }

    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl Kind {
    fn from_u8(b: u8) -> Kind {
        match b {
            0x0 => Kind::Data,
            0x1 => Kind::Headers,
            0x2 => Kind::Priority,
            0x3 => Kind::RstStream,
            0x4 => Kind::Settings,
            0x5 => Kind::PushPromise,
            0x6 => Kind::Ping,
            0x7 => Kind::GoAway,
            0x8 => Kind::WindowUpdate,
            0x9 => Kind::Continuation,
            other => Kind::Unknown(other),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Kind::Data => 0x0,
            Kind::Headers => 0x1,
            Kind::Priority => 0x2,
            Kind::RstStream => 0x3,
            Kind::Settings => 0x4,
            Kind::PushPromise => 0x5,
            Kind::Ping => 0x6,
            Kind::GoAway => 0x7,
            Kind::WindowUpdate => 0x8,
            Kind::Continuation => 0x9,
            Kind::Unknown(b) => b,
        }
    }
}

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_ACK: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;

/// The 9-octet header shared by every frame (RFC 7540 §4.1).
#[derive(Debug, Clone, Copy)]
pub struct FrameHead {
    pub length: u32,
    pub kind: Kind,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHead {
    pub fn parse(buf: &[u8]) -> FrameHead {
        debug_assert!(buf.len() >= FRAME_HEADER_LEN);
        let length = (buf[0] as u32) << 16 | (buf[1] as u32) << 8 | buf[2] as u32;
        let kind = Kind::from_u8(buf[3]);
        let flags = buf[4];
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
        FrameHead { length, kind, flags, stream_id }
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u8((self.length >> 16) as u8);
        out.put_u8((self.length >> 8) as u8);
        out.put_u8(self.length as u8);
        out.put_u8(self.kind.as_u8());
        out.put_u8(self.flags);
        out.put_u32(self.stream_id & 0x7fff_ffff);
    }
}

pub fn write_data(out: &mut BytesMut, stream_id: u32, data: &[u8], end_stream: bool) {
    let head = FrameHead {
        length: data.len() as u32,
        kind: Kind::Data,
        flags: if end_stream { FLAG_END_STREAM } else { 0 },
        stream_id,
    };
    head.encode(out);
    out.put_slice(data);
}

pub fn write_headers(out: &mut BytesMut, stream_id: u32, block: &[u8], end_stream: bool) {
    let head = FrameHead {
        length: block.len() as u32,
        kind: Kind::Headers,
        flags: FLAG_END_HEADERS | if end_stream { FLAG_END_STREAM } else { 0 },
        stream_id,
    };
    head.encode(out);
    out.put_slice(block);
}

pub fn write_settings(out: &mut BytesMut, values: &[(u16, u32)]) {
    let head = FrameHead {
        length: (values.len() * 6) as u32,
        kind: Kind::Settings,
        flags: 0,
        stream_id: StreamId::CONNECTION,
    };
    head.encode(out);
    for (id, value) in values {
        out.put_u16(*id);
        out.put_u32(*value);
    }
}

pub fn write_settings_ack(out: &mut BytesMut) {
    let head = FrameHead { length: 0, kind: Kind::Settings, flags: FLAG_ACK, stream_id: StreamId::CONNECTION };
    head.encode(out);
}

pub fn write_window_update(out: &mut BytesMut, stream_id: u32, increment: u32) {
    let head = FrameHead { length: 4, kind: Kind::WindowUpdate, flags: 0, stream_id };
    head.encode(out);
    out.put_u32(increment & 0x7fff_ffff);
}

pub fn write_ping(out: &mut BytesMut, payload: [u8; 8], ack: bool) {
    let head = FrameHead {
        length: 8,
        kind: Kind::Ping,
        flags: if ack { FLAG_ACK } else { 0 },
        stream_id: StreamId::CONNECTION,
    };
    head.encode(out);
    out.put_slice(&payload);
}

pub fn write_rst_stream(out: &mut BytesMut, stream_id: u32, error_code: u32) {
    let head = FrameHead { length: 4, kind: Kind::RstStream, flags: 0, stream_id };
    head.encode(out);
    out.put_u32(error_code);
}

/// Errors carried on the wire by RST_STREAM and GOAWAY (RFC 7540 §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    EnhanceYourCalm,
    InadequateSecurity,
    Http11Required,
    Unknown(u32),
}

impl Reason {
    pub fn from_u32(v: u32) -> Reason {
        match v {
            0x0 => Reason::NoError,
            0x1 => Reason::ProtocolError,
            0x2 => Reason::InternalError,
            0x3 => Reason::FlowControlError,
            0x4 => Reason::SettingsTimeout,
            0x5 => Reason::StreamClosed,
            0x6 => Reason::FrameSizeError,
            0x7 => Reason::RefusedStream,
            0x8 => Reason::Cancel,
            0x9 => Reason::CompressionError,
            0xa => Reason::ConnectError,
            0xb => Reason::EnhanceYourCalm,
            0xc => Reason::InadequateSecurity,
            0xd => Reason::Http11Required,
            other => Reason::Unknown(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Reason::NoError => 0x0,
            Reason::ProtocolError => 0x1,
            Reason::InternalError => 0x2,
            Reason::FlowControlError => 0x3,
            Reason::SettingsTimeout => 0x4,
            Reason::StreamClosed => 0x5,
            Reason::FrameSizeError => 0x6,
            Reason::RefusedStream => 0x7,
            Reason::Cancel => 0x8,
            Reason::CompressionError => 0x9,
            Reason::ConnectError => 0xa,
            Reason::EnhanceYourCalm => 0xb,
            Reason::InadequateSecurity => 0xc,
            Reason::Http11Required => 0xd,
            Reason::Unknown(v) => v,
        }
    }
}

pub fn parse_window_update_payload(payload: &Bytes) -> Result<u32, ProtocolError> {
    if payload.len() != 4 {
        return Err(ProtocolError::new(Reason::FrameSizeError, "WINDOW_UPDATE payload must be 4 bytes"));
    }
    Ok(u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff)
}

pub fn parse_rst_stream_payload(payload: &Bytes) -> Result<Reason, ProtocolError> {
    if payload.len() != 4 {
        return Err(ProtocolError::new(Reason::FrameSizeError, "RST_STREAM payload must be 4 bytes"));
    }
    Ok(Reason::from_u32(u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])))
}

pub fn parse_settings_payload(payload: &Bytes) -> Result<Vec<(u16, u32)>, ProtocolError> {
    if payload.len() % 6 != 0 {
        return Err(ProtocolError::new(Reason::FrameSizeError, "SETTINGS payload must be a multiple of 6 bytes"));
    }
    let mut out = Vec::with_capacity(payload.len() / 6);
    let mut chunks = payload.chunks_exact(6);
    for chunk in &mut chunks {
        let id = u16::from_be_bytes([chunk[0], chunk[1]]);
        let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
        out.push((id, value));
    }
    Ok(out)
}

pub fn parse_goaway_payload(payload: &Bytes) -> Result<(u32, Reason), ProtocolError> {
    if payload.len() < 8 {
        return Err(ProtocolError::new(Reason::FrameSizeError, "GOAWAY payload too short"));
    }
    let last_stream_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
    let error_code = Reason::from_u32(u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]));
    Ok((last_stream_id, error_code))
}
