//! A hand-rolled HTTP/2 peer used only by the integration tests below. It
//! speaks just enough of the wire format to drive the client engine
//! through a handshake and a request/response exchange; it is not a
//! general-purpose server.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const FRAME_DATA: u8 = 0x0;
pub const FRAME_HEADERS: u8 = 0x1;
pub const FRAME_RST_STREAM: u8 = 0x3;
pub const FRAME_SETTINGS: u8 = 0x4;
pub const FRAME_WINDOW_UPDATE: u8 = 0x8;

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;

pub struct Frame {
    pub kind: u8,
    pub flags: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

pub async fn read_preface(server: &mut DuplexStream) {
    let mut buf = [0u8; 24];
    server.read_exact(&mut buf).await.expect("client preface");
    assert_eq!(&buf[..], PREFACE, "client did not send the expected connection preface");
}

pub async fn read_frame(server: &mut DuplexStream) -> Frame {
    let mut header = [0u8; 9];
    server.read_exact(&mut header).await.expect("frame header");
    let len = ((header[0] as usize) << 16) | ((header[1] as usize) << 8) | header[2] as usize;
    let kind = header[3];
    let flags = header[4];
    let stream_id = u32::from_be_bytes([header[5] & 0x7f, header[6], header[7], header[8]]);
    let mut payload = vec![0u8; len];
    if len > 0 {
        server.read_exact(&mut payload).await.expect("frame payload");
    }
    Frame { kind, flags, stream_id, payload: Bytes::from(payload) }
}

fn write_frame_header(out: &mut BytesMut, kind: u8, flags: u8, stream_id: u32, len: usize) {
    out.put_u8((len >> 16) as u8);
    out.put_u8((len >> 8) as u8);
    out.put_u8(len as u8);
    out.put_u8(kind);
    out.put_u8(flags);
    out.put_u32(stream_id);
}

/// Literal-never-indexed field, matching what `h2tunnel`'s own HPACK
/// subset decodes. Lengths must stay under 127 bytes (no continuation).
fn encode_field(out: &mut BytesMut, name: &[u8], value: &[u8]) {
    out.put_u8(0x10);
    out.put_u8(name.len() as u8);
    out.put_slice(name);
    out.put_u8(value.len() as u8);
    out.put_slice(value);
}

pub async fn write_settings(server: &mut DuplexStream, settings: &[(u16, u32)]) {
    let mut payload = BytesMut::new();
    for (id, value) in settings {
        payload.put_u16(*id);
        payload.put_u32(*value);
    }
    let mut frame = BytesMut::new();
    write_frame_header(&mut frame, FRAME_SETTINGS, 0x0, 0, payload.len());
    frame.extend_from_slice(&payload);
    server.write_all(&frame).await.unwrap();
}

pub async fn write_response_headers(server: &mut DuplexStream, stream_id: u32, status: u16, end_stream: bool, extra: &[(&[u8], &[u8])]) {
    let mut block = BytesMut::new();
    encode_field(&mut block, b":status", status.to_string().as_bytes());
    for (name, value) in extra {
        encode_field(&mut block, name, value);
    }
    let mut frame = BytesMut::new();
    let flags = FLAG_END_HEADERS | if end_stream { FLAG_END_STREAM } else { 0 };
    write_frame_header(&mut frame, FRAME_HEADERS, flags, stream_id, block.len());
    frame.extend_from_slice(&block);
    server.write_all(&frame).await.unwrap();
}

pub async fn write_data(server: &mut DuplexStream, stream_id: u32, data: &[u8], end_stream: bool) {
    let mut frame = BytesMut::new();
    write_frame_header(&mut frame, FRAME_DATA, if end_stream { FLAG_END_STREAM } else { 0 }, stream_id, data.len());
    frame.extend_from_slice(data);
    server.write_all(&frame).await.unwrap();
}

pub async fn write_rst_stream(server: &mut DuplexStream, stream_id: u32, error_code: u32) {
    let mut payload = BytesMut::new();
    payload.put_u32(error_code);
    let mut frame = BytesMut::new();
    write_frame_header(&mut frame, FRAME_RST_STREAM, 0, stream_id, payload.len());
    frame.extend_from_slice(&payload);
    server.write_all(&frame).await.unwrap();
}

pub async fn write_window_update(server: &mut DuplexStream, stream_id: u32, increment: u32) {
    let mut payload = BytesMut::new();
    payload.put_u32(increment);
    let mut frame = BytesMut::new();
    write_frame_header(&mut frame, FRAME_WINDOW_UPDATE, 0, stream_id, payload.len());
    frame.extend_from_slice(&payload);
    server.write_all(&frame).await.unwrap();
}

/// Reads and discards the three handshake frames every client connection
/// opens with: the preface, its initial SETTINGS, and its connection-level
/// WINDOW_UPDATE.
pub async fn consume_handshake(server: &mut DuplexStream) {
    read_preface(server).await;
    let settings = read_frame(server).await;
    assert_eq!(settings.kind, FRAME_SETTINGS);
    let window_update = read_frame(server).await;
    assert_eq!(window_update.kind, FRAME_WINDOW_UPDATE);
}

/// A hand-rolled HTTP/1.1 server side, used by the proxy-dispatch tests to
/// play the role of the fake proxy (and, after a CONNECT upgrade, the
/// tunneled target on that same socket). Mirrors the subset `http1.rs`'s
/// `PlainHttp1Connection` itself writes: request-line, headers terminated
/// by a blank line, then a `Content-Length` body if one is declared.
pub mod http1 {
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    pub struct Request {
        pub method: String,
        pub target: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    pub async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Request {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await.expect("header byte");
            buf.push(byte[0]);
            if buf.ends_with(b"\r\n\r\n") {
                break;
            }
        }
        let text = String::from_utf8(buf).expect("request headers are ascii");
        let mut lines = text.split("\r\n");
        let request_line = lines.next().expect("request line");
        let mut parts = request_line.split(' ');
        let method = parts.next().expect("method").to_string();
        let target = parts.next().expect("target").to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').expect("header line has a colon");
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            stream.read_exact(&mut body).await.expect("request body");
        }

        Request { method, target, headers, body }
    }

    pub async fn write_response<S: AsyncWrite + Unpin>(stream: &mut S, status: u16, reason: &str, headers: &[(&str, &str)], body: &[u8]) {
        let mut out = format!("HTTP/1.1 {status} {reason}\r\n");
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-length")) {
            out.push_str(&format!("content-length: {}\r\n", body.len()));
        }
        out.push_str("\r\n");
        stream.write_all(out.as_bytes()).await.expect("write response head");
        if !body.is_empty() {
            stream.write_all(body).await.expect("write response body");
        }
    }
}

pub fn decode_field_names(payload: &Bytes) -> Vec<(Bytes, Bytes)> {
    let mut buf = payload.clone();
    let mut fields = Vec::new();
    while buf.has_remaining() {
        buf.advance(1); // representation marker
        let name_len = buf[0] as usize;
        buf.advance(1);
        let name = buf.copy_to_bytes(name_len);
        let value_len = buf[0] as usize;
        buf.advance(1);
        let value = buf.copy_to_bytes(value_len);
        fields.push((name, value));
    }
    fields
}
