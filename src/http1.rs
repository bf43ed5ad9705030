use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::bytestream::ByteStream;
use crate::config::Timeouts;
use crate::error::{Error, ProtocolError, Result};
use crate::h2proto::Reason;
use crate::origin::{Origin, Url};
use crate::transport::Transport;

/// What the proxy dispatcher needs from an HTTP/1.1 connection: issue a
/// request and get back a response. A minimal, line-based implementation
/// lives below (`PlainHttp1Connection`) — enough to drive a CONNECT
/// handshake and forwarded requests; a production caller would swap in a
/// collaborator with persistent connections, chunked transfer-encoding,
/// and pipelining.
#[async_trait]
pub trait Http1Connection: Send + Sync {
    fn origin(&self) -> &Origin;

    async fn request(
        &mut self,
        method: http::Method,
        url: &Url,
        headers: &[(http::HeaderName, http::HeaderValue)],
        body: ByteStream,
        timeouts: Timeouts,
    ) -> Result<Http1Response>;
}

pub struct Http1Response {
    pub version: Bytes,
    pub status: u16,
    pub reason: Bytes,
    pub headers: Vec<(http::HeaderName, http::HeaderValue)>,
    pub body: ByteStream,
}

/// A one-request-at-a-time HTTP/1.1 client over any [`Transport`]. Supports
/// `Content-Length` bodies only; chunked transfer-encoding on the response
/// side is treated as a protocol error since a proxy deployment in front of
/// a conformant origin rarely needs it for CONNECT/forward traffic.
pub struct PlainHttp1Connection<T> {
    origin: Origin,
    transport: T,
}

impl<T> PlainHttp1Connection<T>
where
    T: Transport,
{
    pub fn new(origin: Origin, transport: T) -> Self {
        PlainHttp1Connection { origin, transport }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[async_trait]
impl<T> Http1Connection for PlainHttp1Connection<T>
where
    T: Transport + Sync,
{
    fn origin(&self) -> &Origin {
        &self.origin
    }

    async fn request(
        &mut self,
        method: http::Method,
        url: &Url,
        headers: &[(http::HeaderName, http::HeaderValue)],
        mut body: ByteStream,
        timeouts: Timeouts,
    ) -> Result<Http1Response> {
        let mut request = BytesMut::new();
        request.extend_from_slice(method.as_str().as_bytes());
        request.extend_from_slice(b" ");
        request.extend_from_slice(&url.path);
        request.extend_from_slice(b" HTTP/1.1\r\n");
        request.extend_from_slice(b"host: ");
        request.extend_from_slice(&url.authority());
        request.extend_from_slice(b"\r\n");
        for (name, value) in headers {
            request.extend_from_slice(name.as_str().as_bytes());
            request.extend_from_slice(b": ");
            request.extend_from_slice(value.as_bytes());
            request.extend_from_slice(b"\r\n");
        }
        request.extend_from_slice(b"\r\n");
        self.transport.write(&request, timeouts.write).await?;

        while let Some(chunk) = body.next_chunk() {
            self.transport.write(&chunk, timeouts.write).await?;
        }

        let mut reader = LineReader::new();
        let status_line = reader.read_line(&mut self.transport, timeouts.read).await?;
        let (version, status, reason) = parse_status_line(&status_line)?;

        let mut response_headers = Vec::new();
        let mut content_length = 0usize;
        loop {
            let line = reader.read_line(&mut self.transport, timeouts.read).await?;
            if line.is_empty() {
                break;
            }
            let (name, value) = parse_header_line(&line)?;
            let name_str = std::str::from_utf8(&name)
                .map_err(|_| Error::Protocol(ProtocolError::new(Reason::ProtocolError, "invalid response header name")))?;
            if name_str.eq_ignore_ascii_case("content-length") {
                content_length = std::str::from_utf8(&value)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| Error::Protocol(ProtocolError::new(Reason::ProtocolError, "invalid content-length header")))?;
            }
            let header_name = http::HeaderName::from_bytes(&name)
                .map_err(|_| Error::Protocol(ProtocolError::new(Reason::ProtocolError, "invalid response header name")))?;
            let header_value = http::HeaderValue::from_bytes(&value)
                .map_err(|_| Error::Protocol(ProtocolError::new(Reason::ProtocolError, "invalid response header value")))?;
            response_headers.push((header_name, header_value));
        }

        let mut remaining = content_length;
        let mut body_buf = reader.take_buffered();
        while body_buf.len() < content_length {
            let mut chunk = [0u8; 4096];
            let n = self.transport.read(&mut chunk, timeouts.read).await?;
            if n == 0 {
                break;
            }
            body_buf.extend_from_slice(&chunk[..n]);
        }
        remaining = remaining.min(body_buf.len());
        let body = ByteStream::from_bytes(body_buf.split_to(remaining).freeze());

        Ok(Http1Response { version, status, reason, headers: response_headers, body })
    }
}

fn parse_status_line(line: &[u8]) -> Result<(Bytes, u16, Bytes)> {
    let text = std::str::from_utf8(line).map_err(|_| Error::Protocol(ProtocolError::new(Reason::ProtocolError, "malformed status line")))?;
    let mut parts = text.splitn(3, ' ');
    let version = parts.next().ok_or_else(|| Error::Protocol(ProtocolError::new(Reason::ProtocolError, "malformed status line")))?;
    let status = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Protocol(ProtocolError::new(Reason::ProtocolError, "malformed status line")))?;
    let reason = parts.next().unwrap_or("").trim_end();
    Ok((Bytes::copy_from_slice(version.as_bytes()), status, Bytes::copy_from_slice(reason.as_bytes())))
}

fn parse_header_line(line: &[u8]) -> Result<(Bytes, Bytes)> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| Error::Protocol(ProtocolError::new(Reason::ProtocolError, "malformed header line")))?;
    let name = Bytes::copy_from_slice(&line[..colon]);
    let mut start = colon + 1;
    while start < line.len() && line[start] == b' ' {
        start += 1;
    }
    let value = Bytes::copy_from_slice(&line[start..]);
    Ok((name, value))
}

/// Reads CRLF-terminated lines off a `Transport`, buffering whatever comes
/// in after the line boundary so a trailing body prefix isn't lost.
struct LineReader {
    buf: BytesMut,
}

impl LineReader {
    fn new() -> Self {
        LineReader { buf: BytesMut::new() }
    }

    async fn read_line<T: Transport>(&mut self, transport: &mut T, timeout: Option<std::time::Duration>) -> Result<Bytes> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf.split_to(pos).freeze();
                self.buf.advance_past_crlf();
                return Ok(line);
            }
            let mut chunk = [0u8; 512];
            let n = transport.read(&mut chunk, timeout).await?;
            if n == 0 {
                return Err(Error::Protocol(ProtocolError::new(Reason::ProtocolError, "connection closed mid-response")));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_buffered(self) -> BytesMut {
        self.buf
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

trait AdvancePastCrlf {
    fn advance_past_crlf(&mut self);
}

impl AdvancePastCrlf for BytesMut {
    fn advance_past_crlf(&mut self) {
        if self.len() >= 2 {
            let _ = self.split_to(2);
        }
    }
}
