//! An HTTP/2 connection engine and an HTTP proxy dispatcher built on it.
//!
//! [`connection::SendRequest`] drives one HTTP/2 connection: it performs the
//! handshake lazily on first use, multiplexes requests over stream ids, and
//! applies flow control, all pull-based — nothing reads the socket until a
//! caller is actually waiting on an event or send credit. [`proxy::Proxy`]
//! sits on top and picks forward vs. CONNECT-tunnel dispatch per request.

pub mod bytestream;
pub mod config;
pub mod connection;
pub mod error;
pub mod h2proto;
pub mod http1;
pub mod origin;
pub mod pool;
pub mod proxy;
pub mod semaphore;
pub mod state;
mod stream;
pub mod timeout;
pub mod transport;

pub use bytestream::ByteStream;
pub use config::{LocalSettings, ProxyConfig, ProxyMode, Timeouts};
pub use connection::SendRequest;
pub use error::{Error, ProtocolError, ProxyError, Result};
pub use origin::{Origin, Scheme, Url};
pub use proxy::Proxy;
pub use stream::ResponseBody;

/// A received HTTP/2 response: status, a looked-up reason phrase (HTTP/2
/// carries no reason phrase on the wire, only `:status`), headers, and a
/// lazily-drained body.
pub struct H2Response<T> {
    pub version: &'static str,
    pub status: u16,
    pub reason: bytes::Bytes,
    pub headers: Vec<(http::HeaderName, http::HeaderValue)>,
    pub body: ResponseBody<T>,
}
