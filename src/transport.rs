use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, ProtocolError, Result};
use crate::h2proto::Reason;
use crate::origin::Origin;
use crate::timeout::with_timeout;

/// What the connection engine and proxy dispatcher need from a socket.
/// A blanket impl covers any plain `AsyncRead + AsyncWrite` type for the
/// non-upgrade paths; `start_tls` defaults to an error so only transports
/// that genuinely support an upgrade (the proxy's own TCP wrapper) need to
/// override it.
#[async_trait]
pub trait Transport: Send {
    async fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize>;
    async fn write(&mut self, buf: &[u8], timeout: Option<Duration>) -> Result<()>;
    async fn close(&mut self);
    fn is_connection_dropped(&self) -> bool {
        false
    }

    /// Upgrades this transport to TLS in place, consuming it. Only the
    /// concrete transport behind a CONNECT tunnel needs this; everything
    /// else inherits the default, which refuses.
    async fn start_tls(self: Box<Self>, hostname: &str, timeout: Option<Duration>) -> Result<Box<dyn Transport>> {
        let _ = (hostname, timeout);
        Err(Error::Protocol(ProtocolError::new(Reason::InternalError, "this transport does not support a TLS upgrade")))
    }
}

#[async_trait]
impl<S> Transport for S
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        with_timeout(timeout, AsyncReadExt::read(self, buf)).await
    }

    async fn write(&mut self, buf: &[u8], timeout: Option<Duration>) -> Result<()> {
        with_timeout(timeout, AsyncWriteExt::write_all(self, buf)).await
    }

    async fn close(&mut self) {
        let _ = AsyncWriteExt::shutdown(self).await;
    }
}

/// Upgrades a plaintext TCP connection to TLS, negotiating ALPN so the
/// caller can tell whether it got an HTTP/2 or HTTP/1.1 peer. This crate
/// never ships a default or certificate-skipping implementation: callers
/// must supply one that actually verifies the peer.
#[async_trait]
pub trait TlsConnector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static;

    async fn connect(&self, hostname: &str, transport: TcpStream) -> Result<(Self::Stream, NegotiatedProtocol)>;
}

/// Which protocol ALPN settled on. `h2` is preferred; `Http11` means the
/// peer doesn't speak HTTP/2 and the caller must fall back to an
/// `Http1Connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedProtocol {
    Http2,
    Http11,
}

/// Fixed ALPN offer, in advertised order: http/1.1 before h2, matching the
/// origin this engine is grounded on.
pub const ALPN_PROTOCOLS: &[&str] = &["http/1.1", "h2"];

/// Opens the raw TCP connection to an origin. A connection pool
/// implementation uses this when `ConnectionPool::get` finds nothing idle
/// for an origin and needs to dial a fresh socket before handing back a
/// new `Http1Connection`; the proxy dispatcher itself never dials — it
/// only ever asks the pool.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn connect(&self, origin: &Origin, timeout: Option<Duration>) -> Result<TcpStream>;
}
