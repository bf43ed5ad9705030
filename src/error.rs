use std::fmt;

use crate::h2proto::Reason;

/// Error taxonomy for the engine and the proxy dispatcher.
///
/// `NewConnectionRequired` is not meant to reach an end user: it signals the
/// connection pool that this connection's stream ids are exhausted and a
/// fresh connection must be used for the next request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The peer or the codec violated the protocol. Fatal to the connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A CONNECT tunnel request returned a non-2xx status.
    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// `streams_semaphore` acquisition exceeded the pool timeout budget.
    #[error("timed out waiting for a free stream slot in the pool")]
    PoolTimeout,

    /// The engine's stream ids are exhausted; the pool should retry on a new connection.
    #[error("connection has no more stream ids available")]
    NewConnectionRequired,

    /// The underlying transport failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A read or write exceeded its timeout budget.
    #[error("operation timed out")]
    Timeout,
}

/// Raised whenever an inbound event carries an error code, a zero-length
/// read arrives while data is expected, or pseudo-headers are malformed.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    pub reason: Reason,
    pub message: &'static str,
}

impl ProtocolError {
    pub fn new(reason: Reason, message: &'static str) -> Self {
        ProtocolError { reason, message }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.reason)
    }
}

impl std::error::Error for ProtocolError {}

/// A CONNECT tunnel came back with a status outside 200..=299.
#[derive(Debug, Clone)]
pub struct ProxyError {
    pub status: u16,
    pub reason: String,
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.reason)
    }
}

impl std::error::Error for ProxyError {}

pub type Result<T> = std::result::Result<T, Error>;
