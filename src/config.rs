use std::time::Duration;

use crate::origin::Origin;

/// Mapping with recognized keys `{connect, read, write, pool}`; a missing
/// key means unbounded, matching the source's `Dict[str, Optional[float]]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
    pub write: Option<Duration>,
    pub pool: Option<Duration>,
}

impl Timeouts {
    pub fn none() -> Self {
        Timeouts::default()
    }
}

/// Dispatch rule for the proxy: forward iff `FORWARD_ONLY`, or `DEFAULT`
/// and the request scheme is `http`; tunnel otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyMode {
    #[default]
    Default,
    ForwardOnly,
    TunnelOnly,
}

/// Local settings applied once, at handshake time, before any SETTINGS
/// update frame would otherwise be emitted for defaults.
#[derive(Debug, Clone, Copy)]
pub struct LocalSettings {
    pub enable_push: u32,
    pub max_concurrent_streams: u32,
    pub max_header_list_size: u32,
}

impl Default for LocalSettings {
    fn default() -> Self {
        LocalSettings {
            enable_push: 0,
            max_concurrent_streams: 100,
            max_header_list_size: 65536,
        }
    }
}

/// Options recognized by the proxy dispatcher at construction.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub proxy_origin: Origin,
    pub proxy_headers: Vec<(http::HeaderName, http::HeaderValue)>,
    pub proxy_mode: ProxyMode,
}

impl ProxyConfig {
    pub fn new(proxy_origin: Origin) -> Self {
        ProxyConfig {
            proxy_origin,
            proxy_headers: Vec::new(),
            proxy_mode: ProxyMode::Default,
        }
    }

    pub fn with_mode(mut self, mode: ProxyMode) -> Self {
        self.proxy_mode = mode;
        self
    }

    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.proxy_headers.push((name, value));
        self
    }
}

/// Socket-read chunk size for `Connection::receive_events`.
pub const READ_NUM_BYTES: usize = 4096;

/// Inbound window increment advertised per-connection and per-stream.
pub const WINDOW_INCREMENT: u32 = 1 << 24;
