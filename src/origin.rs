use std::fmt;

use bytes::Bytes;

/// `http` or `https`. A third scheme is not representable, unlike the
/// bytes-typed scheme the originating implementation carried at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// The scheme's default port, used to decide whether `:authority` needs
    /// an explicit port suffix.
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a peer: (scheme, host, port).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub scheme: Scheme,
    pub host: Bytes,
    pub port: u16,
}

impl Origin {
    pub fn new(scheme: Scheme, host: impl Into<Bytes>, port: u16) -> Self {
        Origin { scheme, host: host.into(), port }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, String::from_utf8_lossy(&self.host), self.port)
    }
}

/// (scheme, host, port, path-with-query).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    pub scheme: Scheme,
    pub host: Bytes,
    pub port: u16,
    pub path: Bytes,
}

impl Url {
    pub fn new(scheme: Scheme, host: impl Into<Bytes>, port: u16, path: impl Into<Bytes>) -> Self {
        Url { scheme, host: host.into(), port, path: path.into() }
    }

    /// The (scheme, host, port) triple identifying the peer this URL targets.
    pub fn origin(&self) -> Origin {
        Origin { scheme: self.scheme, host: self.host.clone(), port: self.port }
    }

    /// `host` if `port` is the scheme default, else `host:port` — used for
    /// both the `:authority` pseudo-header and CONNECT targets.
    pub fn authority(&self) -> Bytes {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            Bytes::from(format!("{}:{}", String::from_utf8_lossy(&self.host), self.port))
        }
    }

    /// `scheme://host:port/path` absolute-form target, used by the forward
    /// proxy leg.
    pub fn as_absolute_bytes(&self) -> Bytes {
        let authority = self.authority();
        Bytes::from(format!(
            "{}://{}{}",
            self.scheme,
            String::from_utf8_lossy(&authority),
            String::from_utf8_lossy(&self.path),
        ))
    }
}
