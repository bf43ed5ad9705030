use std::collections::VecDeque;

use bytes::Bytes;

/// A request or response body, consumed front-to-back one chunk at a time.
/// Bodies above this crate's boundary (buffered by the HTTP/1.1 or proxy
/// collaborator) are already fully materialized, so this is a plain queue
/// rather than an async source — nothing here performs I/O.
#[derive(Debug, Clone, Default)]
pub struct ByteStream {
    chunks: VecDeque<Bytes>,
}

impl ByteStream {
    pub fn empty() -> Self {
        ByteStream::default()
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let mut chunks = VecDeque::new();
        if !bytes.is_empty() {
            chunks.push_back(bytes);
        }
        ByteStream { chunks }
    }

    pub fn from_chunks(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        ByteStream { chunks: chunks.into_iter().filter(|c| !c.is_empty()).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn next_chunk(&mut self) -> Option<Bytes> {
        self.chunks.pop_front()
    }

    /// Collects all remaining chunks into one buffer. Used to drain a CONNECT
    /// response body before inspecting the tunnel status.
    pub fn collect(mut self) -> Bytes {
        if self.chunks.len() == 1 {
            return self.chunks.pop_front().unwrap();
        }
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk() {
            out.extend_from_slice(&chunk);
        }
        Bytes::from(out)
    }
}

impl From<Bytes> for ByteStream {
    fn from(bytes: Bytes) -> Self {
        ByteStream::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for ByteStream {
    fn from(bytes: Vec<u8>) -> Self {
        ByteStream::from_bytes(Bytes::from(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_drain_front_to_back() {
        let mut body = ByteStream::from_chunks([Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert_eq!(body.next_chunk().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(body.next_chunk().unwrap(), Bytes::from_static(b"b"));
        assert!(body.next_chunk().is_none());
    }

    #[test]
    fn collect_concatenates_in_order() {
        let body = ByteStream::from_chunks([Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]);
        assert_eq!(body.collect(), Bytes::from_static(b"abcd"));
    }
}
