use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use fnv::FnvHashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace, warn};

use crate::config::{LocalSettings, Timeouts, READ_NUM_BYTES, WINDOW_INCREMENT};
use crate::error::{Error, ProtocolError, Result};
use crate::h2proto::{Codec, Event, Reason, StreamId};
use crate::origin::Origin;
use crate::semaphore::Semaphore;
use crate::state::ConnectionState;
use crate::stream::Http2Stream;
use crate::timeout::with_timeout;

/// Cloneable handle callers use to issue requests on an HTTP/2 connection.
/// Cheap to clone (an `Arc` bump); many streams share one connection.
pub struct SendRequest<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SendRequest<T> {
    fn clone(&self) -> Self {
        SendRequest { inner: self.inner.clone() }
    }
}

pub(crate) struct Inner<T> {
    origin: Origin,
    local_settings: LocalSettings,
    codec: StdMutex<Codec>,
    read_half: AsyncMutex<ReadHalf<T>>,
    write_half: AsyncMutex<WriteHalf<T>>,
    registry: StdMutex<FnvHashMap<StreamId, VecDeque<Event>>>,
    state: StdMutex<ConnectionState>,
    init_lock: AsyncMutex<()>,
    streams_semaphore: Semaphore,
    dropped: AtomicBool,
}

impl<T> SendRequest<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an already-connected transport. No I/O happens here: the
    /// handshake runs lazily, under `init_lock`, on the first `request()`.
    pub fn new(origin: Origin, transport: T) -> Self {
        Self::with_settings(origin, transport, LocalSettings::default())
    }

    pub fn with_settings(origin: Origin, transport: T, local_settings: LocalSettings) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let inner = Inner {
            origin,
            local_settings,
            codec: StdMutex::new(Codec::new()),
            read_half: AsyncMutex::new(read_half),
            write_half: AsyncMutex::new(write_half),
            registry: StdMutex::new(FnvHashMap::default()),
            state: StdMutex::new(ConnectionState::Pending),
            init_lock: AsyncMutex::new(()),
            streams_semaphore: Semaphore::new(local_settings.max_concurrent_streams as usize),
            dropped: AtomicBool::new(false),
        };
        SendRequest { inner: Arc::new(inner) }
    }

    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.state.lock().unwrap() == ConnectionState::Closed
    }

    pub fn is_connection_dropped(&self) -> bool {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Pool signalling hook: marks an idle connection ready for reuse.
    pub fn mark_as_ready(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if *state == ConnectionState::Idle {
            *state = ConnectionState::Ready;
        }
    }

    /// Closes the socket and transitions to CLOSED. Idempotent.
    pub async fn close(&self) {
        let already_closed = {
            let mut state = self.inner.state.lock().unwrap();
            let was_closed = *state == ConnectionState::Closed;
            *state = ConnectionState::Closed;
            was_closed
        };
        if already_closed {
            return;
        }
        Inner::close_transport(&self.inner).await;
        debug!(origin = %self.inner.origin, "http/2 connection closed");
    }

    /// Allocates a stream, sends the request, and returns once response
    /// headers have arrived. Performs the handshake on the first call.
    pub async fn request(
        &self,
        method: http::Method,
        url: crate::origin::Url,
        headers: Vec<(http::HeaderName, http::HeaderValue)>,
        body: crate::bytestream::ByteStream,
        timeouts: Timeouts,
    ) -> Result<crate::H2Response<T>> {
        if url.origin() != self.inner.origin {
            return Err(Error::Protocol(ProtocolError::new(
                Reason::ProtocolError,
                "request url origin does not match this connection's origin",
            )));
        }

        self.ensure_handshake(timeouts).await?;

        let permit = self.inner.streams_semaphore.acquire(timeouts.pool).await?;
        let stream_id = {
            let mut codec = self.inner.codec.lock().unwrap();
            match codec.get_next_stream_id() {
                Some(id) => id,
                None => {
                    drop(codec);
                    self.transition_full();
                    return Err(Error::NewConnectionRequired);
                }
            }
        };
        // Released once the id is allocated, not when the stream ends: the
        // semaphore bounds creation bursts, not concurrently-open streams.
        drop(permit);

        {
            let mut registry = self.inner.registry.lock().unwrap();
            registry.insert(stream_id, VecDeque::new());
        }
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state != ConnectionState::Full {
                *state = ConnectionState::Active;
            }
        }
        trace!(%stream_id, "admitted new http/2 stream");

        let stream = Http2Stream::new(stream_id, self.inner.clone());
        stream.request(method, url, headers, body, timeouts).await
    }

    async fn ensure_handshake(&self, timeouts: Timeouts) -> Result<()> {
        let _guard = self.inner.init_lock.lock().await;
        if *self.inner.state.lock().unwrap() != ConnectionState::Pending {
            return Ok(());
        }
        debug!(origin = %self.inner.origin, "sending http/2 connection preface");
        {
            let mut codec = self.inner.codec.lock().unwrap();
            codec.initiate(self.inner.local_settings);
            codec.increment_window(WINDOW_INCREMENT, None);
        }
        Inner::flush(&self.inner, timeouts).await?;
        *self.inner.state.lock().unwrap() = ConnectionState::Active;
        Ok(())
    }

    pub(crate) fn transition_full(&self) {
        *self.inner.state.lock().unwrap() = ConnectionState::Full;
        warn!(origin = %self.inner.origin, "http/2 stream ids exhausted, connection marked full");
    }
}

impl<T> Inner<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    async fn flush(this: &Arc<Self>, timeouts: Timeouts) -> Result<()> {
        let bytes = this.codec.lock().unwrap().data_to_send();
        if bytes.is_empty() {
            return Ok(());
        }
        let mut write_half = this.write_half.lock().await;
        with_timeout(timeouts.write, write_half.write_all(&bytes)).await?;
        Ok(())
    }

    pub(crate) async fn send_headers(
        this: &Arc<Self>,
        stream_id: StreamId,
        headers: &[(bytes::Bytes, bytes::Bytes)],
        end_stream: bool,
        timeouts: Timeouts,
    ) -> Result<()> {
        {
            let mut codec = this.codec.lock().unwrap();
            codec.send_headers(stream_id, headers, end_stream);
            codec.increment_window(WINDOW_INCREMENT, Some(stream_id));
        }
        Self::flush(this, timeouts).await
    }

    pub(crate) async fn send_data(this: &Arc<Self>, stream_id: StreamId, chunk: &[u8], timeouts: Timeouts) -> Result<()> {
        {
            let mut codec = this.codec.lock().unwrap();
            codec.send_data(stream_id, chunk)?;
        }
        Self::flush(this, timeouts).await
    }

    pub(crate) async fn end_stream(this: &Arc<Self>, stream_id: StreamId, timeouts: Timeouts) -> Result<()> {
        {
            this.codec.lock().unwrap().end_stream(stream_id);
        }
        Self::flush(this, timeouts).await
    }

    pub(crate) async fn acknowledge_received_data(
        this: &Arc<Self>,
        stream_id: StreamId,
        amount: u32,
        timeouts: Timeouts,
    ) -> Result<()> {
        {
            this.codec.lock().unwrap().acknowledge_received_data(stream_id, amount);
        }
        Self::flush(this, timeouts).await
    }

    /// `min(local_flow_window(stream_id), max_outbound_frame_size)`. Drives
    /// `receive_events` until the value is positive.
    pub(crate) async fn wait_for_outgoing_flow(this: &Arc<Self>, stream_id: StreamId, timeouts: Timeouts) -> Result<u32> {
        loop {
            let flow = {
                let codec = this.codec.lock().unwrap();
                codec.local_flow_window(stream_id).min(codec.max_outbound_frame_size())
            };
            if flow > 0 {
                return Ok(flow);
            }
            Self::receive_events(this, timeouts).await?;
        }
    }

    /// Pops the next event for `stream_id`, driving `receive_events` until
    /// one is available. A stream id of 0 never reaches a FIFO: callers
    /// only ever wait for their own stream's events.
    pub(crate) async fn wait_for_event(this: &Arc<Self>, stream_id: StreamId, timeouts: Timeouts) -> Result<Event> {
        loop {
            if let Some(event) = this.pop_event(stream_id) {
                return Ok(event);
            }
            Self::receive_events(this, timeouts).await?;
        }
    }

    fn pop_event(&self, stream_id: StreamId) -> Option<Event> {
        self.registry.lock().unwrap().get_mut(&stream_id).and_then(VecDeque::pop_front)
    }

    /// Removes `stream_id` from the registry. When that empties the
    /// registry, an ACTIVE connection becomes IDLE (eligible for reuse);
    /// a FULL one (stream ids exhausted) is torn down, since nothing can
    /// ever use it again.
    pub(crate) async fn close_stream(this: &Arc<Self>, stream_id: StreamId) {
        let now_empty = {
            let mut registry = this.registry.lock().unwrap();
            registry.remove(&stream_id);
            registry.is_empty()
        };
        if !now_empty {
            return;
        }
        let should_close_transport = {
            let mut state = this.state.lock().unwrap();
            match *state {
                ConnectionState::Full => {
                    *state = ConnectionState::Closed;
                    true
                }
                ConnectionState::Active => {
                    *state = ConnectionState::Idle;
                    false
                }
                _ => false,
            }
        };
        if should_close_transport {
            Self::close_transport(this).await;
        }
    }

    async fn close_transport(this: &Arc<Self>) {
        let mut write_half = this.write_half.lock().await;
        let _ = write_half.shutdown().await;
    }

    /// Reads up to `READ_NUM_BYTES`, feeds the codec, flushes whatever the
    /// codec queued in response (ACKs, SETTINGS ack, PING ack), and routes
    /// produced events to their owning stream's FIFO in arrival order. At
    /// most one task runs this at a time: contenders serialize on
    /// `read_half`'s lock.
    async fn receive_events(this: &Arc<Self>, timeouts: Timeouts) -> Result<()> {
        let events = {
            let mut read_half = this.read_half.lock().await;
            let mut buf = [0u8; READ_NUM_BYTES];
            let n = with_timeout(timeouts.read, read_half.read(&mut buf)).await?;
            if n == 0 {
                this.dropped.store(true, Ordering::Relaxed);
                *this.state.lock().unwrap() = ConnectionState::Closed;
                return Err(Error::Protocol(ProtocolError::new(
                    Reason::ConnectError,
                    "peer closed the connection (zero-length read)",
                )));
            }
            let events = this.codec.lock().unwrap().feed(&buf[..n])?;
            trace!(bytes = n, events = events.len(), "fed bytes into the http/2 codec");
            events
        };

        Self::flush(this, timeouts).await?;

        let mut registry = this.registry.lock().unwrap();
        for event in events {
            if let Some(error_code) = event.error_code() {
                drop(registry);
                *this.state.lock().unwrap() = ConnectionState::Closed;
                warn!(?error_code, "connection terminated by an inbound error event");
                return Err(Error::Protocol(ProtocolError::new(
                    error_code,
                    "peer reported a stream or connection error",
                )));
            }
            let raw_stream_id = event.stream_id();
            if raw_stream_id != StreamId::CONNECTION {
                if let Some(fifo) = registry.get_mut(&StreamId::new(raw_stream_id)) {
                    fifo.push_back(event);
                }
                // No matching stream (already closed locally): drop silently.
            }
            // Connection-scoped events with no stream id (e.g. `Ping`) are
            // acted on inline by the codec and carry no further state here.
        }

        Ok(())
    }
}
