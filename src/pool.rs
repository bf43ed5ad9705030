use async_trait::async_trait;

use crate::error::Result;
use crate::http1::Http1Connection;
use crate::origin::Origin;

/// The hooks the proxy dispatcher needs from a connection pool: check one
/// out by origin (creating one if none is idle), learn how many are open
/// for a given origin, check one back in once its response has drained,
/// and discard one that can never serve another request (a rejected
/// CONNECT tunnel). LRU eviction, idle-timeout sweeping, and other pool
/// policy are this trait's caller's business, not the dispatcher's.
///
/// Connections are checked out, not shared: `C::request` takes `&mut
/// self`, and the tunnel path needs to reclaim the underlying transport by
/// value for a TLS upgrade, so the pool hands out owned connections rather
/// than `Arc`-shared handles.
#[async_trait]
pub trait ConnectionPool<C>: Send + Sync
where
    C: Http1Connection,
{
    async fn get(&self, origin: &Origin) -> Result<C>;
    async fn connections(&self, origin: &Origin) -> usize;
    async fn response_closed(&self, connection: C);
    async fn remove(&self, origin: &Origin);
}
