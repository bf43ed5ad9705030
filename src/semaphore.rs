use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore as TokioSemaphore};

use crate::error::Error;

/// Bounded counter used to admit new streams. Acquisition may fail with
/// [`Error::PoolTimeout`] when a pool timeout budget is configured and
/// exceeded, rather than blocking forever.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<TokioSemaphore>,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Semaphore { inner: Arc::new(TokioSemaphore::new(permits)) }
    }

    pub async fn acquire(&self, pool_timeout: Option<Duration>) -> Result<OwnedSemaphorePermit, Error> {
        let acquire = self.inner.clone().acquire_owned();
        let result = match pool_timeout {
            Some(d) => tokio::time::timeout(d, acquire).await.map_err(|_| Error::PoolTimeout)?,
            None => acquire.await,
        };
        result.map_err(|_: AcquireError| Error::PoolTimeout)
    }
}
