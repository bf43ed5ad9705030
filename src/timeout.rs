use std::future::Future;
use std::time::Duration;

use crate::error::Error;

/// Runs `fut` to completion, or returns [`Error::Timeout`] if `budget`
/// elapses first. `None` means unbounded, matching [`crate::config::Timeouts`].
pub async fn with_timeout<F, T>(budget: Option<Duration>, fut: F) -> Result<T, Error>
where
    F: Future<Output = std::io::Result<T>>,
{
    match budget {
        Some(d) => match tokio::time::timeout(d, fut).await {
            Ok(res) => res.map_err(Error::Io),
            Err(_) => Err(Error::Timeout),
        },
        None => fut.await.map_err(Error::Io),
    }
}
