//! Rate-limited request queue
//!
//! Every catalog call goes through one FIFO queue. Calls start at least
//! `min_interval` apart regardless of their kind and never overlap. A
//! rate-limited response is retried once after a fixed back-off.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{trace, warn};

use crate::error::CatalogError;

pub struct RequestQueue {
    /// Start time of the previous request; the lock itself is the queue
    last_start: Mutex<Option<Instant>>,
    min_interval: Duration,
    backoff: Duration,
}

impl RequestQueue {
    pub fn new(min_interval: Duration, backoff: Duration) -> Self {
        Self {
            last_start: Mutex::new(None),
            min_interval,
            backoff,
        }
    }

    /// Wait for our turn, then run `op`
    ///
    /// `op` is called a second time only if the first attempt was rate
    /// limited.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        // tokio's Mutex grants the lock in request order
        let mut last_start = self.last_start.lock().await;

        match self.dispatch(&mut last_start, &mut op).await {
            Err(CatalogError::RateLimited) => {
                warn!("Catalog rate limit hit, retrying in {:?}", self.backoff);
                sleep(self.backoff).await;
                self.dispatch(&mut last_start, &mut op).await
            }
            other => other,
        }
    }

    async fn dispatch<T, F, Fut>(&self, last_start: &mut Option<Instant>, op: &mut F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                trace!("Spacing catalog request by {:?}", ready_at - Instant::now());
                sleep_until(ready_at).await;
            }
        }
        *last_start = Some(Instant::now());
        op().await
    }
}
