use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> Cached<T> {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Read-through cache holding one value for a fixed time-to-live.
///
/// The lock is only held to read or replace the slot, never while fetching,
/// so two callers missing at the same time both fetch and the later one wins.
pub struct TtlCache<T> {
    name: &'static str,
    ttl: Duration,
    slot: Mutex<Option<Cached<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        TtlCache {
            name,
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, Option<Cached<T>>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The cached value, if one exists and has not expired.
    pub fn get(&self) -> Option<T> {
        match self.lock().as_ref() {
            Some(cached) if cached.is_fresh(self.ttl) => Some(cached.value.clone()),
            _ => None,
        }
    }

    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get() {
            log::debug!("{} cache hit", self.name);
            return Ok(value);
        }

        log::debug!("{} cache miss", self.name);
        let value = fetch().await?;
        *self.lock() = Some(Cached {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    pub fn invalidate(&self) {
        *self.lock() = None;
    }
}
