use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const MAX_READERS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub peak: usize,
    pub issued: usize,
    pub returned: usize,
}

pub fn default_reader_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_READERS)
}

/// Parses a reader count override, falling back to `default_value` when the
/// input is missing or garbage. The result is clamped to `1..=256`.
pub fn parse_reader_count(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_READERS)
}

#[derive(Debug, Default)]
struct PoolCounters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    issued: AtomicUsize,
    returned: AtomicUsize,
}

/// Fixed-capacity admission control for file workers.
///
/// Exactly `limit` tokens exist. A worker holds one token for its whole
/// lifetime; dropping the token returns it. `wait_all` is the completion
/// barrier: it resolves once every outstanding token has come back.
#[derive(Debug, Clone)]
pub struct AdmissionPool {
    limit: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
}

impl AdmissionPool {
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_READERS);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            counters: Arc::new(PoolCounters::default()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Waits for a free slot and marks it occupied.
    pub async fn acquire(&self) -> PoolToken {
        // The semaphore is never closed; acquire failures are not expected.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("admission pool semaphore closed"));
        self.counters.issued.fetch_add(1, Ordering::Relaxed);
        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters.peak.fetch_max(in_flight, Ordering::Relaxed);
        PoolToken {
            permit,
            counters: self.counters.clone(),
        }
    }

    /// Resolves once every issued token has been returned.
    ///
    /// Equivalent to `limit` back-to-back acquires with no matching release;
    /// the slots are handed back before returning so the pool stays usable.
    pub async fn wait_all(&self) {
        let all = u32::try_from(self.limit).unwrap_or(u32::MAX);
        let permits = self
            .semaphore
            .acquire_many(all)
            .await
            .unwrap_or_else(|_| unreachable!("admission pool semaphore closed"));
        log::debug!("All {} reader slots returned", self.limit);
        drop(permits);
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            limit: self.limit,
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            peak: self.counters.peak.load(Ordering::Relaxed),
            issued: self.counters.issued.load(Ordering::Relaxed),
            returned: self.counters.returned.load(Ordering::Relaxed),
        }
    }
}

/// One occupied pool slot. Returned to the pool on drop.
#[derive(Debug)]
pub struct PoolToken {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    counters: Arc<PoolCounters>,
}

impl PoolToken {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PoolToken {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.counters.returned.fetch_add(1, Ordering::Relaxed);
    }
}
