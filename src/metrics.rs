//! Process-wide counters.
//!
//! Every request task updates the same counters, so they are plain atomics:
//! no locks, no per-request state. Updates are fire-and-forget.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// What the pipeline needs from a metrics backend.
pub trait Collector: Send + Sync + 'static {
    /// Returns the new total.
    fn increment_requests(&self) -> u64;
    fn increment_errors(&self) -> u64;
    fn increment_panics(&self) -> u64;
    /// Records the current number of live runtime tasks.
    fn sample_tasks(&self);
}

/// Atomic in-memory [`Collector`].
#[derive(Debug, Default)]
pub struct Counters {
    requests: AtomicU64,
    errors: AtomicU64,
    panics: AtomicU64,
    tasks: AtomicU64,
}

/// Point-in-time copy of the counters, for the debug endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Snapshot {
    pub requests: u64,
    pub errors: u64,
    pub panics: u64,
    pub tasks: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u64 { self.requests.load(Ordering::Relaxed) }
    pub fn errors(&self) -> u64 { self.errors.load(Ordering::Relaxed) }
    pub fn panics(&self) -> u64 { self.panics.load(Ordering::Relaxed) }
    pub fn tasks(&self) -> u64 { self.tasks.load(Ordering::Relaxed) }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            requests: self.requests(),
            errors: self.errors(),
            panics: self.panics(),
            tasks: self.tasks(),
        }
    }
}

impl Collector for Counters {
    fn increment_requests(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn increment_errors(&self) -> u64 {
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn increment_panics(&self) -> u64 {
        self.panics.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn sample_tasks(&self) {
        // Outside a tokio runtime there is nothing to sample.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let alive = handle.metrics().num_alive_tasks();
            self.tasks.store(u64::try_from(alive).unwrap_or(u64::MAX), Ordering::Relaxed);
        }
    }
}
