//! Operational counters.
//!
//! The only user-visible surfaces of the core are log output and these
//! counters: drops per reason, lock outcomes, decode failures. Shared by
//! the receiver and the handler; snapshot-readable by the host process.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counter set.
#[derive(Debug, Default)]
pub struct Metrics {
    ingress_dropped: AtomicU64,
    egress_dropped: AtomicU64,
    lock_acquired: AtomicU64,
    lock_busy: AtomicU64,
    lock_errors: AtomicU64,
    decode_failures: AtomicU64,
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Datagrams discarded because the ingress queue was full.
    pub ingress_dropped: u64,
    /// Trap messages discarded because the egress queue stayed full.
    pub egress_dropped: u64,
    /// Successful dedup lock acquisitions.
    pub lock_acquired: u64,
    /// Lock attempts that found the key already held (duplicates).
    pub lock_busy: u64,
    /// Lock backend transport failures (including RPC deadline).
    pub lock_errors: u64,
    /// Datagrams the engines failed to decode or rejected.
    pub decode_failures: u64,
}

impl Metrics {
    /// Create a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ingress_dropped(&self) {
        self.ingress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lock_acquired(&self) {
        self.lock_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lock_busy(&self) {
        self.lock_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lock_error(&self) {
        self.lock_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingress_dropped: self.ingress_dropped.load(Ordering::Relaxed),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
            lock_acquired: self.lock_acquired.load(Ordering::Relaxed),
            lock_busy: self.lock_busy.load(Ordering::Relaxed),
            lock_errors: self.lock_errors.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}
