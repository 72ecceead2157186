//! In-process lock backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::DistributedLocker;
use crate::error::Result;

/// In-process set-if-absent table with TTL expiry.
///
/// Provides the [`DistributedLocker`] semantics within a single process:
/// useful for single-node deployments and as the test-suite backend.
/// Expired entries are reclaimed lazily on the next acquire of the same
/// key and swept opportunistically once the table grows.
#[derive(Debug, Default)]
pub struct MemoryLocker {
    entries: Mutex<HashMap<String, Instant>>,
}

/// Sweep threshold; below this the table is too small to bother.
const SWEEP_LEN: usize = 1024;

impl MemoryLocker {
    /// Create an empty locker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys.
    pub fn live_keys(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|deadline| **deadline > now)
            .count()
    }
}

impl DistributedLocker for MemoryLocker {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        if entries.len() >= SWEEP_LEN {
            entries.retain(|_, deadline| *deadline > now);
        }

        match entries.get(key) {
            Some(deadline) if *deadline > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}
