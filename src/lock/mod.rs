//! Distributed-lock contract for fleet-wide trap deduplication.
//!
//! Any key/value store with an atomic set-if-absent-with-TTL can back this
//! trait; a Redis `SET NX EX` is the canonical production choice and lives
//! outside the core. The crate ships [`MemoryLocker`], an in-process table
//! with the same semantics, for single-node deployments and tests.

mod memory;

pub use memory::MemoryLocker;

use std::future::Future;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::util::hex;

/// Prefix for all dedup lock keys.
const TRAP_LOCK_PREFIX: &str = "trap_lock:";

/// Contract for the distributed lock backend.
///
/// `acquire` is the dedup primitive: it must atomically claim `key` for
/// `ttl` and report `false` when another process (or an earlier arrival)
/// already holds it. Implementations are shared across workers and must be
/// thread-safe.
pub trait DistributedLocker: Send + Sync + 'static {
    /// Atomically claim `key` for `ttl`.
    ///
    /// Returns `Ok(true)` on a successful claim, `Ok(false)` when the key
    /// is already held, `Err` on transport failure.
    fn acquire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<bool>> + Send;

    /// Best-effort delete of `key`.
    ///
    /// The happy path never calls this; TTL expiry is the release
    /// mechanism, and the residual window doubles as a negative cache
    /// against retry storms of the same payload.
    fn release(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Release the backend client.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    /// Build the dedup lock key for a raw trap datagram.
    fn fingerprint_key(&self, data: &[u8]) -> String {
        fingerprint_key(data)
    }
}

/// `trap_lock:` + lowercase hex of SHA-256 over the datagram bytes.
pub fn fingerprint_key(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut key = String::with_capacity(TRAP_LOCK_PREFIX.len() + digest.len() * 2);
    key.push_str(TRAP_LOCK_PREFIX);
    key.push_str(&hex::encode(&digest));
    key
}
