//! Time-bounded cache for derived values.
//!
//! The ledger backend enforces per-minute quotas, so anything that can
//! tolerate a few minutes of staleness is cached: the resolved workbook
//! handle at a short TTL, the materials catalog and statistics snapshot at a
//! medium TTL. Failed computes are never cached; the next call retries.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// TTL for the resolved workbook handle.
pub const HANDLE_TTL: Duration = Duration::from_secs(60);
/// TTL for the materials catalog and the statistics snapshot.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(300);

/// String-keyed cache of cloneable values with per-read TTL.
pub struct TtlCache<T> {
    entries: Mutex<HashMap<String, (T, Instant)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached value for `key` if stored less than `ttl` ago.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<T> {
        let entries = self.entries.lock();
        match entries.get(key) {
            Some((value, stored_at)) if stored_at.elapsed() < ttl => Some(value.clone()),
            _ => None,
        }
    }

    /// Store `value` under `key` with the current timestamp.
    pub fn put(&self, key: &str, value: T) {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now()));
    }

    /// Drop the entry unconditionally. No-op for missing keys.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Return the cached value, or run `compute` and cache its result.
    pub fn get_or_compute(&self, key: &str, ttl: Duration, compute: impl FnOnce() -> T) -> T {
        if let Some(value) = self.get(key, ttl) {
            return value;
        }
        let value = compute();
        self.put(key, value.clone());
        value
    }

    /// Async fallible variant of [`get_or_compute`](Self::get_or_compute).
    ///
    /// The lock is not held across the await, so two overlapping misses can
    /// both compute; the second write wins. That costs at most one extra
    /// remote read and never serves data older than the TTL.
    pub async fn get_or_try_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key, ttl) {
            return Ok(value);
        }
        let value = compute().await?;
        self.put(key, value.clone());
        Ok(value)
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
