//! Coordinator backend seam.
//!
//! The lock client only needs two primitives from the coordinator:
//! an atomic set-if-absent with TTL and a delete. Putting them behind a
//! trait keeps the retry/backoff/release logic testable without a live
//! coordinator and leaves room for other stores.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Failure talking to the coordinator. The client treats any backend
/// error as a spent acquisition attempt.
#[derive(Debug, thiserror::Error)]
#[error("lock coordinator error: {message}")]
pub struct LockBackendError {
    /// Human-readable failure description.
    message: String,
}

impl LockBackendError {
    /// Wraps a failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Minimal coordinator interface required for lease arbitration.
#[async_trait]
pub trait LockBackend: Send + Sync + std::fmt::Debug {
    /// Atomically stores `token` under `key` with the given TTL if the
    /// key is absent. Returns `true` on success, `false` when the key
    /// is already held.
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockBackendError>;

    /// Deletes `key` unconditionally. Deleting an absent key is not an
    /// error.
    async fn delete(&self, key: &str) -> Result<(), LockBackendError>;
}

/// In-process backend with the same observable semantics as the real
/// coordinator (set-if-absent, TTL expiry, unconditional delete).
///
/// Arbitrates only within one process — it exists for tests and local
/// single-instance runs, not for fleet deployments.
#[derive(Debug, Default)]
pub struct MemoryLockBackend {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

#[derive(Debug)]
struct MemoryEntry {
    token: String,
    expires_at: Instant,
}

impl MemoryLockBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live (non-expired) entry exists for `key`.
    pub async fn is_held(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    /// The token currently stored for `key`, if any.
    pub async fn token_for(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.token.clone())
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockBackendError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
            // Expired entry: the real coordinator would have evicted it.
            entries.remove(key);
        }

        entries.insert(
            key.to_string(),
            MemoryEntry {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), LockBackendError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
