//! Distributed lock client for fleet-wide append serialization.
//!
//! Appends to the same path must be serialized across threads *and*
//! across service instances. This module implements the client side of
//! that contract against an external key-value coordinator: an atomic
//! "set if absent with TTL" grants a [`Lease`], and deleting the key
//! releases it. The coordinator expires the key on its own if the
//! holder crashes.
//!
//! # Lease lifecycle
//!
//! ```text
//!            acquire() success        release() / TTL expiry
//!    (init) ───────────────────▶ HELD ────────────────────▶ (dead)
//! ```
//!
//! HELD is terminal for the holder once released; a second `release()`
//! is a no-op.
//!
//! # Key properties
//!
//! - **At-most-one holder**: the coordinator's set-if-absent arbitrates
//!   a single live lease per key across the fleet.
//! - **Bounded acquisition**: at most [`MAX_ATTEMPTS`] tries with
//!   linear backoff; a coordinator I/O error consumes an attempt.
//! - **Release never fails upward**: release errors are logged and
//!   swallowed — the TTL is the backstop.

mod backend;
mod redis;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, trace, warn};

pub use backend::{LockBackend, LockBackendError, MemoryLockBackend};
pub use redis::RedisLockBackend;

use crate::error::FsError;

/// Lease time-to-live enforced by the coordinator.
pub const LOCK_TTL: Duration = Duration::from_secs(30);

/// Maximum acquisition attempts before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay for the linear backoff between attempts (attempt × base).
pub const RETRY_BASE: Duration = Duration::from_millis(1000);

/// Client handle for acquiring named leases on the coordinator.
#[derive(Clone)]
pub struct LockClient {
    backend: Arc<dyn LockBackend>,
    ttl: Duration,
    max_attempts: u32,
    retry_base: Duration,
    owner: Arc<str>,
    counter: Arc<AtomicU64>,
}

impl std::fmt::Debug for LockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockClient")
            .field("ttl", &self.ttl)
            .field("max_attempts", &self.max_attempts)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl LockClient {
    /// Creates a client with the default TTL and retry budget.
    #[must_use]
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            backend,
            ttl: LOCK_TTL,
            max_attempts: MAX_ATTEMPTS,
            retry_base: RETRY_BASE,
            owner: owner_identity().into(),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Overrides the retry budget. Intended for tests and tuning; the
    /// defaults match the service contract.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, retry_base: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_base = retry_base;
        self
    }

    /// Overrides the lease TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Acquires the lease for `key`, retrying with linear backoff.
    ///
    /// Tokens are `host:pid:counter`, unique well within any realistic
    /// TTL. Dropping the returned future during a backoff sleep aborts
    /// the acquisition — callers that are cancelled never end up
    /// holding a lease they cannot release.
    ///
    /// # Errors
    ///
    /// [`FsError::LockUnavailable`] once the retry budget is exhausted.
    pub async fn acquire(&self, key: &str) -> Result<Lease, FsError> {
        let token = format!(
            "{}:{}",
            self.owner,
            self.counter.fetch_add(1, Ordering::Relaxed)
        );

        for attempt in 1..=self.max_attempts {
            match self.backend.set_if_absent(key, &token, self.ttl).await {
                Ok(true) => {
                    trace!(key, attempt, "lease acquired");
                    return Ok(Lease {
                        key: key.to_string(),
                        token,
                        backend: Arc::clone(&self.backend),
                        released: false,
                    });
                },
                Ok(false) => {
                    debug!(key, attempt, "lease held elsewhere");
                },
                Err(error) => {
                    // An I/O failure talking to the coordinator counts
                    // as a spent attempt.
                    warn!(key, attempt, %error, "lease acquisition attempt failed");
                },
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_base * attempt).await;
            }
        }

        Err(FsError::LockUnavailable {
            key: key.to_string(),
            reason: format!("not acquired after {} attempts", self.max_attempts),
        })
    }
}

/// A held lease on the coordinator.
///
/// Owned by the request that acquired it; must be released on every
/// exit path. [`Lease::release`] is the normal path; the `Drop`
/// backstop covers unwinds, spawning a best-effort delete when a
/// runtime is available (the TTL catches the rest).
#[derive(Debug)]
pub struct Lease {
    key: String,
    token: String,
    backend: Arc<dyn LockBackend>,
    released: bool,
}

impl Lease {
    /// The coordinator key this lease holds.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The opaque token written for this acquisition.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Releases the lease by deleting the coordinator key.
    ///
    /// Idempotent, and never propagates failure: a release error is
    /// logged and left to TTL expiry. The delete is unconditional —
    /// a scripted compare-and-delete by token would be stronger against
    /// an expired-then-reacquired key, but the short TTL plus bounded
    /// hold times keep the window negligible.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(error) = self.backend.delete(&self.key).await {
            warn!(key = %self.key, %error, "failed to release lease, relying on TTL expiry");
        } else {
            trace!(key = %self.key, "lease released");
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let key = std::mem::take(&mut self.key);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            warn!(key = %key, "lease dropped without release, deleting in background");
            handle.spawn(async move {
                let _ = backend.delete(&key).await;
            });
        } else {
            warn!(key = %key, "lease dropped outside a runtime, awaiting TTL expiry");
        }
    }
}

/// `host:pid` prefix shared by all tokens this process mints.
fn owner_identity() -> String {
    let host = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{host}:{}", std::process::id())
}
