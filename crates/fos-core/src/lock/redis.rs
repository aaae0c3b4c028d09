//! Redis-backed lock coordinator.
//!
//! One pooled connection set is shared by all requests; each lease
//! operation borrows a connection for a single round trip. Pool sizing
//! and the per-operation timeout follow the deployment defaults
//! (`max 100` connections, 2 s budget per coordinator call).

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::{
    Config, Connection, ConnectionAddr, ConnectionInfo, Pool, PoolConfig, RedisConnectionInfo,
    Runtime, Timeouts,
};

use super::backend::{LockBackend, LockBackendError};
use crate::config::RedisConfig;

/// Maximum pooled connections to the coordinator.
const POOL_MAX_SIZE: usize = 100;

/// Budget for a single coordinator round trip (connect or borrow).
const OP_TIMEOUT: Duration = Duration::from_secs(2);

/// [`LockBackend`] implementation over a Redis-compatible store.
#[derive(Debug, Clone)]
pub struct RedisLockBackend {
    pool: Pool,
}

impl RedisLockBackend {
    /// Builds the connection pool for the configured coordinator.
    ///
    /// No connection is established yet; the first lease operation
    /// pays that cost, so a misconfigured coordinator surfaces as
    /// `LockUnavailable` on the first append rather than at startup.
    ///
    /// # Errors
    ///
    /// Returns [`LockBackendError`] when the pool cannot be built.
    pub fn connect(config: &RedisConfig) -> Result<Self, LockBackendError> {
        let mut pool_config = PoolConfig::new(POOL_MAX_SIZE);
        pool_config.timeouts = Timeouts {
            wait: Some(OP_TIMEOUT),
            create: Some(OP_TIMEOUT),
            recycle: Some(OP_TIMEOUT),
        };

        let pool = Config {
            url: None,
            connection: Some(ConnectionInfo {
                addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
                redis: RedisConnectionInfo {
                    password: Some(config.password.clone()),
                    ..RedisConnectionInfo::default()
                },
            }),
            pool: Some(pool_config),
        }
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| LockBackendError::new(format!("failed to build coordinator pool: {e}")))?;

        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<Connection, LockBackendError> {
        self.pool
            .get()
            .await
            .map_err(|e| LockBackendError::new(format!("coordinator connection failed: {e}")))
    }
}

#[async_trait]
impl LockBackend for RedisLockBackend {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockBackendError> {
        let mut conn = self.connection().await?;
        // SET key token NX EX ttl — nil reply means the key is held.
        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| LockBackendError::new(format!("SET NX failed: {e}")))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), LockBackendError> {
        let mut conn = self.connection().await?;
        cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| LockBackendError::new(format!("DEL failed: {e}")))?;
        Ok(())
    }
}
