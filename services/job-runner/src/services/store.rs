//! Key-value store used for single-use tokens.

use crate::error::StoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, error};

/// Write access to the token store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or rejects the write.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), StoreError>;
}

/// Redis-backed [`KeyValueStore`].
#[derive(Clone)]
pub struct RedisStore {
    /// Redis connection manager.
    conn: ConnectionManager,
}

impl RedisStore {
    /// Create a store on top of an existing Redis connection.
    #[must_use]
    pub const fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let namespace = key_namespace(key);
        debug!(namespace, ttl = ?ttl, "SET EX");

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(|e| {
                error!(error = %e, namespace, "SET EX failed");
                StoreError::from(e)
            })
    }
}

/// Part of `key` before the first `:`. Keys embed secrets after it.
fn key_namespace(key: &str) -> &str {
    key.split(':').next().unwrap_or_default()
}
