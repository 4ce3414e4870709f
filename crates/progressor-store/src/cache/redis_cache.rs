//! Redis cache backend.

use super::CacheBackend;
use async_trait::async_trait;
use progressor_core::{config::CacheConfig, error::ProgressorError};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

/// Cache stored in a Redis database.
///
/// One multiplexed connection is shared by all clones of the handle.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// Connect using the host, port, db and credentials in `config`.
    pub async fn connect(config: &CacheConfig) -> Result<Self, ProgressorError> {
        let client = redis::Client::open(config.redis_url())
            .map_err(|e| ProgressorError::Cache(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                ProgressorError::Cache(format!(
                    "failed to connect to redis at {}:{}: {e}",
                    config.host, config.port
                ))
            })?;
        info!(
            "Redis cache connected at {}:{} (db {})",
            config.host, config.port, config.db
        );
        Ok(Self { conn })
    }
}

fn cache_err(op: &str, e: redis::RedisError) -> ProgressorError {
    ProgressorError::Cache(format!("redis {op} failed: {e}"))
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ProgressorError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(|e| cache_err("GET", e))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ProgressorError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(key, value)
            .await
            .map_err(|e| cache_err("SET", e))?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, ProgressorError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(keys).await.map_err(|e| cache_err("DEL", e))?;
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, ProgressorError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| cache_err("KEYS", e))?;
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, ProgressorError> {
        let mut conn = self.conn.clone();
        let found: bool = conn
            .exists(key)
            .await
            .map_err(|e| cache_err("EXISTS", e))?;
        Ok(found)
    }

    async fn flush(&self) -> Result<(), ProgressorError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_err("FLUSHDB", e))?;
        Ok(())
    }
}
