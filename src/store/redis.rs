//! Redis implementation of the store contract.
//!
//! Key/value entries map to GET/SET/DEL, FIFO lists to RPUSH/LPUSH/LPOP/LLEN
//! and unique sets to SADD/SREM/SMEMBERS. All keys go through an optional
//! prefix so several deployments can share one database.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{ListPriority, Store, StoreError};

/// Redis-backed [`Store`].
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - connection URL (e.g., "redis://localhost:6379")
    /// * `prefix` - prepended to every key; pass "" for none
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(conn, prefix))
    }

    /// Build a store from an existing connection manager, useful when
    /// sharing one connection pool across components.
    pub fn from_connection(conn: ConnectionManager, prefix: &str) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
        }
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(self.prefixed(key)).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.prefixed(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.prefixed(key)).await?;
        Ok(())
    }

    async fn list_push(
        &self,
        key: &str,
        value: &str,
        priority: ListPriority,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let size = match priority {
            ListPriority::Normal => conn.rpush(self.prefixed(key), value).await?,
            ListPriority::High => conn.lpush(self.prefixed(key), value).await?,
        };
        Ok(size)
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.lpop(self.prefixed(key), None).await?)
    }

    async fn list_size(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(self.prefixed(key)).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(self.prefixed(key), member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(self.prefixed(key), member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(self.prefixed(key)).await?)
    }
}
