//! Redis module for the events service
//!
//! This module provides the Redis connection pool and the handful of atomic
//! primitives the document store is built on: plain get/set, multi-key reads,
//! set membership, and Lua scripts that compare a whole value before replacing
//! or deleting it.

use redis::{AsyncCommands, Client, Script};
use serde::Deserialize;
use tracing::info;

use crate::error::{CacheError, CacheResult};

const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

const INSERT_INDEXED: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SADD', KEYS[2], ARGV[2])
return 1
"#;

const DELETE_INDEXED: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('DEL', KEYS[1])
    redis.call('SREM', KEYS[2], ARGV[2])
    return 1
end
return 0
"#;

const INSERT_UNIQUE: &str = r#"
if redis.call('SETNX', KEYS[2], ARGV[2]) == 0 then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1])
return 1
"#;

/// Configuration for Redis connection
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Prefix applied to every key written by the service
    pub key_prefix: String,
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    compare_and_swap: Script,
    insert_indexed: Script,
    delete_indexed: Script,
    insert_unique: Script,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.clone()).map_err(CacheError::Connection)?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool {
            client,
            compare_and_swap: Script::new(COMPARE_AND_SWAP),
            insert_indexed: Script::new(INSERT_INDEXED),
            delete_indexed: Script::new(DELETE_INDEXED),
            insert_unique: Script::new(INSERT_UNIQUE),
        })
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> CacheResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Connection)
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await.map_err(CacheError::Command)?;
        Ok(value)
    }

    /// Read several keys in one atomic `MGET`
    pub async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.get_connection().await?;
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Command)?;
        Ok(values)
    }

    /// List the members of a set
    pub async fn members(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let members: Vec<String> = conn.smembers(key).await.map_err(CacheError::Command)?;
        Ok(members)
    }

    /// Replace `key` with `new` only if it still holds `expected`
    pub async fn compare_and_swap(&self, key: &str, expected: &str, new: &str) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let swapped: i32 = self
            .compare_and_swap
            .key(key)
            .arg(expected)
            .arg(new)
            .invoke_async(&mut conn)
            .await
            .map_err(CacheError::Command)?;
        Ok(swapped == 1)
    }

    /// Store `value` under `key` if absent and add `member` to the `index` set
    pub async fn insert_indexed(
        &self,
        key: &str,
        value: &str,
        index: &str,
        member: &str,
    ) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let inserted: i32 = self
            .insert_indexed
            .key(key)
            .key(index)
            .arg(value)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(CacheError::Command)?;
        Ok(inserted == 1)
    }

    /// Delete `key` if it still holds `expected` and remove `member` from `index`
    pub async fn delete_indexed(
        &self,
        key: &str,
        expected: &str,
        index: &str,
        member: &str,
    ) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let deleted: i32 = self
            .delete_indexed
            .key(key)
            .key(index)
            .arg(expected)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(CacheError::Command)?;
        Ok(deleted == 1)
    }

    /// Store `value` under `key` while claiming `unique_key` for `owner`
    ///
    /// Returns false without writing anything when `unique_key` is already taken.
    pub async fn insert_unique(
        &self,
        key: &str,
        value: &str,
        unique_key: &str,
        owner: &str,
    ) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let inserted: i32 = self
            .insert_unique
            .key(key)
            .key(unique_key)
            .arg(value)
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(CacheError::Command)?;
        Ok(inserted == 1)
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await.map_err(CacheError::Command)?;
        Ok(())
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Command)?;
        Ok(pong == "PONG")
    }
}
