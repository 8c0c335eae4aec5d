use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, Result};

/// A thin async client over Redis.
///
/// All cross-request state (sessions, user-session indexes, rate-limit
/// counters, OAuth state) lives behind this client. Operations are atomic
/// single-key commands; the underlying `ConnectionManager` reconnects with
/// capped exponential backoff and bounds every round trip with a response
/// timeout, so a hung connection surfaces as an error instead of hanging
/// the request.
#[derive(Clone)]
pub struct CacheClient {
    conn: ConnectionManager,
}

impl CacheClient {
    /// Connects to Redis using the timeouts and backoff cap from `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_millis(config.redis_connect_timeout_ms))
            .set_response_timeout(Duration::from_millis(config.redis_response_timeout_ms))
            .set_number_of_retries(6)
            .set_exponent_base(2)
            .set_factor(100)
            .set_max_delay(config.redis_retry_max_delay_ms);

        let conn = ConnectionManager::new_with_config(client, manager_config).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        Ok(Self { conn })
    }

    /// Wraps an existing connection manager. Used by tests.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Gets a string value.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Sets a string value, with an optional TTL in seconds.
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<i64>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl_seconds {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.max(1) as u64).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    /// Deletes a key. Returns `true` if the key existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// Checks whether a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    /// Resets a key's TTL. Returns `false` if the key does not exist.
    pub async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let set: bool = conn.expire(key, ttl_seconds).await?;
        Ok(set)
    }

    /// Returns a key's remaining TTL in seconds (-2 missing, -1 no expiry).
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(key).await?;
        Ok(ttl)
    }

    /// Adds a member to a set.
    pub async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.sadd(key, member).await?;
        Ok(())
    }

    /// Removes a member from a set.
    pub async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.srem(key, member).await?;
        Ok(())
    }

    /// Returns all members of a set.
    pub async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    /// Checks set membership.
    pub async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let contains: bool = conn.sismember(key, member).await?;
        Ok(contains)
    }

    /// Sets a hash field.
    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.hset(key, field, value).await?;
        Ok(())
    }

    /// Gets a hash field.
    pub async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    /// Deletes a hash field. Returns `true` if the field existed.
    pub async fn hash_delete(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }

    /// Atomically increments a counter, returning the new value.
    pub async fn increment(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.incr(key, 1i64).await?;
        Ok(count)
    }

    /// Atomically gets and deletes a key.
    pub async fn get_delete(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    /// Deletes every key matching `pattern` via SCAN. Returns the number
    /// of keys removed.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let removed: u64 = conn.del(&keys).await?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }

    /// Gets a JSON value. Malformed JSON is treated as a cache miss, not
    /// an error: a corrupt entry must never poison reads.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };

        match sonic_rs::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("⚠️  Discarding malformed JSON at {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Serializes a value to JSON and stores it, with an optional TTL.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<i64>,
    ) -> Result<()> {
        let raw = sonic_rs::to_string(value)
            .map_err(|e| AppError::Internal(format!("JSON serialization failed: {}", e)))?;
        self.set(key, &raw, ttl_seconds).await
    }

    /// Round-trips a PING to verify connectivity.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(AppError::Internal(format!("Unexpected PING reply: {}", pong)))
        }
    }
}
