// src/storage/redis.rs

use crate::error::{AppError, Result};
use crate::storage::{CallRecord, CallStore, KeyRecord, KeyStore};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use deadpool_redis::{Config as PoolConfig, Connection as RedisConnection, Pool, Runtime};
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use tracing::{info, trace};

const KEY_IDS: &str = "key_ids";
const KEY_SEQUENCE: &str = "key_seq";
const DEFAULT_PREFIX: &str = "gemini_keypool:";
/// Stored in timestamp fields that are logically null.
const NULL_TIMESTAMP: i64 = -1;

// KEYS[1] = id index, ARGV[1] = key hash prefix, ARGV[2] = now (ms)
static SELECT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        local ids = redis.call('ZRANGE', KEYS[1], 0, -1)
        local best_id = false
        local best_used = nil
        for _, id in ipairs(ids) do
            local f = redis.call('HMGET', ARGV[1] .. id, 'active', 'healthy', 'last_used_at')
            if f[1] == '1' and f[2] == '1' then
                local used = tonumber(f[3]) or -1
                if best_used == nil or used < best_used then
                    best_id = id
                    best_used = used
                end
            end
        end
        if not best_id then
            return false
        end
        redis.call('HSET', ARGV[1] .. best_id, 'last_used_at', ARGV[2])
        return tonumber(best_id)
        ",
    )
});

// KEYS[1] = key hash, ARGV[1] = threshold, ARGV[2] = now (ms)
static FAILURE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('EXISTS', KEYS[1]) == 0 then
            return -1
        end
        local n = redis.call('HINCRBY', KEYS[1], 'failure_count', 1)
        local healthy = '1'
        if n >= tonumber(ARGV[1]) then
            healthy = '0'
        end
        redis.call('HSET', KEYS[1], 'last_failure_at', ARGV[2], 'healthy', healthy)
        return n
        ",
    )
});

// KEYS[1] = key hash
static SUCCESS_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('EXISTS', KEYS[1]) == 0 then
            return 0
        end
        redis.call('HSET', KEYS[1], 'failure_count', '0', 'last_failure_at', '-1', 'healthy', '1')
        return 1
        ",
    )
});

// KEYS[1] = key hash, ARGV[1] = '1' or '0'
static SET_ACTIVE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('EXISTS', KEYS[1]) == 0 then
            return 0
        end
        redis.call('HSET', KEYS[1], 'active', ARGV[1])
        return 1
        ",
    )
});

// KEYS[1] = id index, ARGV[1] = key hash prefix, ARGV[2] = cutoff (ms)
static RECOVER_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        local ids = redis.call('ZRANGE', KEYS[1], 0, -1)
        local cutoff = tonumber(ARGV[2])
        local restored = 0
        for _, id in ipairs(ids) do
            local key = ARGV[1] .. id
            local f = redis.call('HMGET', key, 'healthy', 'last_failure_at')
            local failed_at = tonumber(f[2]) or -1
            if f[1] == '0' and failed_at >= 0 and failed_at <= cutoff then
                redis.call('HSET', key, 'healthy', '1', 'failure_count', '0')
                restored = restored + 1
            end
        end
        return restored
        ",
    )
});

/// Redis implementation of the key and call stores.
///
/// Layout under the configured prefix:
/// - `key_ids`: sorted set of key ids scored by id
/// - `key_seq`: id sequence
/// - `key:{id}`: hash with the key record fields
/// - `calls:{id}`: list of JSON call records
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStore {
    /// Creates a connection pool for `redis_url` and verifies it with a `PING`.
    pub async fn connect(redis_url: &str, key_prefix: Option<String>) -> Result<Self> {
        let pool = PoolConfig::from_url(redis_url).create_pool(Some(Runtime::Tokio1))?;
        let store = Self::new(pool, key_prefix);
        let mut conn = store.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(prefix = %store.key_prefix, "Connected to Redis key store");
        Ok(store)
    }

    pub fn new(pool: Pool, key_prefix: Option<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        }
    }

    fn prefix_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn key_hash_prefix(&self) -> String {
        self.prefix_key("key:")
    }

    fn key_hash(&self, id: i64) -> String {
        self.prefix_key(&format!("key:{id}"))
    }

    fn calls_list(&self, id: i64) -> String {
        self.prefix_key(&format!("calls:{id}"))
    }

    async fn get_connection(&self) -> Result<RedisConnection> {
        self.pool.get().await.map_err(Into::into)
    }

    async fn load_key(&self, conn: &mut RedisConnection, id: i64) -> Result<Option<KeyRecord>> {
        let fields: HashMap<String, String> = conn.hgetall(self.key_hash(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        parse_key_record(id, &fields).map(Some)
    }
}

fn to_millis(ts: Option<DateTime<Utc>>) -> i64 {
    ts.map_or(NULL_TIMESTAMP, |t| t.timestamp_millis())
}

fn from_millis(raw: Option<&String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| s.parse::<i64>().ok())
        .filter(|ms| *ms >= 0)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn parse_key_record(id: i64, fields: &HashMap<String, String>) -> Result<KeyRecord> {
    let secret = fields
        .get("secret")
        .cloned()
        .ok_or_else(|| AppError::StorageOperation {
            operation: "load_key".to_string(),
            message: format!("key {id} has no secret field"),
        })?;
    let created_at = from_millis(fields.get("created_at")).unwrap_or_else(Utc::now);

    let mut record = KeyRecord::new(id, secret, created_at);
    record.active = fields.get("active").map_or(true, |v| v == "1");
    record.healthy = fields.get("healthy").map_or(true, |v| v == "1");
    record.failure_count = fields
        .get("failure_count")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    record.last_used_at = from_millis(fields.get("last_used_at"));
    record.last_failure_at = from_millis(fields.get("last_failure_at"));
    Ok(record)
}

fn bool_field(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

#[async_trait]
impl KeyStore for RedisStore {
    async fn insert_key(&self, secret: &str, now: DateTime<Utc>) -> Result<KeyRecord> {
        let mut conn = self.get_connection().await?;
        let id: i64 = conn.incr(self.prefix_key(KEY_SEQUENCE), 1).await?;
        let record = KeyRecord::new(id, secret.to_string(), now);

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(
            self.key_hash(id),
            &[
                ("secret", record.secret.expose_secret().clone()),
                ("active", "1".to_string()),
                ("healthy", "1".to_string()),
                ("failure_count", "0".to_string()),
                ("last_used_at", NULL_TIMESTAMP.to_string()),
                ("last_failure_at", NULL_TIMESTAMP.to_string()),
                ("created_at", to_millis(Some(now)).to_string()),
            ],
        );
        pipe.zadd(self.prefix_key(KEY_IDS), id, id);
        let _: () = pipe.query_async(&mut conn).await?;

        trace!(key.id = id, "RedisStore::insert_key: stored");
        Ok(record)
    }

    async fn list_keys(&self) -> Result<Vec<KeyRecord>> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<i64> = conn.zrange(self.prefix_key(KEY_IDS), 0, -1).await?;
        let mut keys = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load_key(&mut conn, id).await? {
                keys.push(record);
            }
        }
        Ok(keys)
    }

    async fn get_key(&self, id: i64) -> Result<Option<KeyRecord>> {
        let mut conn = self.get_connection().await?;
        self.load_key(&mut conn, id).await
    }

    async fn key_count(&self) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let count: usize = conn.zcard(self.prefix_key(KEY_IDS)).await?;
        Ok(count)
    }

    async fn select_and_stamp(&self, now: DateTime<Utc>) -> Result<Option<KeyRecord>> {
        trace!("RedisStore::select_and_stamp: start");
        let mut conn = self.get_connection().await?;
        let chosen: Option<i64> = SELECT_SCRIPT
            .key(self.prefix_key(KEY_IDS))
            .arg(self.key_hash_prefix())
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        match chosen {
            Some(id) => self.load_key(&mut conn, id).await,
            None => Ok(None),
        }
    }

    async fn record_success(&self, id: i64) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let updated: i64 = SUCCESS_SCRIPT
            .key(self.key_hash(id))
            .invoke_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    async fn record_failure(
        &self,
        id: i64,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<KeyRecord>> {
        let mut conn = self.get_connection().await?;
        let count: i64 = FAILURE_SCRIPT
            .key(self.key_hash(id))
            .arg(threshold)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        if count < 0 {
            return Ok(None);
        }
        self.load_key(&mut conn, id).await
    }

    async fn recover_unhealthy(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        let restored: u64 = RECOVER_SCRIPT
            .key(self.prefix_key(KEY_IDS))
            .arg(self.key_hash_prefix())
            .arg(cutoff.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        Ok(restored)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<Option<KeyRecord>> {
        let mut conn = self.get_connection().await?;
        let updated: i64 = SET_ACTIVE_SCRIPT
            .key(self.key_hash(id))
            .arg(bool_field(active))
            .invoke_async(&mut conn)
            .await?;
        if updated == 0 {
            return Ok(None);
        }
        self.load_key(&mut conn, id).await
    }

    async fn delete_key(&self, id: i64) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.zrem(self.prefix_key(KEY_IDS), id);
        pipe.del(self.key_hash(id)).ignore();
        let (removed,): (i64,) = pipe.query_async(&mut conn).await?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl CallStore for RedisStore {
    async fn append_call(&self, record: CallRecord) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let payload = serde_json::to_string(&record)?;
        let _: () = conn.rpush(self.calls_list(record.key_id), payload).await?;
        Ok(())
    }

    async fn calls_for_key(&self, key_id: i64) -> Result<Vec<CallRecord>> {
        let mut conn = self.get_connection().await?;
        let raw: Vec<String> = conn.lrange(self.calls_list(key_id), 0, -1).await?;
        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(Into::into))
            .collect()
    }
}
