//! Session usage buffer: per-user interim usage records awaiting an evaluation.
//!
//! Records are appended as turn-level calls complete and drained in one step
//! when an interview is evaluated. The buffer is best-effort: the in-memory
//! backend loses its contents on restart and is not shared between instances,
//! the Redis backend is shared but still not durable beyond its TTL.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::usage::record::UsageRecord;

const REDIS_KEY_PREFIX: &str = "usage_buffer";

/// Keyed by user, not interview: turn calls happen before the caller knows
/// which saved interview they will be attributed to.
#[async_trait]
pub trait UsageBuffer: Send + Sync {
    /// Appends a record to the user's list, creating the list if absent.
    async fn record(&self, user_id: Uuid, record: UsageRecord) -> Result<()>;

    /// Returns and removes the user's whole list in one atomic step.
    /// An absent list drains as empty.
    async fn drain(&self, user_id: Uuid) -> Result<Vec<UsageRecord>>;
}

/// Appends a record, logging instead of failing. Metering must never break a turn.
pub async fn record_best_effort(buffer: &dyn UsageBuffer, user_id: Uuid, record: UsageRecord) {
    let function_name = record.function_name.clone();
    if let Err(e) = buffer.record(user_id, record).await {
        warn!("Dropped {function_name} usage for user {user_id}: {e:#}");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory backend
// ────────────────────────────────────────────────────────────────────────────

/// Process-local buffer. Every operation holds the map lock for its whole
/// duration and never awaits while holding it.
#[derive(Default)]
pub struct InMemoryUsageBuffer {
    entries: Mutex<HashMap<Uuid, Vec<UsageRecord>>>,
}

impl InMemoryUsageBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageBuffer for InMemoryUsageBuffer {
    async fn record(&self, user_id: Uuid, record: UsageRecord) -> Result<()> {
        let mut entries = self.entries.lock();
        let list = entries.entry(user_id).or_default();
        list.push(record);
        debug!("Buffered usage for user {user_id}, buffer size {}", list.len());
        Ok(())
    }

    async fn drain(&self, user_id: Uuid) -> Result<Vec<UsageRecord>> {
        Ok(self.entries.lock().remove(&user_id).unwrap_or_default())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis backend
// ────────────────────────────────────────────────────────────────────────────

/// Shared buffer backed by one Redis list per user.
///
/// `record` is RPUSH + EXPIRE; `drain` is LRANGE + DEL inside MULTI/EXEC so
/// no push can land between the read and the delete.
pub struct RedisUsageBuffer {
    conn: MultiplexedConnection,
    ttl: Duration,
}

impl RedisUsageBuffer {
    pub fn new(conn: MultiplexedConnection, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    fn key(user_id: Uuid) -> String {
        format!("{REDIS_KEY_PREFIX}:{user_id}")
    }
}

#[async_trait]
impl UsageBuffer for RedisUsageBuffer {
    async fn record(&self, user_id: Uuid, record: UsageRecord) -> Result<()> {
        let key = Self::key(user_id);
        let payload = serde_json::to_string(&record)?;
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let mut conn = self.conn.clone();

        let (len,): (i64,) = redis::pipe()
            .atomic()
            .rpush(&key, payload)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl)
            .ignore()
            .query_async(&mut conn)
            .await
            .with_context(|| format!("RPUSH {key} failed"))?;

        debug!("Buffered usage for user {user_id} in redis, buffer size {len}");
        Ok(())
    }

    async fn drain(&self, user_id: Uuid) -> Result<Vec<UsageRecord>> {
        let key = Self::key(user_id);
        let mut conn = self.conn.clone();

        let (raw,): (Vec<String>,) = redis::pipe()
            .atomic()
            .lrange(&key, 0, -1)
            .del(&key)
            .ignore()
            .query_async(&mut conn)
            .await
            .with_context(|| format!("drain of {key} failed"))?;

        // A record that no longer deserializes is dropped rather than blocking the drain.
        Ok(raw
            .iter()
            .filter_map(|item| match serde_json::from_str::<UsageRecord>(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Discarding unreadable buffered usage for user {user_id}: {e}");
                    None
                }
            })
            .collect())
    }
}
