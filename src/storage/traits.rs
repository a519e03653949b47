// src/storage/traits.rs

use crate::error::Result;
use crate::storage::{CallRecord, KeyRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable table of key records.
///
/// Every method is a single atomic step against the backing store; callers
/// never hold anything across calls.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Inserts a new active, healthy key and returns it with its assigned id.
    async fn insert_key(&self, secret: &str, now: DateTime<Utc>) -> Result<KeyRecord>;

    /// All keys in ascending id (creation) order.
    async fn list_keys(&self) -> Result<Vec<KeyRecord>>;

    async fn get_key(&self, id: i64) -> Result<Option<KeyRecord>>;

    async fn key_count(&self) -> Result<usize>;

    /// Picks the eligible key with the oldest `last_used_at` (never-used first,
    /// ties by smallest id) and stamps it with `now` in the same step.
    async fn select_and_stamp(&self, now: DateTime<Utc>) -> Result<Option<KeyRecord>>;

    /// Clears failure state after a successful call. Returns false for an unknown id.
    async fn record_success(&self, id: i64) -> Result<bool>;

    /// Read-increment-write of the failure counter. `None` for an unknown id.
    async fn record_failure(
        &self,
        id: i64,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<KeyRecord>>;

    /// Restores every unhealthy key whose last failure is at or before `cutoff`.
    /// Returns how many keys were restored.
    async fn recover_unhealthy(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn set_active(&self, id: i64, active: bool) -> Result<Option<KeyRecord>>;

    /// Returns false when no key had this id.
    async fn delete_key(&self, id: i64) -> Result<bool>;
}

/// Append-only log of upstream attempts.
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn append_call(&self, record: CallRecord) -> Result<()>;

    async fn calls_for_key(&self, key_id: i64) -> Result<Vec<CallRecord>>;
}
