// src/storage/memory.rs

use crate::error::Result;
use crate::storage::{CallRecord, CallStore, KeyRecord, KeyStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::trace;

#[derive(Default)]
struct KeyTable {
    next_id: i64,
    rows: BTreeMap<i64, KeyRecord>,
}

/// In-memory implementation of the key and call stores.
///
/// Each operation takes the table's write guard once, which makes
/// multi-step updates atomic with respect to every other operation.
#[derive(Default)]
pub struct InMemoryStore {
    keys: RwLock<KeyTable>,
    calls: RwLock<HashMap<i64, Vec<CallRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for InMemoryStore {
    async fn insert_key(&self, secret: &str, now: DateTime<Utc>) -> Result<KeyRecord> {
        let mut table = self.keys.write().await;
        table.next_id += 1;
        let record = KeyRecord::new(table.next_id, secret.to_string(), now);
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_keys(&self) -> Result<Vec<KeyRecord>> {
        let table = self.keys.read().await;
        Ok(table.rows.values().cloned().collect())
    }

    async fn get_key(&self, id: i64) -> Result<Option<KeyRecord>> {
        let table = self.keys.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn key_count(&self) -> Result<usize> {
        Ok(self.keys.read().await.rows.len())
    }

    async fn select_and_stamp(&self, now: DateTime<Utc>) -> Result<Option<KeyRecord>> {
        trace!("InMemoryStore::select_and_stamp: waiting for write lock");
        let mut table = self.keys.write().await;
        trace!("InMemoryStore::select_and_stamp: got write lock");

        // BTreeMap iterates in ascending id, and min_by_key keeps the first
        // minimum, so equal timestamps resolve to the smallest id.
        let chosen = table
            .rows
            .values()
            .filter(|k| k.is_eligible())
            .min_by_key(|k| k.last_used_at)
            .map(|k| k.id);

        Ok(chosen.and_then(|id| {
            table.rows.get_mut(&id).map(|key| {
                key.last_used_at = Some(now);
                key.clone()
            })
        }))
    }

    async fn record_success(&self, id: i64) -> Result<bool> {
        let mut table = self.keys.write().await;
        Ok(table.rows.get_mut(&id).map(KeyRecord::record_success).is_some())
    }

    async fn record_failure(
        &self,
        id: i64,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<KeyRecord>> {
        let mut table = self.keys.write().await;
        Ok(table.rows.get_mut(&id).map(|key| {
            key.record_failure(threshold, now);
            key.clone()
        }))
    }

    async fn recover_unhealthy(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut table = self.keys.write().await;
        let mut restored = 0;
        for key in table.rows.values_mut().filter(|k| k.is_recoverable(cutoff)) {
            key.recover();
            restored += 1;
        }
        Ok(restored)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<Option<KeyRecord>> {
        let mut table = self.keys.write().await;
        Ok(table.rows.get_mut(&id).map(|key| {
            key.active = active;
            key.clone()
        }))
    }

    async fn delete_key(&self, id: i64) -> Result<bool> {
        let mut table = self.keys.write().await;
        Ok(table.rows.remove(&id).is_some())
    }
}

#[async_trait]
impl CallStore for InMemoryStore {
    async fn append_call(&self, record: CallRecord) -> Result<()> {
        let mut calls = self.calls.write().await;
        calls.entry(record.key_id).or_default().push(record);
        Ok(())
    }

    async fn calls_for_key(&self, key_id: i64) -> Result<Vec<CallRecord>> {
        let calls = self.calls.read().await;
        Ok(calls.get(&key_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_sequential_and_never_reused() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let a = store.insert_key("AIzaSyFirstKey0001", now).await.unwrap();
        let b = store.insert_key("AIzaSySecondKey002", now).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        assert!(store.delete_key(b.id).await.unwrap());
        let c = store.insert_key("AIzaSyThirdKey0003", now).await.unwrap();
        assert_eq!(c.id, 3);
    }

    #[tokio::test]
    async fn test_select_stamps_last_used() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.insert_key("AIzaSyFirstKey0001", now).await.unwrap();

        let picked = store.select_and_stamp(now).await.unwrap().unwrap();
        assert_eq!(picked.last_used_at, Some(now));
        let stored = store.get_key(picked.id).await.unwrap().unwrap();
        assert_eq!(stored.last_used_at, Some(now));
    }

    #[tokio::test]
    async fn test_unknown_ids_report_missing() {
        let store = InMemoryStore::new();
        assert!(!store.record_success(42).await.unwrap());
        assert!(store.record_failure(42, 3, Utc::now()).await.unwrap().is_none());
        assert!(store.set_active(42, false).await.unwrap().is_none());
        assert!(!store.delete_key(42).await.unwrap());
    }
}
