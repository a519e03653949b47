// src/ledger.rs

use crate::error::{NonFatal, Result};
use crate::storage::{CallRecord, Store};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Per-key call statistics.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyCallStats {
    pub id: i64,
    pub key_preview: String,
    pub call_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Whole percent, `None` while the key has no calls.
    pub success_rate: Option<u32>,
    pub last_call_at: Option<DateTime<Utc>>,
}

/// Append-only log of upstream attempts, used for observability only.
pub struct CallLedger {
    store: Arc<dyn Store>,
}

impl CallLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Writes one call record. A failed write is returned as [`NonFatal`], never retried.
    pub async fn append(&self, key_id: i64, success: bool, status_code: Option<u16>) -> NonFatal {
        self.store
            .append_call(CallRecord::new(key_id, success, status_code))
            .await
            .into()
    }

    /// Statistics for every key currently in the pool, in id order.
    /// Calls made with keys that have since been deleted are not reported.
    pub async fn aggregate(&self) -> Result<Vec<KeyCallStats>> {
        let keys = self.store.list_keys().await?;
        let mut stats = Vec::with_capacity(keys.len());
        for key in &keys {
            let calls = self.store.calls_for_key(key.id).await?;
            stats.push(summarize(key.id, key.preview(), &calls));
        }
        Ok(stats)
    }
}

fn summarize(id: i64, key_preview: String, calls: &[CallRecord]) -> KeyCallStats {
    let call_count = calls.len() as u64;
    let success_count = calls.iter().filter(|c| c.success).count() as u64;
    KeyCallStats {
        id,
        key_preview,
        call_count,
        success_count,
        failure_count: call_count - success_count,
        success_rate: success_rate(success_count, call_count),
        last_call_at: calls.iter().map(|c| c.created_at).max(),
    }
}

fn success_rate(successes: u64, total: u64) -> Option<u32> {
    if total == 0 {
        return None;
    }
    Some((successes as f64 / total as f64 * 100.0).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_rounds_to_whole_percent() {
        assert_eq!(success_rate(0, 0), None);
        assert_eq!(success_rate(1, 3), Some(33));
        assert_eq!(success_rate(2, 3), Some(67));
        assert_eq!(success_rate(1, 2), Some(50));
        assert_eq!(success_rate(4, 4), Some(100));
    }

    #[test]
    fn test_summarize_counts_and_latest_call() {
        let mut early = CallRecord::new(1, true, Some(200));
        early.created_at = early.created_at - chrono::Duration::seconds(30);
        let late = CallRecord::new(1, false, Some(429));
        let latest = late.created_at;

        let stats = summarize(1, "AIzaSyAB...1234".into(), &[early, late]);
        assert_eq!(stats.call_count, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.success_rate, Some(50));
        assert_eq!(stats.last_call_at, Some(latest));
    }
}
