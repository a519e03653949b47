// src/key_manager.rs

use crate::config::PoolConfig;
use crate::error::{AppError, NonFatal, Result};
use crate::metrics;
use crate::storage::{KeyRecord, Store, MIN_SECRET_LEN};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Key summary safe to hand to admin and observability callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeySummary {
    pub id: i64,
    pub key_preview: String,
    pub is_active: bool,
    pub is_healthy: bool,
    pub failure_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&KeyRecord> for KeySummary {
    fn from(key: &KeyRecord) -> Self {
        Self {
            id: key.id,
            key_preview: key.preview(),
            is_active: key.active,
            is_healthy: key.healthy,
            failure_count: key.failure_count,
            last_used_at: key.last_used_at,
            last_failure_at: key.last_failure_at,
            created_at: key.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct HealthCounts {
    pub total: usize,
    pub active: usize,
    /// Active and healthy.
    pub healthy: usize,
    /// Active but quarantined by the circuit breaker.
    pub unhealthy: usize,
    pub disabled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    pub stats: HealthCounts,
    pub keys: Vec<KeySummary>,
    /// UNIX seconds.
    pub timestamp: i64,
}

/// Selects, health-tracks and recovers keys.
///
/// Selection is a least-recently-used rotation: the store stamps the chosen
/// key's `last_used_at` in the same atomic step that picks it, so concurrent
/// selections spread across the pool. Nothing is held across the upstream
/// call, so one key may serve several in-flight requests when the pool is
/// smaller than the concurrency.
pub struct KeyManager {
    store: Arc<dyn Store>,
    policy: PoolConfig,
}

impl KeyManager {
    pub fn new(store: Arc<dyn Store>, policy: PoolConfig) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &PoolConfig {
        &self.policy
    }

    /// Adds `secrets` through [`KeyManager::add`] when the store holds no keys yet.
    /// Invalid secrets are skipped with a warning.
    pub async fn seed(&self, secrets: &[String]) -> Result<usize> {
        if secrets.is_empty() {
            return Ok(0);
        }
        let existing = self.store.key_count().await?;
        if existing > 0 {
            info!(existing, "Key store already populated. Skipping seeding from config.");
            return Ok(0);
        }

        let mut added = 0;
        for secret in secrets {
            match self.add(secret).await {
                Ok(_) => added += 1,
                Err(e) => warn!(error = %e, "Skipping invalid seed key"),
            }
        }
        info!(added, "Seeded key store from configuration");
        Ok(added)
    }

    /// Returns the eligible key used least recently, or `None` when the pool is exhausted.
    #[instrument(level = "debug", skip(self))]
    pub async fn select_key(&self) -> Result<Option<KeyRecord>> {
        let selected = self.store.select_and_stamp(Utc::now()).await?;
        match &selected {
            Some(key) => {
                metrics::record_key_selected();
                debug!(key.id = key.id, key.preview = %key.preview(), "Selected API key");
            }
            None => {
                metrics::record_capacity_exhausted();
                warn!("No eligible API keys available");
            }
        }
        Ok(selected)
    }

    /// Clears the key's failure state. Never fails the caller.
    pub async fn record_success(&self, id: i64) -> NonFatal {
        let result = self.store.record_success(id).await.map(|found| {
            if !found {
                debug!(key.id = id, "Success recorded for a key that no longer exists");
            }
        });
        NonFatal::from(result)
    }

    /// Counts one failure against the key, tripping the breaker at the configured threshold.
    pub async fn record_failure(&self, id: i64) -> NonFatal {
        let threshold = self.policy.failure_threshold;
        let result = self
            .store
            .record_failure(id, threshold, Utc::now())
            .await
            .map(|updated| match updated {
                Some(key) => {
                    let tripped = !key.healthy && key.failure_count == threshold;
                    metrics::record_key_failure(tripped);
                    if tripped {
                        warn!(
                            key.id = key.id,
                            key.preview = %key.preview(),
                            failure_count = key.failure_count,
                            "Circuit breaker tripped: key marked unhealthy"
                        );
                    } else {
                        debug!(key.id = key.id, failure_count = key.failure_count, "Recorded key failure");
                    }
                }
                None => debug!(key.id = id, "Failure recorded for a key that no longer exists"),
            });
        NonFatal::from(result)
    }

    /// Restores every unhealthy key whose last failure is at least `cooldown` old.
    pub async fn recover_unhealthy(&self, cooldown: Duration) -> Result<u64> {
        let cutoff = chrono::Duration::from_std(cooldown)
            .ok()
            .and_then(|c| Utc::now().checked_sub_signed(c))
            .ok_or_else(|| {
                AppError::validation(
                    "cooldown",
                    format!("cooldown of {}s is out of range", cooldown.as_secs()),
                )
            })?;
        let restored = self.store.recover_unhealthy(cutoff).await?;
        if restored > 0 {
            metrics::record_recoveries(restored);
            info!(restored, "Recovered unhealthy API keys");
        }
        Ok(restored)
    }

    pub async fn add(&self, secret: &str) -> Result<KeySummary> {
        let secret = secret.trim();
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(AppError::malformed(format!(
                "Invalid API key format: expected at least {MIN_SECRET_LEN} characters"
            )));
        }
        let key = self.store.insert_key(secret, Utc::now()).await?;
        info!(key.id = key.id, key.preview = %key.preview(), "Added API key");
        Ok(KeySummary::from(&key))
    }

    /// All keys in creation order with masked secrets.
    pub async fn list(&self) -> Result<Vec<KeySummary>> {
        let keys = self.store.list_keys().await?;
        Ok(keys.iter().map(KeySummary::from).collect())
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<KeySummary> {
        let key = self
            .store
            .set_active(id, active)
            .await?
            .ok_or_else(|| key_not_found(id))?;
        info!(key.id = id, active, "Updated API key status");
        Ok(KeySummary::from(&key))
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self.store.delete_key(id).await? {
            return Err(key_not_found(id));
        }
        info!(key.id = id, "Deleted API key");
        Ok(())
    }

    pub async fn health(&self) -> Result<PoolHealth> {
        let keys = self.list().await?;
        let mut stats = HealthCounts {
            total: keys.len(),
            ..HealthCounts::default()
        };
        for key in &keys {
            match (key.is_active, key.is_healthy) {
                (true, true) => {
                    stats.active += 1;
                    stats.healthy += 1;
                }
                (true, false) => {
                    stats.active += 1;
                    stats.unhealthy += 1;
                }
                (false, _) => stats.disabled += 1,
            }
        }
        Ok(PoolHealth {
            stats,
            keys,
            timestamp: Utc::now().timestamp(),
        })
    }

    /// Runs [`KeyManager::recover_unhealthy`] with the configured cooldown on a fixed period.
    /// Returns `None` when the interval is configured as zero.
    pub fn spawn_recovery_task(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.policy.recovery_interval_secs;
        if period == 0 {
            info!("Background key recovery disabled");
            return None;
        }

        let manager = Arc::clone(self);
        let cooldown = self.policy.cooldown();
        info!(period_secs = period, cooldown_secs = cooldown.as_secs(), "Starting background key recovery");
        Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(period));
            loop {
                ticker.tick().await;
                if let Err(e) = manager.recover_unhealthy(cooldown).await {
                    error!(error = %e, "Background key recovery failed");
                }
            }
        }))
    }
}

fn key_not_found(id: i64) -> AppError {
    AppError::NotFound {
        entity: "API key",
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn manager() -> KeyManager {
        KeyManager::new(Arc::new(InMemoryStore::new()), PoolConfig::default())
    }

    #[tokio::test]
    async fn test_add_trims_and_validates_secret() {
        let pool = manager();
        let err = pool.add("  short  ").await.unwrap_err();
        assert_eq!(err.kind(), "malformed_request");

        let added = pool.add("  AIzaSyValidKey12345  ").await.unwrap();
        assert_eq!(added.key_preview, "AIzaSyVa...2345");
        assert!(added.is_active && added.is_healthy);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let pool = manager();
        assert_eq!(pool.set_active(9, false).await.unwrap_err().kind(), "not_found");
        assert_eq!(pool.delete(9).await.unwrap_err().kind(), "not_found");
    }

    #[tokio::test]
    async fn test_out_of_range_cooldown_is_an_error() {
        let pool = manager();
        pool.add("AIzaSyValidKey12345").await.unwrap();

        // Representable as a chrono delta, but not subtractable from now.
        let overflowing = Duration::from_secs(i64::MAX as u64 / 1_000);
        assert_eq!(pool.recover_unhealthy(overflowing).await.unwrap_err().kind(), "validation");
        assert_eq!(
            pool.recover_unhealthy(Duration::from_secs(u64::MAX)).await.unwrap_err().kind(),
            "validation"
        );
    }

    #[tokio::test]
    async fn test_seed_only_populates_empty_store() {
        let pool = manager();
        let seeds = vec!["AIzaSySeedKey00001".to_string(), "bad".to_string()];
        assert_eq!(pool.seed(&seeds).await.unwrap(), 1);
        assert_eq!(pool.seed(&seeds).await.unwrap(), 0);
        assert_eq!(pool.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_counts() {
        let pool = KeyManager::new(
            Arc::new(InMemoryStore::new()),
            PoolConfig {
                failure_threshold: 1,
                ..PoolConfig::default()
            },
        );
        let a = pool.add("AIzaSyKeyNumber0001").await.unwrap();
        let b = pool.add("AIzaSyKeyNumber0002").await.unwrap();
        pool.add("AIzaSyKeyNumber0003").await.unwrap();
        pool.record_failure(a.id).await.log("test");
        pool.set_active(b.id, false).await.unwrap();

        let health = pool.health().await.unwrap();
        assert_eq!(
            health.stats,
            HealthCounts {
                total: 3,
                active: 2,
                healthy: 1,
                unhealthy: 1,
                disabled: 1,
            }
        );
    }
}
