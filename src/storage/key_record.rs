// src/storage/key_record.rs

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

/// Minimum accepted length of a key secret, after trimming.
pub const MIN_SECRET_LEN: usize = 10;

/// One credential in the pool together with its circuit-breaker state.
#[derive(Debug)]
pub struct KeyRecord {
    pub id: i64,
    pub secret: Secret<String>,
    /// Operator-controlled toggle.
    pub active: bool,
    /// System-controlled; cleared by the circuit breaker.
    pub healthy: bool,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Clone for KeyRecord {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            secret: Secret::new(self.secret.expose_secret().clone()),
            active: self.active,
            healthy: self.healthy,
            failure_count: self.failure_count,
            last_used_at: self.last_used_at,
            last_failure_at: self.last_failure_at,
            created_at: self.created_at,
        }
    }
}

impl KeyRecord {
    pub fn new(id: i64, secret: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            secret: Secret::new(secret),
            active: true,
            healthy: true,
            failure_count: 0,
            last_used_at: None,
            last_failure_at: None,
            created_at: now,
        }
    }

    /// A key may be handed out only while it is both active and healthy.
    pub fn is_eligible(&self) -> bool {
        self.active && self.healthy
    }

    /// Increments the failure counter and trips the breaker once it reaches `threshold`.
    pub fn record_failure(&mut self, threshold: u32, now: DateTime<Utc>) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_at = Some(now);
        self.healthy = self.failure_count < threshold;
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.last_failure_at = None;
        self.healthy = true;
    }

    /// True when the key is quarantined and its last failure is at or before `cutoff`.
    pub fn is_recoverable(&self, cutoff: DateTime<Utc>) -> bool {
        !self.healthy && self.last_failure_at.is_some_and(|at| at <= cutoff)
    }

    pub fn recover(&mut self) {
        self.healthy = true;
        self.failure_count = 0;
    }

    /// Prefix/suffix preview of the secret, safe for logs and API responses.
    pub fn preview(&self) -> String {
        mask_secret(self.secret.expose_secret())
    }
}

/// Masks a secret as `first8...last4`, or `***` when it is too short to preview safely.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 12 {
        return "***".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// One upstream attempt made with a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub key_id: i64,
    pub success: bool,
    /// Upstream HTTP status; absent when no response was received.
    pub status_code: Option<u16>,
    pub created_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(key_id: i64, success: bool, status_code: Option<u16>) -> Self {
        Self {
            key_id,
            success,
            status_code,
            created_at: Utc::now(),
        }
    }
}
