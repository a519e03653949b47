// src/metrics.rs

//! Prometheus counters for the proxy and the key pool.
//!
//! With the `metrics` feature disabled every recorder is a no-op and
//! `/metrics` reports that exporting is unavailable.

#[cfg(feature = "metrics")]
mod prometheus {
    use crate::error::{AppError, Result};
    use metrics::{counter, histogram};
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
    use once_cell::sync::OnceCell;
    use std::time::Duration;

    static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

    /// Installs the global recorder once per process.
    pub fn initialize_metrics() -> Result<()> {
        HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .map_err(|e| AppError::internal(format!("failed to install Prometheus recorder: {e}")))
            })
            .map(|_| ())
    }

    pub fn render() -> Option<String> {
        HANDLE.get().map(PrometheusHandle::render)
    }

    pub fn record_request(route: &'static str, outcome: &'static str, status: u16, elapsed: Duration) {
        counter!(
            "keypool_proxy_requests_total",
            "route" => route,
            "outcome" => outcome,
            "status" => status.to_string()
        )
        .increment(1);
        histogram!("keypool_proxy_request_duration_seconds", "route" => route)
            .record(elapsed.as_secs_f64());
    }

    pub fn record_key_selected() {
        counter!("keypool_key_selections_total").increment(1);
    }

    pub fn record_capacity_exhausted() {
        counter!("keypool_capacity_exhausted_total").increment(1);
    }

    pub fn record_key_failure(tripped: bool) {
        counter!("keypool_key_failures_total").increment(1);
        if tripped {
            counter!("keypool_circuit_trips_total").increment(1);
        }
    }

    pub fn record_recoveries(restored: u64) {
        counter!("keypool_key_recoveries_total").increment(restored);
    }
}

#[cfg(not(feature = "metrics"))]
mod prometheus {
    use crate::error::Result;
    use std::time::Duration;

    pub fn initialize_metrics() -> Result<()> {
        Ok(())
    }

    pub fn render() -> Option<String> {
        None
    }

    pub fn record_request(_route: &'static str, _outcome: &'static str, _status: u16, _elapsed: Duration) {}

    pub fn record_key_selected() {}

    pub fn record_capacity_exhausted() {}

    pub fn record_key_failure(_tripped: bool) {}

    pub fn record_recoveries(_restored: u64) {}
}

pub use prometheus::*;
