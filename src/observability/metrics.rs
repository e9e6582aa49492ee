//! Prometheus metrics.

use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Handle to the installed Prometheus recorder.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders the current metrics snapshot in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder as the global metrics recorder.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_prometheus() -> Result<MetricsHandle> {
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::operation("install_metrics_recorder", e))?;
    Ok(MetricsHandle { prometheus })
}

/// Records a storage operation counter and latency histogram.
///
/// # Arguments
///
/// * `store` - Store name (e.g., "state", "archive")
/// * `operation` - Operation name (e.g., "save_job", "upsert_checkpoint")
/// * `start` - Operation start time from `Instant::now()`
/// * `status` - Operation status ("success" or "error")
pub fn record_storage_operation(
    store: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "store" => store,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "store" => store,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder_is_noop() {
        record_storage_operation("state", "save_job", Instant::now(), "success");
        record_storage_operation("archive", "put_record", Instant::now(), "error");
    }
}
