//! Scatter metrics
//!
//! Thin wrappers over the `metrics` facade. The library never installs a
//! recorder; without one every call is a no-op. Binaries call
//! [`install_prometheus`] once at startup.

use crate::options::Mode;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and register metric descriptions
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    ScatterMetrics::register_metrics();
    Ok(handle)
}

/// Scatter metrics collector
#[derive(Debug, Clone, Copy, Default)]
pub struct ScatterMetrics;

impl ScatterMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Describe every scatter metric to the installed recorder
    fn register_metrics() {
        describe_counter!(
            "scatter_calls_total",
            Unit::Count,
            "Scatter operations started"
        );
        describe_counter!(
            "scatter_shard_ops_total",
            Unit::Count,
            "Per-shard operations dispatched"
        );
        describe_histogram!(
            "scatter_shard_op_duration_seconds",
            Unit::Seconds,
            "Time spent in a single per-shard operation"
        );
        describe_counter!(
            "scatter_handle_constructions_total",
            Unit::Count,
            "Shard handle constructions"
        );
        describe_counter!(
            "scatter_partitions_skipped_total",
            Unit::Count,
            "Partitions never contacted because the limit was reached"
        );
        describe_counter!(
            "scatter_merge_degraded_total",
            Unit::Count,
            "Shard set merges that fell back to unsorted rows"
        );
        describe_counter!(
            "scatter_errors_total",
            Unit::Count,
            "Scatter operations that failed"
        );
    }

    pub fn record_call(&self, op: &'static str, mode: Mode) {
        counter!("scatter_calls_total", "op" => op, "mode" => mode.as_str()).increment(1);
    }

    pub fn record_shard_op(&self, op: &'static str, duration: Duration, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        counter!("scatter_shard_ops_total", "op" => op, "outcome" => outcome).increment(1);
        histogram!("scatter_shard_op_duration_seconds", "op" => op)
            .record(duration.as_secs_f64());
    }

    pub fn record_construction(&self, mode: Mode, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        counter!(
            "scatter_handle_constructions_total",
            "mode" => mode.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }

    pub fn record_partitions_skipped(&self, op: &'static str, count: usize) {
        counter!("scatter_partitions_skipped_total", "op" => op).increment(count as u64);
    }

    pub fn record_merge_degraded(&self) {
        counter!("scatter_merge_degraded_total").increment(1);
    }

    pub fn record_error(&self, error_type: &'static str) {
        counter!("scatter_errors_total", "error_type" => error_type).increment(1);
    }
}
