//! Explicit destination for reported metrics.
//!
//! Callers that want metrics recorded somewhere pass a sink handle; nothing
//! in the crate reports to an ambient global run.

use tracing::info;

use super::MetricsRecord;

pub trait MetricsSink {
    fn log_metric(&mut self, key: &str, value: f64);

    /// Log every field of `record`, each key prefixed with `prefix`.
    fn log_record(&mut self, prefix: &str, record: &MetricsRecord) {
        for (name, value) in record.entries() {
            self.log_metric(&format!("{prefix}{name}"), value);
        }
    }
}

/// Emits each metric as an `info` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn log_metric(&mut self, key: &str, value: f64) {
        info!(metric = key, value, "metric");
    }
}

/// Keeps logged metrics in memory, in logging order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub metrics: Vec<(String, f64)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent value logged under `key`.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.metrics
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }
}

impl MetricsSink for RecordingSink {
    fn log_metric(&mut self, key: &str, value: f64) {
        self.metrics.push((key.to_string(), value));
    }
}
