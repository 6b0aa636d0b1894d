pub mod analyzer;
pub mod logger;

use crate::history::{HistoryBuffer, LogEntry, Severity};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Aggregate derived values at one point in simulated time. Everything
/// here is recomputed per tick from configuration, node state, and elapsed
/// time; nothing is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub tick: u64,
    pub throughput: f64,
    pub latency: f64,
    pub error_rate: f64,
    pub cpu_utilization: f64,
    pub memory_usage: f64,
    pub system_load: f64,
    pub cache_hit_ratio: f64,
    pub data_processed: f64,
    pub compression_ratio: f64,
}

impl MetricSnapshot {
    pub fn zero(tick: u64) -> Self {
        Self {
            tick,
            throughput: 0.0,
            latency: 0.0,
            error_rate: 0.0,
            cpu_utilization: 0.0,
            memory_usage: 0.0,
            system_load: 0.0,
            cache_hit_ratio: 0.0,
            data_processed: 0.0,
            compression_ratio: 0.0,
        }
    }
}

#[derive(Debug)]
struct MetricsInner {
    snapshots: HistoryBuffer<MetricSnapshot>,
    logs: HistoryBuffer<LogEntry>,
}

/// Cloneable handle over the run's bounded metric and log history. The tick
/// handler is the only writer; everyone else reads copies.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

impl MetricsCollector {
    pub fn new(metric_capacity: usize, log_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                snapshots: HistoryBuffer::new(metric_capacity),
                logs: HistoryBuffer::new(log_capacity),
            })),
        }
    }

    pub fn record(&self, snapshot: MetricSnapshot) {
        self.inner.write().snapshots.push(snapshot);
    }

    pub fn log(&self, tick: u64, severity: Severity, message: impl Into<String>) {
        self.inner
            .write()
            .logs
            .push(LogEntry::new(tick, severity, message));
    }

    pub fn latest(&self) -> Option<MetricSnapshot> {
        self.inner.read().snapshots.latest().cloned()
    }

    pub fn history(&self) -> Vec<MetricSnapshot> {
        self.inner.read().snapshots.to_vec()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.inner.read().logs.to_vec()
    }

    pub fn snapshot_count(&self) -> usize {
        self.inner.read().snapshots.len()
    }

    /// Clears both buffers for a fresh run.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.snapshots.clear();
        inner.logs.clear();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(30, 15)
    }
}
