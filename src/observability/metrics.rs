//! Local atomic counters for decisions and executions.

use std::sync::atomic::{AtomicU64, Ordering};

use super::events::{SettledOutcome, TelemetryError, TelemetryEvent, TelemetrySink};
use crate::permissions::ApprovalOutcome;

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Simple histogram using fixed buckets.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    bucket_bounds: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bucket_bounds: Vec<f64>) -> Self {
        let buckets = (0..=bucket_bounds.len())
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            buckets,
            bucket_bounds,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn default_latency() -> Self {
        Self::new(vec![
            10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0, 120000.0, 600000.0,
        ])
    }

    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .bucket_bounds
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.bucket_bounds.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    /// Sum in the original unit (ms). Stored scaled by 1000x internally.
    pub fn sum_ms(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::default_latency()
    }
}

/// Counters fed from telemetry events. Register it as a sink.
#[derive(Debug, Default)]
pub struct GateMetrics {
    pub decisions_total: Counter,
    pub auto_approved: Counter,
    pub auto_rejected: Counter,
    pub user_approved: Counter,
    pub user_rejected: Counter,
    pub rules_persisted: Counter,
    pub bypass_approvals: Counter,
    pub executions_total: Counter,
    pub executions_succeeded: Counter,
    pub executions_failed: Counter,
    pub executions_aborted: Counter,
    pub executions_timed_out: Counter,
    pub termination_failures: Counter,
    pub execution_latency_ms: Histogram,
}

impl GateMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, outcome: ApprovalOutcome, persisted: bool) {
        self.decisions_total.inc();
        match outcome {
            ApprovalOutcome::AutoApprove => self.auto_approved.inc(),
            ApprovalOutcome::AutoReject => self.auto_rejected.inc(),
            ApprovalOutcome::UserApproved => self.user_approved.inc(),
            ApprovalOutcome::UserRejected => self.user_rejected.inc(),
            ApprovalOutcome::Prompt => {}
        }
        if persisted {
            self.rules_persisted.inc();
        }
    }

    pub fn record_execution(&self, outcome: SettledOutcome, duration_ms: u64) {
        self.executions_total.inc();
        match outcome {
            SettledOutcome::Succeeded => self.executions_succeeded.inc(),
            SettledOutcome::Aborted => self.executions_aborted.inc(),
            SettledOutcome::TimedOut => self.executions_timed_out.inc(),
            SettledOutcome::TerminationFailed => self.termination_failures.inc(),
            SettledOutcome::Failed
            | SettledOutcome::NotPermitted
            | SettledOutcome::UnknownTool
            | SettledOutcome::SpawnFailed => self.executions_failed.inc(),
        }
        self.execution_latency_ms.observe(duration_ms as f64);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary::from_metrics(self)
    }
}

impl TelemetrySink for GateMetrics {
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        match event {
            TelemetryEvent::DecisionTaken {
                outcome,
                persisted_scope,
                ..
            } => self.record_decision(*outcome, persisted_scope.is_some()),
            TelemetryEvent::BypassApproved { .. } => self.bypass_approvals.inc(),
            TelemetryEvent::ExecutionSettled {
                outcome,
                duration_ms,
                ..
            } => self.record_execution(*outcome, *duration_ms),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    pub decisions: u64,
    pub approved: u64,
    pub rejected: u64,
    pub prompted: u64,
    pub bypass_approvals: u64,
    pub executions: u64,
    pub failed_executions: u64,
    pub interrupted_executions: u64,
    pub avg_latency_ms: f64,
}

impl MetricsSummary {
    pub fn from_metrics(metrics: &GateMetrics) -> Self {
        let count = metrics.execution_latency_ms.count();
        let avg_latency = if count > 0 {
            metrics.execution_latency_ms.sum_ms() / count as f64
        } else {
            0.0
        };

        Self {
            decisions: metrics.decisions_total.get(),
            approved: metrics.auto_approved.get() + metrics.user_approved.get(),
            rejected: metrics.auto_rejected.get() + metrics.user_rejected.get(),
            prompted: metrics.user_approved.get() + metrics.user_rejected.get(),
            bypass_approvals: metrics.bypass_approvals.get(),
            executions: metrics.executions_total.get(),
            failed_executions: metrics.executions_failed.get(),
            interrupted_executions: metrics.executions_aborted.get()
                + metrics.executions_timed_out.get()
                + metrics.termination_failures.get(),
            avg_latency_ms: avg_latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::RequestId;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        assert_eq!(counter.get(), 1);
        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::new(vec![10.0, 50.0, 100.0]);
        hist.observe(5.0);
        hist.observe(25.0);
        hist.observe(75.0);
        hist.observe(150.0);
        assert_eq!(hist.count(), 4);
        assert_eq!(hist.bucket_counts(), vec![1, 1, 1, 1]);
        assert_eq!(hist.sum_ms(), 255.0);
    }

    #[test]
    fn test_metrics_from_events() {
        let metrics = GateMetrics::new();
        let id = RequestId::new();

        metrics
            .emit(&TelemetryEvent::DecisionTaken {
                request_id: id,
                tool_name: "Bash".into(),
                mode: Default::default(),
                outcome: ApprovalOutcome::UserApproved,
                reason: "operator decision".into(),
                persisted_scope: Some(crate::config::ScopeLevel::Local),
                timestamp: chrono::Utc::now(),
            })
            .unwrap();
        metrics
            .emit(&TelemetryEvent::bypass(id, "Bash", None))
            .unwrap();
        metrics.record_execution(SettledOutcome::TimedOut, 100);
        metrics.record_execution(SettledOutcome::Succeeded, 300);

        let summary = metrics.summary();
        assert_eq!(summary.decisions, 1);
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.prompted, 1);
        assert_eq!(summary.bypass_approvals, 1);
        assert_eq!(summary.executions, 2);
        assert_eq!(summary.interrupted_executions, 1);
        assert_eq!(summary.avg_latency_ms, 200.0);
        assert_eq!(metrics.rules_persisted.get(), 1);
    }
}
