//! Telemetry for permission decisions and tool executions.
//!
//! Events are fire-and-forget: a failing sink is logged and skipped, never
//! affecting the decision or execution that produced the event.
//!
//! ## Features
//!
//! - **TracingSink**: structured `tracing` records, including the bypass audit log
//! - **GateMetrics**: atomic counters and a latency histogram for local tracking

mod events;
mod metrics;

pub use events::{SettledOutcome, Telemetry, TelemetryError, TelemetryEvent, TelemetrySink, TracingSink};
pub use metrics::{Counter, GateMetrics, Histogram, MetricsSummary};
