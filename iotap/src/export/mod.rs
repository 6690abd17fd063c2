//! Report export
//!
//! A run ends with a [`TapReport`]: the configuration that produced it, the
//! per-kind totals and the probe diagnostics. It is printed as a summary and
//! optionally written as JSON. The same totals can be pushed to a Prometheus
//! push gateway, grouped by the run's labels.

pub mod push;
pub mod report;

pub use push::{grouping_url, push_metrics, RunMetrics};
pub use report::{KindReport, TapReport};
