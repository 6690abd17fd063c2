//! Probe management and event consumption
//!
//! - eBPF object loading and tracepoint attachment
//! - Ring buffer record aggregation
//! - Counter and diagnostic map readers
//! - Summary display

pub mod consumer;
pub mod counters;
pub mod diagnostics;
pub mod display;
pub mod ebpf_setup;

pub use consumer::{EventAggregator, KindTotals};
pub use counters::read_counters;
pub use diagnostics::{print_probe_diagnostics, read_probe_stats, ProbeStats};
pub use display::{display_statistics, display_summary};
pub use ebpf_setup::{attach_probes, init_ebpf_logger, load_ebpf_program, AttachSummary};
