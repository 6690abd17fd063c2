// Byte counts are converted to floats for display only
#![allow(clippy::cast_precision_loss)]

use crate::export::TapReport;
use crate::probes::EventAggregator;

/// One-line running totals, printed periodically
pub fn display_statistics(aggregator: &EventAggregator) {
    eprintln!(
        "stats: events={} bytes={} malformed={}",
        aggregator.total_events(),
        human_bytes(aggregator.total_bytes()),
        aggregator.malformed()
    );
}

/// End-of-run table
pub fn display_summary(report: &TapReport) {
    eprintln!(
        "\n{}: {:.1}s, {} events, {}",
        report.exit_reason,
        report.duration_secs,
        report.total_events,
        human_bytes(report.total_bytes)
    );
    if report.kinds.is_empty() {
        eprintln!("   no I/O observed");
        return;
    }
    eprintln!("   {:<10} {:>12} {:>14} {:>12}", "kind", "calls", "bytes", "avg");
    for kind in &report.kinds {
        let avg = kind.totals.bytes as f64 / kind.totals.calls.max(1) as f64;
        eprintln!(
            "   {:<10} {:>12} {:>14} {:>12.1}",
            kind.kind, kind.totals.calls, kind.totals.bytes, avg
        );
    }
    if report.malformed_records > 0 {
        eprintln!("   {} malformed records ignored", report.malformed_records);
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
