use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crate::config::{batch_policy_name, fault_policy_name, transport_name, TapConfig};
use crate::domain::{ExitReason, ExportError};
use crate::probes::{EventAggregator, KindTotals, ProbeStats};

/// Totals for one operation kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindReport {
    pub kind: String,
    pub tag: u16,
    #[serde(flatten)]
    pub totals: KindTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapReport {
    pub pid: u32,
    pub transport: String,
    pub fault_policy: String,
    pub batch_policy: String,
    /// Kernel ring size actually used
    pub ring_bytes: u32,
    pub duration_secs: f64,
    pub exit_reason: String,
    pub labels: BTreeMap<String, String>,
    pub total_events: u64,
    pub total_bytes: u64,
    pub malformed_records: u64,
    /// Only kinds with at least one call
    pub kinds: Vec<KindReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_stats: Option<BTreeMap<String, u64>>,
}

impl TapReport {
    #[must_use]
    pub fn build(
        config: &TapConfig,
        aggregator: &EventAggregator,
        probe_stats: Option<&ProbeStats>,
        elapsed: Duration,
        exit_reason: ExitReason,
    ) -> Self {
        Self {
            pid: config.pid.0,
            transport: transport_name(config.transport).to_string(),
            fault_policy: fault_policy_name(config.policy.fault).to_string(),
            batch_policy: batch_policy_name(config.policy.batch).to_string(),
            ring_bytes: config.ring_bytes,
            duration_secs: elapsed.as_secs_f64(),
            exit_reason: exit_reason.to_string(),
            labels: config.report_labels(),
            total_events: aggregator.total_events(),
            total_bytes: aggregator.total_bytes(),
            malformed_records: aggregator.malformed(),
            kinds: aggregator
                .active()
                .map(|(kind, totals)| KindReport {
                    kind: kind.name().to_string(),
                    tag: kind.tag(),
                    totals,
                })
                .collect(),
            probe_stats: probe_stats.map(ProbeStats::to_map),
        }
    }

    /// Write the report as pretty-printed JSON
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails
    pub fn export<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Create `path` and write the report into it
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written
    pub fn save(&self, path: &Path) -> Result<(), ExportError> {
        let file = File::create(path)
            .map_err(|e| ExportError::WriteFailed(format!("{}: {e}", path.display())))?;
        self.export(BufWriter::new(file))
    }
}
