use aya::maps::PerCpuArray;
use aya::Ebpf;
use iotap_common::config::MAP_PROBE_STATS;
use iotap_common::pipeline::PROBE_STAT_COUNT;
use iotap_common::ProbeStat;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::TapError;

/// Outcome counts for the target's calls, from `PROBE_STATS`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStats {
    counts: [u64; PROBE_STAT_COUNT],
}

impl ProbeStats {
    #[must_use]
    pub fn from_counts(counts: [u64; PROBE_STAT_COUNT]) -> Self {
        Self { counts }
    }

    #[must_use]
    pub fn get(&self, stat: ProbeStat) -> u64 {
        self.counts[stat.index() as usize]
    }

    /// Events the probes wanted to emit but could not
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.get(ProbeStat::Saturated)
            + self.get(ProbeStat::Faulted)
            + self.get(ProbeStat::MissingArgument)
    }

    /// Keyed by a stable snake-case name, for the JSON report
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, u64> {
        ProbeStat::ALL.iter().map(|stat| (stat_key(*stat).to_string(), self.get(*stat))).collect()
    }
}

impl Serialize for ProbeStats {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

fn stat_key(stat: ProbeStat) -> &'static str {
    match stat {
        ProbeStat::Admitted => "admitted",
        ProbeStat::Emitted => "emitted",
        ProbeStat::Saturated => "saturated",
        ProbeStat::Faulted => "faulted",
        ProbeStat::MissingArgument => "missing_argument",
    }
}

/// Read `PROBE_STATS`, summing every CPU's slot
///
/// # Errors
/// Returns an error if the map is missing or a slot cannot be read
pub fn read_probe_stats(bpf: &Ebpf) -> Result<ProbeStats, TapError> {
    let map: PerCpuArray<_, u64> = PerCpuArray::try_from(
        bpf.map(MAP_PROBE_STATS).ok_or(TapError::MapNotFound(MAP_PROBE_STATS))?,
    )?;
    let mut counts = [0u64; PROBE_STAT_COUNT];
    for stat in ProbeStat::ALL {
        counts[stat.index() as usize] = sum_cpus(&map.get(&stat.index(), 0)?);
    }
    Ok(ProbeStats::from_counts(counts))
}

fn sum_cpus(per_cpu: &[u64]) -> u64 {
    per_cpu.iter().fold(0, |total, n| total.saturating_add(*n))
}

/// Print probe outcome counters
///
/// Helps tell apart "the target did no I/O" (nothing admitted) from
/// "events were lost" (saturated / faulted).
pub fn print_probe_diagnostics(stats: &ProbeStats) {
    eprintln!("\nprobe diagnostics:");
    for stat in ProbeStat::ALL {
        eprintln!("   - {:<28} {}", stat.label(), stats.get(stat));
    }
    if stats.get(ProbeStat::Admitted) == 0 {
        eprintln!("   (no call from the target reached a probe: is it doing any I/O?)");
    }
}
