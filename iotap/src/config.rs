//! Validated run configuration
//!
//! [`TapConfig`] is built once from the command line and is the only thing
//! the loader, the consumer loop and the report read. Everything that can be
//! wrong with the arguments is rejected here, before any probe is loaded.

#![allow(unsafe_code)] // sysconf() requires unsafe

use iotap_common::config::ProbeLogLevel;
use iotap_common::{AccumulatePolicy, BatchPolicy, FaultPolicy, TransportMode};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cli::Args;
use crate::domain::{ConfigError, Pid};

/// Where `cargo xtask build-ebpf` leaves the probe object
pub const DEFAULT_OBJECT_PATH: &str = "target/bpfel-unknown-none/release/iotap";

/// Largest ring we will ask the kernel for
pub const MAX_RING_BYTES: u64 = 1 << 30;

/// A `key:value` pair attached to the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl FromStr for Label {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once(':').ok_or_else(|| ConfigError::InvalidLabel(s.into()))?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(ConfigError::InvalidLabel(s.into()));
        }
        Ok(Label { key: key.into(), value: value.into() })
    }
}

#[derive(Debug, Clone)]
pub struct TapConfig {
    pub pid: Pid,
    pub object: PathBuf,
    pub transport: TransportMode,
    pub policy: AccumulatePolicy,
    /// Kernel ring size, already rounded
    pub ring_bytes: u32,
    pub log_level: ProbeLogLevel,
    pub verifier_log: bool,
    pub duration: Option<Duration>,
    pub labels: Vec<Label>,
}

impl TapConfig {
    /// Validate the command line for an already resolved target.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for duplicate labels or an unusable capacity.
    pub fn from_args(args: &Args, pid: Pid) -> Result<Self, ConfigError> {
        let mut seen = BTreeSet::new();
        for label in &args.labels {
            if !seen.insert(label.key.as_str()) {
                return Err(ConfigError::DuplicateLabel(label.key.clone()));
            }
        }

        Ok(Self {
            pid,
            object: args.object.clone(),
            transport: args.transport.into(),
            policy: AccumulatePolicy {
                fault: args.fault_policy.into(),
                batch: args.batch_policy.into(),
            },
            ring_bytes: kernel_ring_size(args.capacity, page_size())?,
            log_level: args.bpf_log.into(),
            verifier_log: args.verifier_log,
            duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
            labels: args.labels.clone(),
        })
    }

    /// Built-in labels, overridden by user labels with the same key
    #[must_use]
    pub fn report_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("transport".to_string(), transport_name(self.transport).to_string());
        labels.insert("bpf_log".to_string(), log_level_name(self.log_level).to_string());
        labels.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        labels.extend(self.labels.iter().map(|l| (l.key.clone(), l.value.clone())));
        labels
    }
}

/// Size of a `BPF_MAP_TYPE_RINGBUF` holding at least `requested` bytes.
///
/// The kernel wants a power of two that is a multiple of the page size; any
/// power of two at least one page long is both.
///
/// # Errors
/// [`ConfigError::ZeroCapacity`] or [`ConfigError::CapacityTooLarge`].
pub fn kernel_ring_size(requested: u64, page: u64) -> Result<u32, ConfigError> {
    if requested == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    if requested > MAX_RING_BYTES {
        return Err(ConfigError::CapacityTooLarge(requested));
    }
    let size = requested.max(page).next_power_of_two();
    u32::try_from(size).map_err(|_| ConfigError::CapacityTooLarge(requested))
}

/// System page size, 4 KiB if it cannot be queried
#[must_use]
pub fn page_size() -> u64 {
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(raw).ok().filter(|p| p.is_power_of_two()).unwrap_or(4096)
}

#[must_use]
pub fn transport_name(mode: TransportMode) -> &'static str {
    match mode {
        TransportMode::Stream => "stream",
        TransportMode::Counters => "counters",
    }
}

#[must_use]
pub fn fault_policy_name(policy: FaultPolicy) -> &'static str {
    match policy {
        FaultPolicy::EmitPartial => "emit-partial",
        FaultPolicy::Discard => "discard",
    }
}

#[must_use]
pub fn batch_policy_name(policy: BatchPolicy) -> &'static str {
    match policy {
        BatchPolicy::SkipEntry => "skip-entry",
        BatchPolicy::AbortBatch => "abort-batch",
    }
}

#[must_use]
pub fn log_level_name(level: ProbeLogLevel) -> &'static str {
    match level {
        ProbeLogLevel::Off => "off",
        ProbeLogLevel::Error => "error",
        ProbeLogLevel::Debug => "debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_size_rounds_to_power_of_two_pages() {
        assert_eq!(kernel_ring_size(1, 4096), Ok(4096));
        assert_eq!(kernel_ring_size(4096, 4096), Ok(4096));
        assert_eq!(kernel_ring_size(5000, 4096), Ok(8192));
        assert_eq!(kernel_ring_size(256 * 1024, 4096), Ok(256 * 1024));
        assert_eq!(kernel_ring_size(100, 65536), Ok(65536));
    }

    #[test]
    fn test_ring_size_rejects_out_of_range() {
        assert_eq!(kernel_ring_size(0, 4096), Err(ConfigError::ZeroCapacity));
        assert_eq!(
            kernel_ring_size(MAX_RING_BYTES + 1, 4096),
            Err(ConfigError::CapacityTooLarge(MAX_RING_BYTES + 1))
        );
    }

    #[test]
    fn test_label_parsing() {
        let label: Label = " case : tls-1.3 ".parse().unwrap();
        assert_eq!(label, Label { key: "case".into(), value: "tls-1.3".into() });
        assert!("novalue".parse::<Label>().is_err());
        assert!(":x".parse::<Label>().is_err());
        assert!("x:".parse::<Label>().is_err());
    }

    #[test]
    fn test_label_value_may_contain_colons() {
        let label: Label = "url:http://host:8080".parse().unwrap();
        assert_eq!(label.value, "http://host:8080");
    }

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
    }
}
