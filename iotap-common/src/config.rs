//! Names shared by the probe object and the loader.
//!
//! The loader patches the read-only globals with `EbpfLoader::set_global`
//! before load and looks maps up by name afterwards. Both sides use these
//! constants so a rename cannot silently desynchronize them.

/// `u32` monitored TGID; 0 admits nothing
pub const GLOBAL_TARGET_TGID: &str = "TARGET_TGID";
/// `u8` [`TransportMode`](crate::transport::TransportMode)
pub const GLOBAL_TRANSPORT_MODE: &str = "TRANSPORT_MODE";
/// `u8` [`FaultPolicy`](crate::accumulate::FaultPolicy)
pub const GLOBAL_FAULT_POLICY: &str = "FAULT_POLICY";
/// `u8` [`BatchPolicy`](crate::accumulate::BatchPolicy)
pub const GLOBAL_BATCH_POLICY: &str = "BATCH_POLICY";
/// `u8` [`ProbeLogLevel`]
pub const GLOBAL_LOG_LEVEL: &str = "LOG_LEVEL";

/// Ring buffer of encoded events (stream mode)
pub const MAP_EVENTS: &str = "EVENTS";
/// Per-kind [`KindCounters`](crate::transport::KindCounters) (counters mode)
pub const MAP_COUNTERS: &str = "COUNTERS";
/// Per-outcome `u64` counts, indexed by [`ProbeStat`](crate::pipeline::ProbeStat)
pub const MAP_PROBE_STATS: &str = "PROBE_STATS";

/// Default `EVENTS` size in bytes
pub const DEFAULT_RING_BYTES: u32 = 256 * 1024;

/// Verbosity of in-probe diagnostics.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ProbeLogLevel {
    #[default]
    Off = 0,
    Error = 1,
    Debug = 2,
}

impl ProbeLogLevel {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ProbeLogLevel::Off,
            1 => ProbeLogLevel::Error,
            _ => ProbeLogLevel::Debug,
        }
    }

    #[must_use]
    pub const fn logs_errors(self) -> bool {
        self as u8 >= ProbeLogLevel::Error as u8
    }

    #[must_use]
    pub const fn logs_debug(self) -> bool {
        self as u8 >= ProbeLogLevel::Debug as u8
    }
}
