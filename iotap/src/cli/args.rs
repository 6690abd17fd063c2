//! CLI argument definitions

use clap::{Parser, ValueEnum};
use iotap_common::config::{ProbeLogLevel, DEFAULT_RING_BYTES};
use iotap_common::{BatchPolicy, FaultPolicy, TransportMode};
use std::path::PathBuf;

use crate::config::{Label, DEFAULT_OBJECT_PATH};

#[derive(Parser)]
#[command(
    name = "iotap",
    about = "Measure the I/O syscalls of a running process",
    after_help = "\
EXAMPLES:
    sudo iotap my-server                               Auto-detect PID
    sudo iotap --pid 1234 --duration 30                Stop after 30 seconds
    sudo iotap --pid 1234 --transport counters         Per-kind totals only
    sudo iotap my-server --export run.json -L case:tls Save a labelled report
    sudo iotap my-server --push-gateway http://gw:9091 Publish totals to Prometheus"
)]
pub struct Args {
    /// Process name to monitor (auto-detects PID)
    #[arg(value_name = "PROCESS")]
    pub process: Option<String>,

    /// Process ID to monitor
    #[arg(short, long)]
    pub pid: Option<i32>,

    /// Compiled probe object
    #[arg(long, value_name = "PATH", default_value = DEFAULT_OBJECT_PATH)]
    pub object: PathBuf,

    /// How probes hand events to userspace
    #[arg(long, value_enum, default_value_t = TransportArg::Stream)]
    pub transport: TransportArg,

    /// What an unreadable buffer descriptor does to an event
    #[arg(long, value_enum, default_value_t = FaultPolicyArg::EmitPartial)]
    pub fault_policy: FaultPolicyArg,

    /// What a failing entry does to a sendmmsg/recvmmsg batch
    #[arg(long, value_enum, default_value_t = BatchPolicyArg::SkipEntry)]
    pub batch_policy: BatchPolicyArg,

    /// Event ring size in bytes (rounded up to a power-of-two page multiple)
    #[arg(long, value_name = "BYTES", default_value_t = u64::from(DEFAULT_RING_BYTES))]
    pub capacity: u64,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Export a JSON report to file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Prometheus push gateway to publish the per-kind totals to
    #[arg(long, value_name = "URL", env = "IOTAP_PUSH_GATEWAY")]
    pub push_gateway: Option<String>,

    /// Label copied into the report and the pushed metrics (repeatable)
    #[arg(short = 'L', long = "label", value_name = "KEY:VALUE")]
    pub labels: Vec<Label>,

    /// In-probe diagnostics forwarded through aya-log
    #[arg(long, value_enum, default_value_t = BpfLogArg::Off)]
    pub bpf_log: BpfLogArg,

    /// Print the verifier log when loading probes
    #[arg(long)]
    pub verifier_log: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    /// One record per operation through the ring buffer
    Stream,
    /// Per-kind totals updated in place
    Counters,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FaultPolicyArg {
    /// Report what was summed before the fault
    EmitPartial,
    /// Drop the event
    Discard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BatchPolicyArg {
    /// Failing entries contribute nothing
    SkipEntry,
    /// Any failing entry drops the batch
    AbortBatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BpfLogArg {
    Off,
    Error,
    Debug,
}

impl From<TransportArg> for TransportMode {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stream => TransportMode::Stream,
            TransportArg::Counters => TransportMode::Counters,
        }
    }
}

impl From<FaultPolicyArg> for FaultPolicy {
    fn from(arg: FaultPolicyArg) -> Self {
        match arg {
            FaultPolicyArg::EmitPartial => FaultPolicy::EmitPartial,
            FaultPolicyArg::Discard => FaultPolicy::Discard,
        }
    }
}

impl From<BatchPolicyArg> for BatchPolicy {
    fn from(arg: BatchPolicyArg) -> Self {
        match arg {
            BatchPolicyArg::SkipEntry => BatchPolicy::SkipEntry,
            BatchPolicyArg::AbortBatch => BatchPolicy::AbortBatch,
        }
    }
}

impl From<BpfLogArg> for ProbeLogLevel {
    fn from(arg: BpfLogArg) -> Self {
        match arg {
            BpfLogArg::Off => ProbeLogLevel::Off,
            BpfLogArg::Error => ProbeLogLevel::Error,
            BpfLogArg::Debug => ProbeLogLevel::Debug,
        }
    }
}
