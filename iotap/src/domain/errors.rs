//! Structured error types for iotap
//!
//! Using thiserror for automatic Display implementation and error chaining.

use iotap_common::DecodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TapError {
    #[error("Probe object not found: {0}")]
    ObjectNotFound(String),

    #[error("Failed to load probe object {path}: {error}")]
    ObjectLoadFailed { path: String, error: String },

    #[error("Program {0} not found in probe object")]
    ProgramNotFound(String),

    #[error("Failed to attach {program} to syscalls/{tracepoint}: {error}")]
    ProbeAttachFailed { program: String, tracepoint: String, error: String },

    #[error("No probe could be attached")]
    NothingAttached,

    #[error("Map {0} not found in probe object")]
    MapNotFound(&'static str),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),

    #[error(transparent)]
    Program(#[from] aya::programs::ProgramError),
}

/// A ring buffer record that does not decode to an event
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Malformed {len}-byte record: {reason}")]
pub struct RecordError {
    pub len: usize,
    pub reason: DecodeError,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid PID {0}: must be a positive process id")]
    InvalidPid(i32),

    #[error("Invalid label '{0}': expected key:value")]
    InvalidLabel(String),

    #[error("Duplicate label key '{0}'")]
    DuplicateLabel(String),

    #[error("Ring capacity must be non-zero")]
    ZeroCapacity,

    #[error("Ring capacity {0} bytes is too large (max {max})", max = crate::config::MAX_RING_BYTES)]
    CapacityTooLarge(u64),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write report file: {0}")]
    WriteFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Invalid push gateway URL {url}: {reason}")]
    InvalidGateway { url: String, reason: String },

    #[error("Label {0:?} cannot be pushed: not a Prometheus label name, or reserved")]
    InvalidMetricLabel(String),

    #[error(transparent)]
    Metrics(#[from] prometheus::Error),

    #[error("Push to gateway failed: {0}")]
    Push(#[from] reqwest::Error),
}
