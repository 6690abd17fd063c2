//! Domain model for iotap
//!
//! Newtypes for the values that cross module boundaries and the structured
//! errors every layer below `main` returns.

pub mod errors;
pub mod types;

pub use types::{ExitReason, Pid};

pub use errors::{ConfigError, ExportError, RecordError, TapError};
