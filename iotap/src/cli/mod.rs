//! Command-line interface for iotap
//!
//! This module contains CLI argument parsing and configuration

pub mod args;

pub use args::{Args, BatchPolicyArg, BpfLogArg, FaultPolicyArg, TransportArg};
