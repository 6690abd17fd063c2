//! Core of the iotap I/O probes, shared by the kernel programs and the
//! userspace loader.
//!
//! Everything in here is `no_std`, allocation free and uses loops bounded by
//! constants, so the same code runs inside an eBPF program and in ordinary
//! tests. Hosted-only pieces ([`ring`], [`counters`]) are compiled out for
//! the BPF target.
//!
//! ## Modules
//!
//! - [`kind`]: operation kinds and the dispatch table
//! - [`filter`]: target process gate
//! - [`reader`]: remote memory access and descriptor layouts
//! - [`accumulate`]: byte length of scalar, vectored, message and batch calls
//! - [`event`]: the 6-byte wire record
//! - [`transport`]: reserve/write/commit/discard protocol
//! - [`pipeline`]: the handler every probe runs
//! - [`config`]: names and values shared with the loader

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod accumulate;
pub mod config;
pub mod event;
pub mod filter;
pub mod kind;
pub mod pipeline;
pub mod reader;
pub mod transport;

#[cfg(not(target_arch = "bpf"))]
pub mod counters;
#[cfg(not(target_arch = "bpf"))]
pub mod ring;

#[cfg(any(test, feature = "std"))]
pub mod testing;

pub use accumulate::{AccumulatePolicy, BatchPolicy, FaultPolicy};
pub use event::{DecodeError, IoEvent, EVENT_SIZE};
pub use filter::TargetFilter;
pub use kind::{ArgShape, OperationKind, KIND_COUNT};
pub use pipeline::{handle, Outcome, ProbeConfig, ProbeStat, SyscallArgs};
pub use reader::{DescriptorReader, Fault};
pub use transport::{EventTransport, KindCounters, ReservedWindow, Saturated, TransportMode};

#[cfg(feature = "user")]
use aya::Pod;

// Read straight out of the COUNTERS map as plain bytes
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for KindCounters {}
