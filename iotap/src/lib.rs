//! # iotap - per-process syscall I/O accounting
//!
//! iotap attaches one syscall-entry tracepoint per I/O operation kind
//! (`read`, `write`, `readv`, `writev`, `recvfrom`, `sendto`, `recvmsg`,
//! `sendmsg`, `recvmmsg`, `sendmmsg`, `recv`, `send`), keeps only the calls
//! made by the target process and reports how many bytes each kind asked to
//! move.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                 Target process (any language)                 │
//! └───────────────────────┬───────────────────────────────────────┘
//!                         │ syscalls
//!                         ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │               eBPF probes (iotap-ebpf, kernel)                │
//! │  filter by TGID → reserve → read args → accumulate → commit   │
//! └───────────┬───────────────────────────────────┬───────────────┘
//!             │ EVENTS ring (stream)              │ COUNTERS (counters)
//!             ▼                                   ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        iotap (this crate)                     │
//! │  ┌────────────┐   ┌────────────────┐   ┌──────────────────┐   │
//! │  │   probes   │──▶│ EventAggregator│──▶│  export (JSON)   │   │
//! │  └────────────┘   └────────────────┘   └──────────────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The measuring pipeline itself lives in `iotap-common` so the probes and
//! the hosted tests run the same code.
//!
//! ## Module Structure
//!
//! - [`cli`]: Command-line arguments
//! - [`config`]: Validated run configuration ([`config::TapConfig`]), ring sizing
//! - [`domain`]: `Pid`, exit reasons and the error types
//! - [`probes`]: Load/attach, `EVENTS`/`COUNTERS` consumption, diagnostics
//! - [`export`]: The end-of-run JSON report
//! - [`preflight`]: Privilege, kernel and target checks before loading
//! - [`process_lookup`]: Resolve a process name to a PID
//!
//! ## Typical Usage
//!
//! ```bash
//! cargo xtask build-ebpf
//! sudo ./target/release/iotap --pid <PID> --export report.json -L case:baseline
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod preflight;
pub mod process_lookup;
pub mod probes;
