//! # eBPF Kernel-Side Probes
//!
//! One `syscalls/sys_enter_*` tracepoint program per I/O operation kind. All
//! of them run the shared [`handle`] pipeline from `iotap-common`; the only
//! per-kind input is the [`OperationKind`] passed in.
//!
//! ## Configuration (read-only globals, patched by the loader)
//!
//! - `TARGET_TGID` - monitored process; 0 makes every probe inert
//! - `TRANSPORT_MODE` - 0 stream (`EVENTS`), 1 counters (`COUNTERS`)
//! - `FAULT_POLICY` / `BATCH_POLICY` - accumulator failure handling
//! - `LOG_LEVEL` - 0 off, 1 errors, 2 debug (`aya-log`)
//!
//! ## Maps (Shared with Userspace)
//!
//! - `EVENTS` - Ring buffer of 6-byte `{kind, len}` records
//! - `COUNTERS` - Per-kind `{calls, bytes}` totals
//! - `PROBE_STATS` - Per-CPU outcome counts for the target's calls
//!
//! ## Build
//!
//! ```bash
//! cargo xtask build-ebpf
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use core::sync::atomic::{AtomicU64, Ordering};

use aya_ebpf::{
    helpers::{bpf_get_current_pid_tgid, bpf_probe_read_user_buf},
    macros::{map, tracepoint},
    maps::{ring_buf::RingBufEntry, Array, PerCpuArray, RingBuf},
    programs::TracePointContext,
};
use aya_log_ebpf::{debug, error};
use iotap_common::{
    config::{ProbeLogLevel, DEFAULT_RING_BYTES},
    handle,
    kind::arg_offset,
    pipeline::PROBE_STAT_COUNT,
    DescriptorReader, EventTransport, Fault, IoEvent, KindCounters, OperationKind, Outcome,
    ProbeConfig, ProbeStat, ReservedWindow, Saturated, SyscallArgs, TransportMode, EVENT_SIZE,
    KIND_COUNT,
};

// ============================================================================
// Read-only configuration
// ============================================================================

#[no_mangle]
static TARGET_TGID: u32 = 0;

#[no_mangle]
static TRANSPORT_MODE: u8 = 0;

#[no_mangle]
static FAULT_POLICY: u8 = 0;

#[no_mangle]
static BATCH_POLICY: u8 = 0;

#[no_mangle]
static LOG_LEVEL: u8 = 0;

// Volatile so the compiler cannot fold the defaults above into the code
// before the loader rewrites .rodata
fn probe_config() -> ProbeConfig {
    unsafe {
        ProbeConfig::from_raw(
            core::ptr::read_volatile(&TARGET_TGID),
            core::ptr::read_volatile(&FAULT_POLICY),
            core::ptr::read_volatile(&BATCH_POLICY),
        )
    }
}

fn transport_mode() -> TransportMode {
    TransportMode::from_raw(unsafe { core::ptr::read_volatile(&TRANSPORT_MODE) })
}

fn log_level() -> ProbeLogLevel {
    ProbeLogLevel::from_raw(unsafe { core::ptr::read_volatile(&LOG_LEVEL) })
}

// ============================================================================
// eBPF Maps
// ============================================================================

/// Event stream. Userspace overrides the size at load time.
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(DEFAULT_RING_BYTES, 0);

/// Index = kind tag - 1
#[map]
static COUNTERS: Array<KindCounters> = Array::with_max_entries(KIND_COUNT as u32, 0);

/// Index = [`ProbeStat`]. Per CPU, summed by userspace.
#[map]
static PROBE_STATS: PerCpuArray<u64> = PerCpuArray::with_max_entries(PROBE_STAT_COUNT as u32, 0);

fn bump(stat: ProbeStat) {
    if let Some(slot) = PROBE_STATS.get_ptr_mut(stat.index()) {
        unsafe { *slot += 1 };
    }
}

// ============================================================================
// Pipeline adapters
// ============================================================================

/// Syscall arguments straight out of the tracepoint record
struct TracepointArgs<'a>(&'a TracePointContext);

impl SyscallArgs for TracepointArgs<'_> {
    fn arg(&self, slot: usize) -> Option<u64> {
        unsafe { self.0.read_at::<u64>(arg_offset(slot)) }.ok()
    }
}

/// Reads the calling process's memory
struct UserReader;

impl DescriptorReader for UserReader {
    fn read_bytes(&self, addr: u64, out: &mut [u8]) -> Result<(), Fault> {
        unsafe { bpf_probe_read_user_buf(addr as *const u8, out) }.map_err(|_| Fault)
    }
}

/// `EVENTS` ring buffer
struct StreamTransport;

struct StreamWindow(RingBufEntry<[u8; EVENT_SIZE]>);

impl ReservedWindow for StreamWindow {
    fn write(&mut self, record: &[u8; EVENT_SIZE]) {
        self.0.write(*record);
    }

    fn commit(self) {
        self.0.submit(0);
    }

    fn discard(self) {
        self.0.discard(0);
    }
}

impl EventTransport for StreamTransport {
    type Window<'a>
        = StreamWindow
    where
        Self: 'a;

    fn reserve_event(&self, _kind: OperationKind) -> Result<StreamWindow, Saturated> {
        EVENTS.reserve::<[u8; EVENT_SIZE]>(0).map(StreamWindow).ok_or(Saturated)
    }
}

/// `COUNTERS` array, updated in place
struct CounterTransport;

struct CounterWindow(IoEvent);

impl ReservedWindow for CounterWindow {
    fn write(&mut self, record: &[u8; EVENT_SIZE]) {
        if let Ok(event) = IoEvent::decode(record) {
            self.0 = event;
        }
    }

    fn commit(self) {
        let Some(slot) = COUNTERS.get_ptr_mut(self.0.kind.index() as u32) else {
            return;
        };
        unsafe {
            AtomicU64::from_ptr(core::ptr::addr_of_mut!((*slot).calls))
                .fetch_add(1, Ordering::Relaxed);
            AtomicU64::from_ptr(core::ptr::addr_of_mut!((*slot).bytes))
                .fetch_add(u64::from(self.0.len), Ordering::Relaxed);
        }
    }

    fn discard(self) {}
}

impl EventTransport for CounterTransport {
    type Window<'a>
        = CounterWindow
    where
        Self: 'a;

    fn reserve_event(&self, kind: OperationKind) -> Result<CounterWindow, Saturated> {
        Ok(CounterWindow(IoEvent::new(kind, 0)))
    }
}

// ============================================================================
// eBPF Program Hooks
// ============================================================================

#[inline(always)]
fn tap(ctx: &TracePointContext, kind: OperationKind) -> u32 {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let config = probe_config();
    // Other processes leave before any map is touched
    if !config.target.admits(pid_tgid) {
        return 0;
    }
    bump(ProbeStat::Admitted);

    let args = TracepointArgs(ctx);

    let outcome = match transport_mode() {
        TransportMode::Stream => {
            handle(kind, pid_tgid, &config, &args, &UserReader, &StreamTransport)
        }
        TransportMode::Counters => {
            handle(kind, pid_tgid, &config, &args, &UserReader, &CounterTransport)
        }
    };
    let Some(stat) = outcome.stat() else {
        return 0;
    };
    bump(stat);

    let level = log_level();
    match outcome {
        Outcome::FilteredOut => {}
        Outcome::Emitted(event) => {
            if level.logs_debug() {
                debug!(ctx, "{} len={}", kind.name(), event.len);
            }
        }
        Outcome::Discarded(_) => {
            if level.logs_errors() {
                error!(ctx, "{} dropped: {}", kind.name(), stat.label());
            }
        }
    }
    0
}

#[tracepoint]
pub fn tap_write(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::Write)
}

#[tracepoint]
pub fn tap_read(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::Read)
}

#[tracepoint]
pub fn tap_writev(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::Writev)
}

#[tracepoint]
pub fn tap_readv(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::Readv)
}

#[tracepoint]
pub fn tap_recv(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::Recv)
}

#[tracepoint]
pub fn tap_recvfrom(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::RecvFrom)
}

#[tracepoint]
pub fn tap_recvmsg(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::RecvMsg)
}

#[tracepoint]
pub fn tap_recvmmsg(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::RecvMmsg)
}

#[tracepoint]
pub fn tap_send(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::Send)
}

#[tracepoint]
pub fn tap_sendto(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::SendTo)
}

#[tracepoint]
pub fn tap_sendmsg(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::SendMsg)
}

#[tracepoint]
pub fn tap_sendmmsg(ctx: TracePointContext) -> u32 {
    tap(&ctx, OperationKind::SendMmsg)
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
