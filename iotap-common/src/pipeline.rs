//! # Handler Pipeline
//!
//! The one code path every probe runs, whatever the kind:
//!
//! ```text
//! enter ─▶ filter ──mismatch──▶ FilteredOut
//!            │
//!            ▼
//!         reserve ──full──────▶ Discarded(Saturated)
//!            │
//!            ▼
//!      extract args ──missing─▶ Discarded(MissingArgument)   (window discarded)
//!            │
//!            ▼
//!       accumulate ──fault────▶ Discarded(Fault)             (window discarded)
//!            │
//!            ▼
//!      encode, write, commit ─▶ Emitted
//! ```
//!
//! The window is reserved before any remote memory is touched so that a
//! saturated transport costs no reads. Everything the pipeline needs from
//! its surroundings comes in through three traits: [`SyscallArgs`],
//! [`DescriptorReader`] and [`EventTransport`].

use crate::accumulate::{batch_len, message_len, scalar_len, vectored_len, AccumulatePolicy};
use crate::accumulate::{BatchPolicy, FaultPolicy};
use crate::event::IoEvent;
use crate::filter::TargetFilter;
use crate::kind::{ArgShape, OperationKind};
use crate::reader::{DescriptorReader, Fault};
use crate::transport::{EventTransport, ReservedWindow};

/// Raw syscall arguments of the current invocation
pub trait SyscallArgs {
    /// Argument `slot`, or `None` if it could not be read
    fn arg(&self, slot: usize) -> Option<u64>;
}

impl<const N: usize> SyscallArgs for [u64; N] {
    fn arg(&self, slot: usize) -> Option<u64> {
        self.get(slot).copied()
    }
}

/// Everything a probe is configured with at attach time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ProbeConfig {
    pub target: TargetFilter,
    pub policy: AccumulatePolicy,
}

impl ProbeConfig {
    /// Build from the raw read-only globals
    #[must_use]
    pub const fn from_raw(tgid: u32, fault_policy: u8, batch_policy: u8) -> Self {
        Self {
            target: TargetFilter::new(tgid),
            policy: AccumulatePolicy {
                fault: FaultPolicy::from_raw(fault_policy),
                batch: BatchPolicy::from_raw(batch_policy),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// Transport full
    Saturated,
    /// A syscall argument could not be read
    MissingArgument,
    /// Remote memory fault, dropped per policy
    Fault,
}

/// How one invocation ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    FilteredOut,
    Emitted(IoEvent),
    Discarded(DiscardReason),
}

impl Outcome {
    /// `PROBE_STATS` slot this outcome is counted under. Filtered-out calls
    /// belong to other processes and are not counted at all.
    #[must_use]
    pub const fn stat(&self) -> Option<ProbeStat> {
        Some(match self {
            Outcome::FilteredOut => return None,
            Outcome::Emitted(_) => ProbeStat::Emitted,
            Outcome::Discarded(DiscardReason::Saturated) => ProbeStat::Saturated,
            Outcome::Discarded(DiscardReason::Fault) => ProbeStat::Faulted,
            Outcome::Discarded(DiscardReason::MissingArgument) => ProbeStat::MissingArgument,
        })
    }
}

/// Indices into the per-CPU `PROBE_STATS` map
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeStat {
    /// Calls made by the target (passed the filter)
    Admitted = 0,
    Emitted = 1,
    Saturated = 2,
    Faulted = 3,
    MissingArgument = 4,
}

pub const PROBE_STAT_COUNT: usize = 5;

impl ProbeStat {
    pub const ALL: [ProbeStat; PROBE_STAT_COUNT] = [
        ProbeStat::Admitted,
        ProbeStat::Emitted,
        ProbeStat::Saturated,
        ProbeStat::Faulted,
        ProbeStat::MissingArgument,
    ];

    #[must_use]
    pub const fn index(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ProbeStat::Admitted => "admitted",
            ProbeStat::Emitted => "emitted",
            ProbeStat::Saturated => "dropped (ring full)",
            ProbeStat::Faulted => "dropped (memory fault)",
            ProbeStat::MissingArgument => "dropped (missing argument)",
        }
    }
}

/// Why [`measure`] produced no length
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeasureError {
    MissingArgument,
    Fault,
}

impl From<Fault> for MeasureError {
    fn from(_: Fault) -> Self {
        MeasureError::Fault
    }
}

/// Total byte length named by one invocation's arguments.
///
/// # Errors
/// [`MeasureError::MissingArgument`] if a slot named by `shape` is
/// unreadable, [`MeasureError::Fault`] if the accumulator drops the event.
pub fn measure<A, R>(
    shape: ArgShape,
    args: &A,
    reader: &R,
    policy: AccumulatePolicy,
) -> Result<u32, MeasureError>
where
    A: SyscallArgs + ?Sized,
    R: DescriptorReader,
{
    let arg = |slot| args.arg(slot).ok_or(MeasureError::MissingArgument);
    let len = match shape {
        ArgShape::Scalar { len } => scalar_len(arg(len)?),
        ArgShape::Vectored { iov, count } => {
            vectored_len(reader, arg(iov)?, arg(count)?, policy.fault)?
        }
        ArgShape::Message { msg } => message_len(reader, arg(msg)?, policy.fault)?,
        ArgShape::Batch { msgvec, count } => batch_len(reader, arg(msgvec)?, arg(count)?, policy)?,
    };
    Ok(len)
}

/// Run one invocation of the probe for `kind` end to end.
pub fn handle<A, R, T>(
    kind: OperationKind,
    pid_tgid: u64,
    config: &ProbeConfig,
    args: &A,
    reader: &R,
    transport: &T,
) -> Outcome
where
    A: SyscallArgs + ?Sized,
    R: DescriptorReader,
    T: EventTransport,
{
    if !config.target.admits(pid_tgid) {
        return Outcome::FilteredOut;
    }

    let Ok(mut window) = transport.reserve_event(kind) else {
        return Outcome::Discarded(DiscardReason::Saturated);
    };

    match measure(kind.shape(), args, reader, config.policy) {
        Ok(len) => {
            let event = IoEvent::new(kind, len);
            window.write(&event.encode());
            window.commit();
            Outcome::Emitted(event)
        }
        Err(err) => {
            window.discard();
            Outcome::Discarded(match err {
                MeasureError::MissingArgument => DiscardReason::MissingArgument,
                MeasureError::Fault => DiscardReason::Fault,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterTable;
    use crate::event::EVENT_SIZE;
    use crate::filter::pid_tgid;
    use crate::ring::RingBuffer;
    use crate::testing::FakeMemory;
    use crate::transport::{KindCounters, Saturated};

    const TARGET: u32 = 4242;
    const OTHER: u32 = 777;

    const IOV: u64 = 0x10_000;
    const MSG: u64 = 0x30_000;
    const MSG_IOV: u64 = 0x31_000;

    /// Room for 40 six-byte records
    type Ring = RingBuffer<120>;

    fn config() -> ProbeConfig {
        ProbeConfig::from_raw(TARGET, 0, 0)
    }

    fn drain(ring: &Ring) -> Vec<IoEvent> {
        ring.consumer()
            .unwrap()
            .map(|record| IoEvent::decode(record.as_bytes()).unwrap())
            .collect()
    }

    /// `write(fd, _, 100)`, `writev(fd, [50, 75], 2)`, `sendmsg(fd, {[10, 20, 30]}, 0)`
    fn scenario_memory() -> FakeMemory {
        let mut mem = FakeMemory::new();
        mem.put_iovecs(IOV, 0x20_000, &[50, 75]);
        mem.put_message(MSG, MSG_IOV, 0x32_000, &[10, 20, 30]);
        mem
    }

    fn run_scenario<T: EventTransport>(caller: u32, mem: &FakeMemory, transport: &T) {
        let who = pid_tgid(caller, caller + 1);
        handle(OperationKind::Write, who, &config(), &[3_u64, 0x5000, 100], mem, transport);
        handle(OperationKind::Writev, who, &config(), &[3_u64, IOV, 2], mem, transport);
        handle(OperationKind::SendMsg, who, &config(), &[3_u64, MSG, 0], mem, transport);
    }

    #[test]
    fn test_end_to_end_stream() {
        let ring = Ring::new();
        run_scenario(TARGET, &scenario_memory(), &ring);

        assert_eq!(
            drain(&ring),
            vec![
                IoEvent::new(OperationKind::Write, 100),
                IoEvent::new(OperationKind::Writev, 125),
                IoEvent::new(OperationKind::SendMsg, 60),
            ]
        );
    }

    #[test]
    fn test_unrelated_process_contributes_nothing() {
        let ring = Ring::new();
        run_scenario(OTHER, &scenario_memory(), &ring);
        assert!(drain(&ring).is_empty());
    }

    #[test]
    fn test_end_to_end_counters() {
        let table = CounterTable::new();
        let mem = scenario_memory();
        run_scenario(TARGET, &mem, &table);
        run_scenario(OTHER, &mem, &table);

        assert_eq!(table.get(OperationKind::Write), KindCounters { calls: 1, bytes: 100 });
        assert_eq!(table.get(OperationKind::Writev), KindCounters { calls: 1, bytes: 125 });
        assert_eq!(table.get(OperationKind::SendMsg), KindCounters { calls: 1, bytes: 60 });
        assert_eq!(table.get(OperationKind::Read), KindCounters::default());
    }

    #[test]
    fn test_filter_soundness_interleaved() {
        let ring = Ring::new();
        let mem = FakeMemory::new();
        let mut expected = Vec::new();
        for i in 0..30u64 {
            let caller = if i % 3 == 0 { TARGET } else { OTHER };
            let outcome = handle(
                OperationKind::Read,
                pid_tgid(caller, 1),
                &config(),
                &[0_u64, 0, i],
                &mem,
                &ring,
            );
            if caller == TARGET {
                expected.push(IoEvent::new(OperationKind::Read, i as u32));
                assert!(matches!(outcome, Outcome::Emitted(_)));
            } else {
                assert_eq!(outcome, Outcome::FilteredOut);
            }
        }
        assert_eq!(drain(&ring), expected);
    }

    #[test]
    fn test_zero_target_admits_nothing() {
        let ring = Ring::new();
        let config = ProbeConfig::from_raw(0, 0, 0);
        let outcome =
            handle(OperationKind::Write, pid_tgid(0, 0), &config, &[1_u64, 2, 3], &FakeMemory::new(), &ring);
        assert_eq!(outcome, Outcome::FilteredOut);
        assert!(drain(&ring).is_empty());
    }

    #[test]
    fn test_vectored_fault_under_each_policy() {
        let mut mem = FakeMemory::new();
        mem.put_iovecs(IOV, 0x20_000, &[10, 20, 30, 40]);
        mem.revoke(IOV + 2 * 16, 16);
        let who = pid_tgid(TARGET, TARGET);

        let ring = Ring::new();
        let partial = handle(OperationKind::Readv, who, &config(), &[0_u64, IOV, 4], &mem, &ring);
        assert_eq!(partial, Outcome::Emitted(IoEvent::new(OperationKind::Readv, 30)));

        let discard = ProbeConfig::from_raw(TARGET, FaultPolicy::Discard as u8, 0);
        let dropped = handle(OperationKind::Readv, who, &discard, &[0_u64, IOV, 4], &mem, &ring);
        assert_eq!(dropped, Outcome::Discarded(DiscardReason::Fault));

        assert_eq!(drain(&ring), vec![IoEvent::new(OperationKind::Readv, 30)]);
    }

    #[test]
    fn test_batch_failure_under_each_policy() {
        let mut mem = FakeMemory::new();
        mem.put_batch(0x1000, 0x40_000, &[&[10, 20], &[30], &[40, 50]]);
        mem.revoke(0x1000 + 64, 64);
        let who = pid_tgid(TARGET, TARGET);
        let args = [5_u64, 0x1000, 3, 0];

        let ring = Ring::new();
        let skip = handle(OperationKind::SendMmsg, who, &config(), &args, &mem, &ring);
        assert_eq!(skip, Outcome::Emitted(IoEvent::new(OperationKind::SendMmsg, 120)));

        let abort = ProbeConfig::from_raw(TARGET, 0, BatchPolicy::AbortBatch as u8);
        let aborted = handle(OperationKind::RecvMmsg, who, &abort, &args, &mem, &ring);
        assert_eq!(aborted, Outcome::Discarded(DiscardReason::Fault));

        assert_eq!(drain(&ring).len(), 1);
    }

    #[test]
    fn test_message_header_fault_is_never_emitted() {
        let ring = Ring::new();
        let outcome = handle(
            OperationKind::RecvMsg,
            pid_tgid(TARGET, TARGET),
            &config(),
            &[0_u64, MSG, 0],
            &FakeMemory::new(),
            &ring,
        );
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::Fault));
        assert!(drain(&ring).is_empty());
    }

    #[test]
    fn test_missing_argument_discards_window() {
        let ring = Ring::new();
        let outcome = handle(
            OperationKind::Writev,
            pid_tgid(TARGET, TARGET),
            &config(),
            &[3_u64, IOV],
            &FakeMemory::new(),
            &ring,
        );
        assert_eq!(outcome, Outcome::Discarded(DiscardReason::MissingArgument));
        // space comes back once the consumer skips the discarded record
        assert!(drain(&ring).is_empty());
        assert_eq!(ring.outstanding_bytes(), 0);
    }

    #[test]
    fn test_saturation_drops_without_reading() {
        // 18 words hold six 3-word records
        let ring = RingBuffer::<18>::new();
        let who = pid_tgid(TARGET, TARGET);
        let mem = FakeMemory::new();

        for len in 0..6 {
            let outcome = handle(OperationKind::Write, who, &config(), &[0_u64, 0, len], &mem, &ring);
            assert!(matches!(outcome, Outcome::Emitted(_)));
        }
        let overflow = handle(OperationKind::Write, who, &config(), &[0_u64, 0, 6], &mem, &ring);

        assert_eq!(overflow, Outcome::Discarded(DiscardReason::Saturated));
        assert_eq!(overflow.stat(), Some(ProbeStat::Saturated));
    }

    /// Fails the test if anything tries to reserve
    struct RefusingTransport;

    struct NoWindow;

    impl ReservedWindow for NoWindow {
        fn write(&mut self, _: &[u8; EVENT_SIZE]) {}
        fn commit(self) {}
        fn discard(self) {}
    }

    impl EventTransport for RefusingTransport {
        type Window<'a>
            = NoWindow
        where
            Self: 'a;

        fn reserve_event(&self, kind: OperationKind) -> Result<NoWindow, Saturated> {
            panic!("{kind} reserved for a filtered-out call");
        }
    }

    #[test]
    fn test_filtered_out_call_never_reserves() {
        let mem = scenario_memory();
        for kind in OperationKind::ALL {
            let args = [3_u64, IOV, 2, 0];
            let outcome =
                handle(kind, pid_tgid(OTHER, OTHER), &config(), &args, &mem, &RefusingTransport);
            assert_eq!(outcome, Outcome::FilteredOut);
            assert_eq!(outcome.stat(), None);
        }
    }
}
