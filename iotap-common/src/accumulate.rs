//! # Length Accumulator
//!
//! Turns an operation's arguments into the total number of bytes it names.
//!
//! | path      | reads                                   | can fail |
//! |-----------|-----------------------------------------|----------|
//! | scalar    | nothing                                 | no       |
//! | vectored  | `iovec[0..n]`                           | per descriptor |
//! | message   | header, then `iovec[0..n]`              | header or descriptor |
//! | batch     | per entry: header, then `iovec[0..n]`   | per entry |
//!
//! Every loop runs over a constant range and breaks early, which keeps the
//! same code acceptable to the eBPF verifier. Counts above the bounds are
//! truncated: only the first [`MAX_IOV_SEGMENTS`] descriptors and the first
//! [`MAX_BATCH_ENTRIES`] batch entries are measured.

use crate::reader::{element_addr, DescriptorReader, Fault, MMSGHDR_SIZE};

/// Upper bound on descriptors read per `iovec` array
pub const MAX_IOV_SEGMENTS: usize = 32;

/// Upper bound on entries read per `mmsghdr` batch
pub const MAX_BATCH_ENTRIES: usize = 8;

/// What a descriptor read failure does to the event.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Stop at the failing descriptor, report what was summed before it
    #[default]
    EmitPartial = 0,
    /// Drop the event
    Discard = 1,
}

/// What a failing entry does to a multi-message batch.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// The entry contributes nothing; later entries are still measured
    #[default]
    SkipEntry = 0,
    /// The whole batch produces no event
    AbortBatch = 1,
}

impl FaultPolicy {
    /// Decode from a config global; unknown values fall back to the default
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => FaultPolicy::Discard,
            _ => FaultPolicy::EmitPartial,
        }
    }
}

impl BatchPolicy {
    /// Decode from a config global; unknown values fall back to the default
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => BatchPolicy::AbortBatch,
            _ => BatchPolicy::SkipEntry,
        }
    }
}

/// Both failure policies, as configured at attach time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AccumulatePolicy {
    pub fault: FaultPolicy,
    pub batch: BatchPolicy,
}

/// Clamp a kernel `size_t` length into the event's 32-bit field
#[must_use]
pub fn clamp_len(len: u64) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Scalar path: the length is already an argument
#[must_use]
pub fn scalar_len(len: u64) -> u32 {
    clamp_len(len)
}

/// Vectored path: sum the lengths of `iov[0..count]`.
///
/// # Errors
/// [`Fault`] on the first unreadable descriptor under
/// [`FaultPolicy::Discard`]. Under [`FaultPolicy::EmitPartial`] this never
/// fails.
pub fn vectored_len<R: DescriptorReader>(
    reader: &R,
    iov: u64,
    count: u64,
    policy: FaultPolicy,
) -> Result<u32, Fault> {
    let mut total: u32 = 0;
    for index in 0..MAX_IOV_SEGMENTS {
        if index as u64 >= count {
            break;
        }
        match reader.read_iovec(iov, index) {
            Ok(segment) => total = total.saturating_add(clamp_len(segment.len)),
            Err(fault) => {
                return match policy {
                    FaultPolicy::EmitPartial => Ok(total),
                    FaultPolicy::Discard => Err(fault),
                };
            }
        }
    }
    Ok(total)
}

/// Message-header path: read the header, then measure its `iovec` array.
///
/// # Errors
/// [`Fault`] if the header itself is unreadable (nothing has been summed, so
/// there is nothing partial to report), or per [`vectored_len`].
pub fn message_len<R: DescriptorReader>(
    reader: &R,
    msg: u64,
    policy: FaultPolicy,
) -> Result<u32, Fault> {
    let header = reader.read_msg_iov(msg)?;
    vectored_len(reader, header.iov, header.iovlen, policy)
}

/// Batch path: measure each `mmsghdr` entry independently and add them up.
///
/// # Errors
/// [`Fault`] when an entry fails under [`BatchPolicy::AbortBatch`].
pub fn batch_len<R: DescriptorReader>(
    reader: &R,
    msgvec: u64,
    count: u64,
    policy: AccumulatePolicy,
) -> Result<u32, Fault> {
    let mut total: u32 = 0;
    for entry in 0..MAX_BATCH_ENTRIES {
        if entry as u64 >= count {
            break;
        }
        let contribution = element_addr(msgvec, entry, MMSGHDR_SIZE)
            .and_then(|msg| message_len(reader, msg, policy.fault));
        match contribution {
            Ok(len) => total = total.saturating_add(len),
            Err(fault) => match policy.batch {
                BatchPolicy::SkipEntry => {}
                BatchPolicy::AbortBatch => return Err(fault),
            },
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMemory;

    const IOV: u64 = 0x10_000;
    const BUFS: u64 = 0x20_000;

    fn memory_with_iovecs(lens: &[u64]) -> FakeMemory {
        let mut mem = FakeMemory::new();
        mem.put_iovecs(IOV, BUFS, lens);
        mem
    }

    #[test]
    fn test_scalar_len_clamps() {
        assert_eq!(scalar_len(100), 100);
        assert_eq!(scalar_len(u64::MAX), u32::MAX);
    }

    #[test]
    fn test_vectored_sums_all_readable_descriptors() {
        let mem = memory_with_iovecs(&[50, 75]);
        assert_eq!(vectored_len(&mem, IOV, 2, FaultPolicy::EmitPartial), Ok(125));
    }

    #[test]
    fn test_vectored_zero_count() {
        let mem = FakeMemory::new();
        assert_eq!(vectored_len(&mem, IOV, 0, FaultPolicy::Discard), Ok(0));
    }

    #[test]
    fn test_vectored_partial_on_fault() {
        // iov[2] of 4 is unreadable
        let mut mem = memory_with_iovecs(&[10, 20, 30, 40]);
        mem.revoke(IOV + 2 * 16, 16);

        assert_eq!(vectored_len(&mem, IOV, 4, FaultPolicy::EmitPartial), Ok(30));
    }

    #[test]
    fn test_vectored_discard_on_fault() {
        let mut mem = memory_with_iovecs(&[10, 20, 30, 40]);
        mem.revoke(IOV + 2 * 16, 16);

        assert_eq!(vectored_len(&mem, IOV, 4, FaultPolicy::Discard), Err(Fault));
    }

    #[test]
    fn test_vectored_first_descriptor_fault_emits_zero() {
        let mem = FakeMemory::new();
        assert_eq!(vectored_len(&mem, IOV, 3, FaultPolicy::EmitPartial), Ok(0));
    }

    #[test]
    fn test_vectored_count_is_bounded() {
        let lens = [1u64; MAX_IOV_SEGMENTS + 8];
        let mem = memory_with_iovecs(&lens);
        let total = vectored_len(&mem, IOV, lens.len() as u64, FaultPolicy::Discard);
        assert_eq!(total, Ok(MAX_IOV_SEGMENTS as u32));
    }

    #[test]
    fn test_vectored_saturates() {
        let mem = memory_with_iovecs(&[u64::from(u32::MAX), 10]);
        assert_eq!(vectored_len(&mem, IOV, 2, FaultPolicy::Discard), Ok(u32::MAX));
    }

    #[test]
    fn test_message_len_follows_header() {
        let mut mem = FakeMemory::new();
        mem.put_message(0x1000, IOV, BUFS, &[10, 20, 30]);
        assert_eq!(message_len(&mem, 0x1000, FaultPolicy::EmitPartial), Ok(60));
    }

    #[test]
    fn test_message_header_fault() {
        let mem = FakeMemory::new();
        assert_eq!(message_len(&mem, 0x1000, FaultPolicy::EmitPartial), Err(Fault));
    }

    fn batch_memory() -> FakeMemory {
        let mut mem = FakeMemory::new();
        mem.put_batch(0x1000, 0x40_000, &[&[10, 20], &[30], &[40, 50]]);
        mem
    }

    #[test]
    fn test_batch_sums_entries() {
        let mem = batch_memory();
        assert_eq!(batch_len(&mem, 0x1000, 3, AccumulatePolicy::default()), Ok(150));
    }

    #[test]
    fn test_batch_skip_entry_on_header_fault() {
        let mut mem = batch_memory();
        mem.revoke(0x1000 + MMSGHDR_SIZE as u64, MMSGHDR_SIZE as u64);

        let policy = AccumulatePolicy { fault: FaultPolicy::EmitPartial, batch: BatchPolicy::SkipEntry };
        assert_eq!(batch_len(&mem, 0x1000, 3, policy), Ok(120));
    }

    #[test]
    fn test_batch_abort_on_header_fault() {
        let mut mem = batch_memory();
        mem.revoke(0x1000 + MMSGHDR_SIZE as u64, MMSGHDR_SIZE as u64);

        let policy = AccumulatePolicy { fault: FaultPolicy::EmitPartial, batch: BatchPolicy::AbortBatch };
        assert_eq!(batch_len(&mem, 0x1000, 3, policy), Err(Fault));
    }

    #[test]
    fn test_batch_descriptor_fault_under_each_policy() {
        // Second descriptor of entry 0 is unreadable
        let mut mem = batch_memory();
        let entry0_iov = mem.batch_iov_addr(0x40_000, 0);
        mem.revoke(entry0_iov + 16, 16);

        let partial_skip = AccumulatePolicy::default();
        assert_eq!(batch_len(&mem, 0x1000, 3, partial_skip), Ok(10 + 30 + 90));

        let discard_skip =
            AccumulatePolicy { fault: FaultPolicy::Discard, batch: BatchPolicy::SkipEntry };
        assert_eq!(batch_len(&mem, 0x1000, 3, discard_skip), Ok(30 + 90));

        let discard_abort =
            AccumulatePolicy { fault: FaultPolicy::Discard, batch: BatchPolicy::AbortBatch };
        assert_eq!(batch_len(&mem, 0x1000, 3, discard_abort), Err(Fault));
    }

    #[test]
    fn test_batch_count_is_bounded() {
        let mut mem = FakeMemory::new();
        let entries: [&[u64]; MAX_BATCH_ENTRIES + 2] = [&[1]; MAX_BATCH_ENTRIES + 2];
        mem.put_batch(0x1000, 0x40_000, &entries);
        assert_eq!(
            batch_len(&mem, 0x1000, entries.len() as u64, AccumulatePolicy::default()),
            Ok(MAX_BATCH_ENTRIES as u32)
        );
    }

    #[test]
    fn test_policies_decode_from_raw() {
        assert_eq!(FaultPolicy::from_raw(1), FaultPolicy::Discard);
        assert_eq!(FaultPolicy::from_raw(7), FaultPolicy::EmitPartial);
        assert_eq!(BatchPolicy::from_raw(1), BatchPolicy::AbortBatch);
        assert_eq!(BatchPolicy::from_raw(0), BatchPolicy::SkipEntry);
    }
}
