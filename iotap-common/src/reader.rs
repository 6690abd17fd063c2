//! # Descriptor Reader
//!
//! Reads from the monitored process's address space. The memory belongs to
//! someone else and may be unmapped, protected, or rewritten at any moment,
//! so every read can fail with [`Fault`] and every successful read is only a
//! snapshot. Callers never retry.
//!
//! Kernel probes implement [`DescriptorReader`] over `bpf_probe_read_user`;
//! hosted code and tests implement it over whatever memory model they have.
//!
//! ## Layouts (64-bit)
//!
//! ```text
//! struct iovec        { void *iov_base; size_t iov_len; }              16 bytes
//! struct user_msghdr  { name(8) namelen(4)+pad(4) iov(8) iovlen(8)
//!                       control(8) controllen(8) flags(4)+pad(4) }     56 bytes
//! struct mmsghdr      { user_msghdr msg_hdr; unsigned msg_len; pad }   64 bytes
//! ```

/// Size of `struct iovec`
pub const IOVEC_SIZE: usize = 16;

/// Size of `struct user_msghdr`
pub const MSGHDR_SIZE: usize = 56;

/// Offset of `msg_iov` within `struct user_msghdr` (followed by `msg_iovlen`)
pub const MSGHDR_IOV_OFFSET: usize = 16;

/// Size of `struct mmsghdr` (array stride of a batch)
pub const MMSGHDR_SIZE: usize = 64;

/// A read of the monitored process's memory failed.
///
/// Carries no detail on purpose: unmapped, protected and concurrently freed
/// memory are all handled the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fault;

/// One contiguous buffer in the monitored process (`struct iovec`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct IoVec {
    pub base: u64,
    pub len: u64,
}

impl IoVec {
    #[must_use]
    pub fn from_ne_bytes(bytes: [u8; IOVEC_SIZE]) -> Self {
        let (base, len) = split_words(bytes);
        Self { base, len }
    }

    #[must_use]
    pub fn to_ne_bytes(self) -> [u8; IOVEC_SIZE] {
        join_words(self.base, self.len)
    }
}

/// The descriptor-array part of a message header: where the `iovec` array
/// lives and how many entries it claims to have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MsgIov {
    pub iov: u64,
    pub iovlen: u64,
}

impl MsgIov {
    #[must_use]
    pub fn from_ne_bytes(bytes: [u8; 16]) -> Self {
        let (iov, iovlen) = split_words(bytes);
        Self { iov, iovlen }
    }

    #[must_use]
    pub fn to_ne_bytes(self) -> [u8; 16] {
        join_words(self.iov, self.iovlen)
    }
}

fn split_words(bytes: [u8; 16]) -> (u64, u64) {
    let mut lo = [0u8; 8];
    let mut hi = [0u8; 8];
    lo.copy_from_slice(&bytes[..8]);
    hi.copy_from_slice(&bytes[8..]);
    (u64::from_ne_bytes(lo), u64::from_ne_bytes(hi))
}

fn join_words(a: u64, b: u64) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&a.to_ne_bytes());
    out[8..].copy_from_slice(&b.to_ne_bytes());
    out
}

/// Capability to read the monitored process's memory.
pub trait DescriptorReader {
    /// Fill `out` with the bytes at `addr` in the monitored process.
    ///
    /// # Errors
    /// [`Fault`] if any byte of the range is unreadable. `out` contents are
    /// unspecified after a fault.
    fn read_bytes(&self, addr: u64, out: &mut [u8]) -> Result<(), Fault>;

    /// Read `iov[index]` of the array at `array`
    ///
    /// # Errors
    /// [`Fault`] if the descriptor is unreadable or the address overflows.
    fn read_iovec(&self, array: u64, index: usize) -> Result<IoVec, Fault> {
        let addr = element_addr(array, index, IOVEC_SIZE)?;
        let mut raw = [0u8; IOVEC_SIZE];
        self.read_bytes(addr, &mut raw)?;
        Ok(IoVec::from_ne_bytes(raw))
    }

    /// Read the `(msg_iov, msg_iovlen)` pair of the message header at `msg`
    ///
    /// # Errors
    /// [`Fault`] if the header is unreadable or the address overflows.
    fn read_msg_iov(&self, msg: u64) -> Result<MsgIov, Fault> {
        let addr = msg.checked_add(MSGHDR_IOV_OFFSET as u64).ok_or(Fault)?;
        let mut raw = [0u8; 16];
        self.read_bytes(addr, &mut raw)?;
        Ok(MsgIov::from_ne_bytes(raw))
    }
}

/// Address of element `index` of an array of `stride`-byte elements
///
/// # Errors
/// [`Fault`] when the computation overflows; such an address can never be
/// read anyway.
pub fn element_addr(base: u64, index: usize, stride: usize) -> Result<u64, Fault> {
    (index as u64)
        .checked_mul(stride as u64)
        .and_then(|offset| base.checked_add(offset))
        .ok_or(Fault)
}
