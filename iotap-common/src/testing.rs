//! In-memory stand-in for a monitored process's address space.
//!
//! Used by unit tests here and by the `iotap` integration tests. Memory is a
//! sparse byte map; any byte not written (or later revoked) faults, which is
//! how tests model unmapped or freed buffers.

use std::collections::HashMap;

use crate::reader::{
    DescriptorReader, Fault, IoVec, MsgIov, MMSGHDR_SIZE, MSGHDR_IOV_OFFSET, MSGHDR_SIZE,
};

/// Spacing between per-entry `iovec` arrays laid out by [`FakeMemory::put_batch`]
pub const BATCH_IOV_STRIDE: u64 = 0x1000;

#[derive(Debug, Default, Clone)]
pub struct FakeMemory {
    bytes: HashMap<u64, u8>,
}

impl FakeMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, addr: u64, data: &[u8]) {
        for (offset, byte) in (0u64..).zip(data) {
            self.bytes.insert(addr + offset, *byte);
        }
    }

    /// Make `[addr, addr + len)` unreadable
    pub fn revoke(&mut self, addr: u64, len: u64) {
        for a in addr..addr + len {
            self.bytes.remove(&a);
        }
    }

    /// Lay out an `iovec` array at `array` whose buffers start at `bufs`
    pub fn put_iovecs(&mut self, array: u64, bufs: u64, lens: &[u64]) {
        let mut base = bufs;
        let mut raw = Vec::with_capacity(lens.len() * 16);
        for len in lens {
            raw.extend_from_slice(&IoVec { base, len: *len }.to_ne_bytes());
            base += len;
        }
        self.put(array, &raw);
    }

    /// Lay out a message header at `msg` pointing to an `iovec` array at `array`
    pub fn put_message(&mut self, msg: u64, array: u64, bufs: u64, lens: &[u64]) {
        self.put_header(msg, array, lens.len() as u64, MSGHDR_SIZE);
        self.put_iovecs(array, bufs, lens);
    }

    /// Lay out an `mmsghdr` array at `msgvec`, one entry per slice in
    /// `entries`. Entry `i` gets its `iovec` array at
    /// [`batch_iov_addr(iovs, i)`](Self::batch_iov_addr).
    pub fn put_batch(&mut self, msgvec: u64, iovs: u64, entries: &[&[u64]]) {
        for (index, lens) in entries.iter().enumerate() {
            let entry = msgvec + (index * MMSGHDR_SIZE) as u64;
            let array = self.batch_iov_addr(iovs, index);
            self.put_header(entry, array, lens.len() as u64, MMSGHDR_SIZE);
            self.put_iovecs(array, array + BATCH_IOV_STRIDE / 2, lens);
        }
    }

    /// Where [`put_batch`](Self::put_batch) placed entry `index`'s `iovec` array
    #[must_use]
    pub fn batch_iov_addr(&self, iovs: u64, index: usize) -> u64 {
        iovs + index as u64 * BATCH_IOV_STRIDE
    }

    fn put_header(&mut self, at: u64, array: u64, iovlen: u64, size: usize) {
        let mut raw = std::vec![0u8; size];
        raw[MSGHDR_IOV_OFFSET..MSGHDR_IOV_OFFSET + 16]
            .copy_from_slice(&MsgIov { iov: array, iovlen }.to_ne_bytes());
        self.put(at, &raw);
    }
}

impl DescriptorReader for FakeMemory {
    fn read_bytes(&self, addr: u64, out: &mut [u8]) -> Result<(), Fault> {
        for (offset, slot) in (0u64..).zip(out.iter_mut()) {
            let at = addr.checked_add(offset).ok_or(Fault)?;
            *slot = *self.bytes.get(&at).ok_or(Fault)?;
        }
        Ok(())
    }
}
