//! # Hosted Ring Buffer
//!
//! Fixed-capacity, lock-free ring buffer with the same reserve / write /
//! commit / discard protocol as the kernel's `BPF_MAP_TYPE_RINGBUF`. Any
//! number of producers, one consumer, no allocation, no blocking.
//!
//! ## Layout
//!
//! Storage is `WORDS` 32-bit words. Every record is a header word followed
//! by its payload rounded up to whole words, and never wraps: when a record
//! does not fit before the end of the storage, the producer claims the tail
//! as a padding record and starts at word 0.
//!
//! ```text
//! header word:  bit 31 DISCARDED | bit 30 READY | bits 0..30 payload length
//! ```
//!
//! A header of 0 means "reserved, not finished". The consumer zeroes every
//! word it consumes before releasing it, so a freshly claimed region always
//! reads as unfinished until its producer publishes the header.
//!
//! ## Ordering
//!
//! - Producers claim space by CAS on the monotonic `producer` cursor (in
//!   words). The CAS loop is bounded by [`MAX_RESERVE_ATTEMPTS`]; losing
//!   every attempt is reported as saturation.
//! - Payload words are stored relaxed; the header is stored with `Release`
//!   and loaded by the consumer with `Acquire`.
//! - The consumer delivers records in reservation order and stops at the
//!   first unfinished record, so it never sees a partial write.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::event::EVENT_SIZE;
use crate::kind::OperationKind;
use crate::transport::{EventTransport, ReservedWindow, Saturated};

/// Largest payload a single record may carry
pub const MAX_RECORD_LEN: usize = 64;

/// CAS attempts a producer makes before giving up
pub const MAX_RESERVE_ATTEMPTS: usize = 64;

const READY: u32 = 1 << 30;
const DISCARDED: u32 = 1 << 31;
const LEN_MASK: u32 = READY - 1;

const fn words_for(len: usize) -> usize {
    len.div_ceil(4)
}

pub struct RingBuffer<const WORDS: usize> {
    data: [AtomicU32; WORDS],
    producer: AtomicU64,
    consumer: AtomicU64,
    consumer_claimed: AtomicBool,
}

impl<const WORDS: usize> RingBuffer<WORDS> {
    const VALID_CAPACITY: () = assert!(
        WORDS > words_for(MAX_RECORD_LEN) && WORDS * 4 <= LEN_MASK as usize,
        "ring capacity must hold one maximal record"
    );

    /// Empty ring of `WORDS * 4` bytes
    #[must_use]
    pub fn new() -> Self {
        let () = Self::VALID_CAPACITY;
        Self {
            data: core::array::from_fn(|_| AtomicU32::new(0)),
            producer: AtomicU64::new(0),
            consumer: AtomicU64::new(0),
            consumer_claimed: AtomicBool::new(false),
        }
    }

    /// Total capacity in bytes, headers and padding included
    #[must_use]
    pub const fn capacity_bytes(&self) -> usize {
        WORDS * 4
    }

    /// Bytes reserved and not yet consumed
    #[must_use]
    pub fn outstanding_bytes(&self) -> usize {
        let consumer = self.consumer.load(Ordering::Acquire);
        let producer = self.producer.load(Ordering::Acquire);
        // consumer loaded first, so producer >= consumer
        (producer.saturating_sub(consumer) * 4) as usize
    }

    /// Bytes one record of `len` payload bytes occupies
    #[must_use]
    pub const fn record_footprint(len: usize) -> usize {
        (1 + words_for(len)) * 4
    }

    fn slot(&self, pos: u64) -> &AtomicU32 {
        &self.data[(pos % WORDS as u64) as usize]
    }

    /// Reserve an exclusive window for `len` payload bytes.
    ///
    /// # Errors
    /// [`Saturated`] when there is not enough free contiguous space, when
    /// `len` exceeds [`MAX_RECORD_LEN`], or when every CAS attempt lost a
    /// race with other producers.
    pub fn reserve(&self, len: usize) -> Result<RingWindow<'_, WORDS>, Saturated> {
        if len > MAX_RECORD_LEN {
            return Err(Saturated);
        }
        let need = (1 + words_for(len)) as u64;
        let capacity = WORDS as u64;

        for _ in 0..MAX_RESERVE_ATTEMPTS {
            let producer = self.producer.load(Ordering::Acquire);
            let consumer = self.consumer.load(Ordering::Acquire);

            let room_before_end = capacity - producer % capacity;
            let pad = if need > room_before_end { room_before_end } else { 0 };
            let end = producer + pad + need;
            if end.saturating_sub(consumer) > capacity {
                return Err(Saturated);
            }

            if self
                .producer
                .compare_exchange_weak(producer, end, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                if pad > 0 {
                    let pad_len = ((pad - 1) * 4) as u32;
                    self.slot(producer).store(READY | DISCARDED | pad_len, Ordering::Release);
                }
                return Ok(RingWindow { ring: self, start: producer + pad, len, finished: false });
            }
        }
        Err(Saturated)
    }

    /// Claim the single consumer handle; `None` while another is alive
    pub fn consumer(&self) -> Option<Consumer<'_, WORDS>> {
        self.consumer_claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Consumer { ring: self })
    }
}

impl<const WORDS: usize> Default for RingBuffer<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reserved region of a [`RingBuffer`]. Dropping it unfinished discards it.
pub struct RingWindow<'a, const WORDS: usize> {
    ring: &'a RingBuffer<WORDS>,
    start: u64,
    len: usize,
    finished: bool,
}

impl<const WORDS: usize> RingWindow<'_, WORDS> {
    /// Payload length this window was reserved for
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `bytes` into the payload; excess bytes are ignored, missing
    /// bytes stay zero.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let bytes = &bytes[..bytes.len().min(self.len)];
        for (word, chunk) in (0u64..).zip(bytes.chunks(4)) {
            let mut raw = [0u8; 4];
            raw[..chunk.len()].copy_from_slice(chunk);
            self.ring.slot(self.start + 1 + word).store(u32::from_ne_bytes(raw), Ordering::Relaxed);
        }
    }

    /// Make the record visible to the consumer
    pub fn commit(mut self) {
        self.finish(READY);
    }

    /// Release the space without publishing
    pub fn discard(mut self) {
        self.finish(READY | DISCARDED);
    }

    fn finish(&mut self, flags: u32) {
        self.ring.slot(self.start).store(flags | self.len as u32, Ordering::Release);
        self.finished = true;
    }
}

impl<const WORDS: usize> Drop for RingWindow<'_, WORDS> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(READY | DISCARDED);
        }
    }
}

/// One committed record, copied out of the ring
#[derive(Clone, Copy)]
pub struct Record {
    bytes: [u8; MAX_RECORD_LEN],
    len: usize,
}

impl Record {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl core::fmt::Debug for Record {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Record").field(&self.as_bytes()).finish()
    }
}

/// The ring's only reader. Yields committed records in reservation order.
pub struct Consumer<'a, const WORDS: usize> {
    ring: &'a RingBuffer<WORDS>,
}

impl<const WORDS: usize> Iterator for Consumer<'_, WORDS> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        // each pass consumes one record; padding and discards are skipped
        for _ in 0..WORDS {
            let ring = self.ring;
            let consumer = ring.consumer.load(Ordering::Relaxed);
            let producer = ring.producer.load(Ordering::Acquire);
            if consumer == producer {
                return None;
            }

            let header = ring.slot(consumer).load(Ordering::Acquire);
            if header & READY == 0 {
                return None;
            }

            let len = (header & LEN_MASK) as usize;
            let words = 1 + words_for(len) as u64;
            let published = header & DISCARDED == 0;

            let mut record = Record { bytes: [0; MAX_RECORD_LEN], len };
            if published {
                for (word, chunk) in (0u64..).zip(record.bytes[..len].chunks_mut(4)) {
                    let raw = ring.slot(consumer + 1 + word).load(Ordering::Relaxed).to_ne_bytes();
                    chunk.copy_from_slice(&raw[..chunk.len()]);
                }
            }

            for pos in consumer..consumer + words {
                ring.slot(pos).store(0, Ordering::Relaxed);
            }
            ring.consumer.store(consumer + words, Ordering::Release);

            if published {
                return Some(record);
            }
        }
        None
    }
}

impl<const WORDS: usize> Drop for Consumer<'_, WORDS> {
    fn drop(&mut self) {
        self.ring.consumer_claimed.store(false, Ordering::Release);
    }
}

impl<const WORDS: usize> ReservedWindow for RingWindow<'_, WORDS> {
    fn write(&mut self, record: &[u8; EVENT_SIZE]) {
        self.write_bytes(record);
    }

    fn commit(self) {
        RingWindow::commit(self);
    }

    fn discard(self) {
        RingWindow::discard(self);
    }
}

impl<const WORDS: usize> EventTransport for RingBuffer<WORDS> {
    type Window<'a>
        = RingWindow<'a, WORDS>
    where
        Self: 'a;

    fn reserve_event(&self, _kind: OperationKind) -> Result<RingWindow<'_, WORDS>, Saturated> {
        self.reserve(EVENT_SIZE)
    }
}
