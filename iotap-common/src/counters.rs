//! Hosted counter table: the aggregate-in-place transport strategy.
//!
//! Mirrors the kernel `COUNTERS` array map. Reservation always succeeds;
//! commit adds one call and the event's length to the kind's slot with
//! relaxed fetch-add. Nothing is ever dropped, but individual events are not
//! retained either.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::event::{IoEvent, EVENT_SIZE};
use crate::kind::{OperationKind, KIND_COUNT};
use crate::transport::{EventTransport, KindCounters, ReservedWindow, Saturated};

pub struct CounterTable {
    calls: [AtomicU64; KIND_COUNT],
    bytes: [AtomicU64; KIND_COUNT],
}

impl CounterTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: core::array::from_fn(|_| AtomicU64::new(0)),
            bytes: core::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Current totals for one kind
    #[must_use]
    pub fn get(&self, kind: OperationKind) -> KindCounters {
        KindCounters {
            calls: self.calls[kind.index()].load(Ordering::Relaxed),
            bytes: self.bytes[kind.index()].load(Ordering::Relaxed),
        }
    }

    /// Current totals for every kind, in tag order
    #[must_use]
    pub fn snapshot(&self) -> [KindCounters; KIND_COUNT] {
        OperationKind::ALL.map(|kind| self.get(kind))
    }

    fn add(&self, event: IoEvent) {
        let slot = event.kind.index();
        self.calls[slot].fetch_add(1, Ordering::Relaxed);
        self.bytes[slot].fetch_add(u64::from(event.len), Ordering::Relaxed);
    }
}

impl Default for CounterTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending update; applied on commit
pub struct CounterWindow<'a> {
    table: &'a CounterTable,
    event: IoEvent,
}

impl ReservedWindow for CounterWindow<'_> {
    fn write(&mut self, record: &[u8; EVENT_SIZE]) {
        if let Ok(event) = IoEvent::decode(record) {
            self.event = event;
        }
    }

    fn commit(self) {
        self.table.add(self.event);
    }

    fn discard(self) {}
}

impl EventTransport for CounterTable {
    type Window<'a>
        = CounterWindow<'a>
    where
        Self: 'a;

    fn reserve_event(&self, kind: OperationKind) -> Result<CounterWindow<'_>, Saturated> {
        Ok(CounterWindow { table: self, event: IoEvent::new(kind, 0) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(table: &CounterTable, kind: OperationKind, len: u32) {
        let mut window = table.reserve_event(kind).unwrap();
        window.write(&IoEvent::new(kind, len).encode());
        window.commit();
    }

    #[test]
    fn test_commit_accumulates_per_kind() {
        let table = CounterTable::new();
        publish(&table, OperationKind::Writev, 125);
        publish(&table, OperationKind::Writev, 5);
        publish(&table, OperationKind::Read, 10);

        assert_eq!(table.get(OperationKind::Writev), KindCounters { calls: 2, bytes: 130 });
        assert_eq!(table.get(OperationKind::Read), KindCounters { calls: 1, bytes: 10 });
        assert_eq!(table.get(OperationKind::Write), KindCounters::default());
    }

    #[test]
    fn test_discard_leaves_counters_untouched() {
        let table = CounterTable::new();
        let mut window = table.reserve_event(OperationKind::Send).unwrap();
        window.write(&IoEvent::new(OperationKind::Send, 99).encode());
        window.discard();

        assert_eq!(table.get(OperationKind::Send), KindCounters::default());
    }

    #[test]
    fn test_concurrent_commits_are_not_lost() {
        let table = CounterTable::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..10_000 {
                        publish(&table, OperationKind::SendTo, 3);
                    }
                });
            }
        });
        assert_eq!(table.get(OperationKind::SendTo), KindCounters { calls: 80_000, bytes: 240_000 });
    }
}
