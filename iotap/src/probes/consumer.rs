//! # Event Aggregation
//!
//! Turns the raw records drained from `EVENTS` (or the hosted ring in tests)
//! into per-kind totals.
//!
//! ## Invariants
//!
//! - Totals only grow; a record is counted exactly once.
//! - `total_events()` equals the number of records that decoded.
//! - Records that do not decode are counted in `malformed()` and otherwise
//!   ignored.

use iotap_common::{IoEvent, KindCounters, OperationKind, KIND_COUNT};
use log::trace;
use serde::{Deserialize, Serialize};

use crate::domain::RecordError;

/// Calls and bytes observed for one operation kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindTotals {
    pub calls: u64,
    pub bytes: u64,
}

impl From<KindCounters> for KindTotals {
    fn from(counters: KindCounters) -> Self {
        Self { calls: counters.calls, bytes: counters.bytes }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventAggregator {
    totals: [KindTotals; KIND_COUNT],
    events: u64,
    bytes: u64,
    malformed: u64,
}

impl EventAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the `COUNTERS` map (counters transport)
    #[must_use]
    pub fn from_counters(counters: &[KindCounters; KIND_COUNT]) -> Self {
        let mut aggregator = Self::new();
        for (kind, counters) in OperationKind::ALL.iter().zip(counters) {
            aggregator.totals[kind.index()] = (*counters).into();
            aggregator.events += counters.calls;
            aggregator.bytes += counters.bytes;
        }
        aggregator
    }

    /// Decode and count one ring buffer record.
    ///
    /// # Errors
    /// Returns [`RecordError`] when the record is too short or carries an
    /// unknown kind tag. The record is counted as malformed.
    pub fn ingest(&mut self, record: &[u8]) -> Result<IoEvent, RecordError> {
        match IoEvent::decode(record) {
            Ok(event) => {
                self.add(event);
                Ok(event)
            }
            Err(reason) => {
                self.malformed += 1;
                Err(RecordError { len: record.len(), reason })
            }
        }
    }

    pub fn add(&mut self, event: IoEvent) {
        trace!("{} len={}", event.kind, event.len);
        let slot = &mut self.totals[event.kind.index()];
        slot.calls += 1;
        slot.bytes += u64::from(event.len);
        self.events += 1;
        self.bytes += u64::from(event.len);
    }

    #[must_use]
    pub fn totals(&self, kind: OperationKind) -> KindTotals {
        self.totals[kind.index()]
    }

    /// Kinds seen at least once, in tag order
    pub fn active(&self) -> impl Iterator<Item = (OperationKind, KindTotals)> + '_ {
        OperationKind::ALL
            .into_iter()
            .map(|kind| (kind, self.totals(kind)))
            .filter(|(_, totals)| totals.calls > 0)
    }

    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.events
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.bytes
    }

    #[must_use]
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}
