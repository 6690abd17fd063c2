//! # Event Transport
//!
//! The seam between the handler pipeline and wherever events go. Handlers
//! only ever see this protocol:
//!
//! ```text
//! reserve_event ──▶ window ──write──▶ window ──commit──▶ visible to consumer
//!        │                              └─────discard──▶ gone
//!        └─ Saturated: event lost, caller returns
//! ```
//!
//! Two strategies implement it:
//!
//! - **Stream**: a bounded ring buffer of individual records (kernel
//!   `RingBuf` map, or the hosted [`RingBuffer`](crate::ring::RingBuffer))
//! - **Counters**: per-kind `{calls, bytes}` totals updated atomically on
//!   commit ([`CounterTable`](crate::counters::CounterTable) when hosted)
//!
//! Neither may block. A full stream reports [`Saturated`]; counters never do.

use crate::event::EVENT_SIZE;
use crate::kind::OperationKind;

/// The transport has no room for another record. The event is lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Saturated;

/// Which strategy the probes publish through.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    Stream = 0,
    Counters = 1,
}

impl TransportMode {
    /// Decode from a config global; unknown values fall back to the default
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => TransportMode::Counters,
            _ => TransportMode::Stream,
        }
    }
}

/// An exclusive, not yet visible write window.
///
/// Exactly one of [`commit`](Self::commit) or [`discard`](Self::discard)
/// ends it.
pub trait ReservedWindow {
    /// Copy the encoded record into the window
    fn write(&mut self, record: &[u8; EVENT_SIZE]);

    /// Publish the window
    fn commit(self);

    /// Release the window without publishing
    fn discard(self);
}

/// Destination for encoded events.
pub trait EventTransport {
    type Window<'a>: ReservedWindow
    where
        Self: 'a;

    /// Reserve room for one event of `kind`. Never waits.
    ///
    /// # Errors
    /// [`Saturated`] when the transport cannot take another record.
    fn reserve_event(&self, kind: OperationKind) -> Result<Self::Window<'_>, Saturated>;
}

/// Totals for one operation kind, as stored in the `COUNTERS` map.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KindCounters {
    /// Committed operations
    pub calls: u64,
    /// Sum of their lengths
    pub bytes: u64,
}
