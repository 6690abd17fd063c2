//! Reads the `COUNTERS` map (counters transport)

use aya::maps::Array;
use aya::Ebpf;
use iotap_common::config::MAP_COUNTERS;
use iotap_common::{KindCounters, OperationKind, KIND_COUNT};

use crate::domain::TapError;

/// Snapshot of every kind's `{calls, bytes}`, in tag order
///
/// # Errors
/// Returns an error if the map is missing or a slot cannot be read
pub fn read_counters(bpf: &Ebpf) -> Result<[KindCounters; KIND_COUNT], TapError> {
    let map: Array<_, KindCounters> =
        Array::try_from(bpf.map(MAP_COUNTERS).ok_or(TapError::MapNotFound(MAP_COUNTERS))?)?;

    let mut counters = [KindCounters::default(); KIND_COUNT];
    for kind in OperationKind::ALL {
        counters[kind.index()] = map.get(&u32::from(kind.tag() - 1), 0)?;
    }
    Ok(counters)
}
