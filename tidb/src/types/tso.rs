use chrono::{DateTime, Utc};

/// Number of low bits of a TSO holding the logical counter.
const LOGICAL_BITS: u32 = 18;

/// Returns the physical part of a TiDB timestamp oracle value, in milliseconds since the epoch.
pub fn tso_physical_millis(tso: u64) -> u64 {
    tso >> LOGICAL_BITS
}

/// Builds a TSO from a physical timestamp and a logical counter.
pub fn compose_tso(physical_millis: u64, logical: u64) -> u64 {
    (physical_millis << LOGICAL_BITS) | (logical & ((1 << LOGICAL_BITS) - 1))
}

/// Converts a TSO to the wall-clock time it was allocated at.
pub fn tso_to_datetime(tso: u64) -> Option<DateTime<Utc>> {
    let millis = i64::try_from(tso_physical_millis(tso)).ok()?;
    DateTime::from_timestamp_millis(millis)
}
