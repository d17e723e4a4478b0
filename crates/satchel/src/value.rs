//! Scalar storage conversions.
//!
//! Every record field round-trips through SQLite's native scalars
//! (INTEGER, TEXT, REAL, BLOB, NULL). The only mapping that needs help is
//! time: timestamps are stored as integer epoch milliseconds and
//! reconstructed as `DateTime<Utc>` on read. The mapping is exact at
//! millisecond precision; a stored integer outside chrono's representable
//! range surfaces as a serialization error instead of panicking.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use crate::error::{StoreError, StoreResult};

/// Convert a timestamp to its stored form (epoch milliseconds).
pub fn timestamp_to_storage(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Reconstruct a timestamp from its stored form.
pub fn timestamp_from_storage(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        StoreError::Serialization(format!("epoch milliseconds out of range: {millis}"))
    })
}

/// Read a timestamp column inside a `from_row` implementation.
///
/// Returns a `rusqlite::Result` so it composes with `row.get(..)?`; the
/// conversion failure is classified as [`StoreError::Serialization`] once
/// it crosses the crate's error boundary.
pub fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    timestamp_from_storage(millis).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, e.to_string().into())
    })
}

// ── tests ────────────────────────────────────────────────────────────
