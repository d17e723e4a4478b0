//! Store configuration.
//!
//! [`StoreConfig`] carries the database path plus the pragma tuning knobs
//! applied at open time. It derives `serde::Deserialize` with per-field
//! defaults so an embedding application can load it straight from its own
//! config file and only override what it cares about.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for opening a [`Database`](crate::Database).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the database file, inside an application-writable directory.
    pub path: PathBuf,

    /// Create the file (and its parent directory) when absent.
    pub create_if_missing: bool,

    /// How long a writer waits on a locked database before giving up, in ms.
    pub busy_timeout_ms: u32,

    /// Page cache size in KiB.
    pub cache_size_kib: u32,

    /// Memory-mapped I/O window in bytes. Zero disables mmap.
    pub mmap_size: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/satchel.db"),
            create_if_missing: true,
            busy_timeout_ms: 5_000,
            cache_size_kib: 64_000,
            mmap_size: 268_435_456,
        }
    }
}

impl StoreConfig {
    /// Config pointing at `path`, everything else default.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
