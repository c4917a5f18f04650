//! Durability modes for committed writes
//!
//! Every store write runs in a SQLite transaction; the durability mode
//! decides how hard SQLite syncs when that transaction commits.

use serde::{Deserialize, Serialize};

/// Durability mode determines how commits reach the disk
///
/// # Modes
///
/// - **Safe**: `PRAGMA synchronous = FULL`, fsync on every commit
/// - **Normal**: `PRAGMA synchronous = NORMAL`; in WAL mode a power loss can
///   drop the last commits but never corrupts the file
/// - **Off**: `PRAGMA synchronous = OFF`, the OS decides when data hits the disk
///
/// # Examples
///
/// ```rust
/// use jsonstore_core::DurabilityMode;
///
/// let mode = DurabilityMode::default();
/// assert_eq!(mode, DurabilityMode::Safe);
/// assert_eq!(DurabilityMode::Normal.synchronous_pragma(), "NORMAL");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    /// fsync after every commit
    #[default]
    Safe,

    /// fsync at WAL checkpoints only
    Normal,

    /// No fsync; fastest, data loss on OS crash or power loss
    Off,
}

impl DurabilityMode {
    /// Value for `PRAGMA synchronous`
    pub fn synchronous_pragma(&self) -> &'static str {
        match self {
            DurabilityMode::Safe => "FULL",
            DurabilityMode::Normal => "NORMAL",
            DurabilityMode::Off => "OFF",
        }
    }
}

/// SQLite journal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    Memory,
}

impl JournalMode {
    /// Value for `PRAGMA journal_mode`
    pub fn as_pragma(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Memory => "MEMORY",
        }
    }
}
