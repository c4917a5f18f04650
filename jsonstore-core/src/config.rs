// jsonstore-core/src/config.rs
// Store configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::durability::{DurabilityMode, JournalMode};
use crate::error::{JsonStoreError, Result};

/// Options for opening a [`Store`](crate::Store)
///
/// ```rust
/// use jsonstore_core::{DurabilityMode, StoreConfig};
///
/// let config = StoreConfig::at("app.db").with_durability(DurabilityMode::Normal);
/// assert_eq!(config.busy_timeout_ms, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Database file; `None` opens a private in-memory database
    pub path: Option<PathBuf>,

    pub durability: DurabilityMode,

    /// Ignored for in-memory databases
    pub journal_mode: JournalMode,

    /// How long a write waits for a lock held by another connection
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: None,
            durability: DurabilityMode::default(),
            journal_mode: JournalMode::default(),
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.journal_mode = journal_mode;
        self
    }

    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    /// Load a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            JsonStoreError::Serialization(format!(
                "Invalid store config {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }
}
