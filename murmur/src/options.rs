//! Runtime options for a [`crate::Store`].
//!
//! Options are not persisted in murmur files; each process picks its own.
//! They can be built in code or loaded from a JSON file:
//!
//! ```json
//! { "lock": true, "cache_headers": false, "autoflush": true, "future_writes": "reject" }
//! ```
//!
//! Every field is optional and defaults to off (future writes accepted).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};

/// Whether writes newer than the current time are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FutureWrites {
    /// Store future points in the finest archive.
    #[default]
    Accept,
    /// Fail with [`crate::UpdateError::FutureTimestamp`].
    Reject,
}

/// Behaviour switches for [`crate::Store`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Hold an exclusive advisory lock for the duration of each mutation.
    pub lock: bool,

    /// Keep parsed headers in a process-wide cache keyed by path.
    ///
    /// Entries are invalidated by this process's own header changes only, so
    /// leave this off when other processes may modify the same files.
    pub cache_headers: bool,

    /// Flush to stable storage at the end of each mutation.
    pub autoflush: bool,

    /// Policy for timestamps later than the current time.
    pub future_writes: FutureWrites,
}

impl Options {
    /// Loads options from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::OptionsLoad`] if the file cannot be read
    /// and [`ConfigurationError::OptionsParse`] if it is not valid JSON for
    /// this type.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigurationError::OptionsLoad {
            path: path.display().to_string(),
            source: e,
        })?;
        let options = serde_json::from_str(&data).map_err(|e| ConfigurationError::OptionsParse {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(options)
    }
}
