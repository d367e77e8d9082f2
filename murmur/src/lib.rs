//! # murmur
//!
//! Fixed-retention, multi-resolution time-series storage in a single file.
//!
//! murmur stores one numeric series per file. A file holds a small header and
//! one or more archives, each a fixed-size ring of points at its own
//! resolution. Writes land in the finest archive that covers their age and
//! are aggregated down into coarser archives as they arrive, so the file
//! never grows and old data simply falls off the end of each ring.
//!
//! ## Key Properties
//!
//! - Files are sized at creation; writes never allocate disk space
//! - Every archive is a ring indexed by time, so a write is a single seek
//! - Coarser archives are filled at write time by a configurable aggregation
//! - Reads reject stale slots left over from earlier laps of a ring
//! - Big-endian on-disk format, readable without the library
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use murmur::{AggregationMethod, Options, RetentionDef, Store};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::new(Options::default());
//!
//! // 1 minute resolution for 1 day, 1 hour resolution for 1 year.
//! let archives: Vec<RetentionDef> = ["1m:1d", "1h:1y"]
//!     .iter()
//!     .map(|s| s.parse())
//!     .collect::<Result<_, _>>()?;
//! store.create("requests.wsp", &archives, 0.5, AggregationMethod::Sum)?;
//!
//! // Record a value at the current time.
//! store.update("requests.wsp", 12.0, None)?;
//!
//! // Read back the last day.
//! let range = store.fetch("requests.wsp", None, None)?;
//! for (timestamp, value) in range.values() {
//!     if let Some(value) = value {
//!         println!("{timestamp}: {value}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`]: file-level operations (create, update, fetch, info)
//! - [`Header`]: parsed file header, the archive list and metadata
//! - [`RetentionDef`]: archive declaration, parsed from `"1m:1d"` style strings
//! - [`TimeInfo`]: aligned fetch result with missing slots
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public. The
//! engines work on any [`Storage`], including the in-memory one.
//!
//! - [`store`]: store facade and clocks
//! - [`layout`]: archive validation and file layout
//! - [`header`]: header encoding and validation
//! - [`ring`]: slot addressing inside an archive
//! - [`write`]: single and batch update engines
//! - [`propagate`]: aggregation into coarser archives
//! - [`fetch`]: range reads
//! - [`storage`]: byte storage backends
//! - [`error`]: error types

pub mod aggregate;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod header;
pub mod layout;
pub mod options;
pub mod point;
pub mod propagate;
pub mod retention;
pub mod ring;
pub mod storage;
pub mod store;
pub mod write;

// Re-export primary API types at crate root for convenience.
pub use aggregate::AggregationMethod;
pub use cache::HeaderCache;
pub use error::{
    AggregationError, ConfigurationError, CorruptFileError, FetchError, MurmurError, Result, StorageError,
    UpdateError,
};
pub use fetch::TimeInfo;
pub use header::{ArchiveInfo, Header, MetaData};
pub use options::{FutureWrites, Options};
pub use point::Point;
pub use propagate::Propagation;
pub use retention::{RetentionDef, UnitMultiplier};
pub use storage::{MappedFile, MemoryStorage, Storage};
pub use store::{Clock, ManualClock, Store, SystemClock};
