//! Store facade: the public file-level operations.
//!
//! A [`Store`] holds no open files. Every operation opens the target file,
//! does its work through the engines, and closes it again:
//!
//! | operation                          | opens      | lock | flush |
//! |------------------------------------|------------|------|-------|
//! | [`Store::create`]                  | new file   | yes  | yes   |
//! | [`Store::update`]                  | read-write | yes  | yes   |
//! | [`Store::update_many`]             | read-write | yes  | yes   |
//! | [`Store::set_aggregation_method`]  | read-write | yes  | yes   |
//! | [`Store::info`]                    | read-only  | no   | no    |
//! | [`Store::fetch`]                   | read-only  | no   | no    |
//!
//! "lock" and "flush" only happen when enabled in [`Options`].
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use murmur::{AggregationMethod, Options, RetentionDef, Store};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::new(Options::default());
//!
//! // One minute for a day, one hour for a week.
//! store.create(
//!     "cpu.wsp",
//!     &["1m:1d".parse()?, "1h:7d".parse::<RetentionDef>()?],
//!     0.5,
//!     AggregationMethod::Average,
//! )?;
//!
//! store.update("cpu.wsp", 42.0, None)?;
//!
//! let range = store.fetch("cpu.wsp", None, None)?;
//! for (timestamp, value) in range.values() {
//!     println!("{timestamp}: {value:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::aggregate::AggregationMethod;
use crate::cache::HeaderCache;
use crate::error::Result;
use crate::fetch::{self, TimeInfo};
use crate::header::Header;
use crate::layout;
use crate::options::Options;
use crate::retention::RetentionDef;
use crate::storage::{MappedFile, Storage};
use crate::write;

/// Source of the current time in seconds since the Unix epoch.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> u32;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
    }
}

/// A clock that only moves when told to. Useful for tests and for replaying
/// historical data.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn new(now: u32) -> Self {
        Self {
            now: AtomicU32::new(now),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: u32) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Entry point for working with murmur files.
///
/// `Store` is `Send + Sync`. All stores in a process share one
/// [`HeaderCache`], so a header change made through any of them is seen by
/// the others.
#[derive(Debug)]
pub struct Store<C: Clock = SystemClock> {
    options: Options,
    cache: &'static HeaderCache,
    clock: C,
}

impl Store {
    /// Creates a store using the system clock.
    pub fn new(options: Options) -> Self {
        Self::with_clock(options, SystemClock)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl<C: Clock> Store<C> {
    /// Creates a store reading the current time from `clock`.
    pub fn with_clock(options: Options, clock: C) -> Self {
        Self {
            options,
            cache: HeaderCache::global(),
            clock,
        }
    }

    /// Returns the options this store was built with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Returns the clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Returns the process-wide header cache.
    pub fn cache(&self) -> &'static HeaderCache {
        self.cache
    }

    /// Creates a new file with one archive per retention declaration.
    ///
    /// The declarations are validated before anything touches the file
    /// system. Every slot starts out missing.
    ///
    /// # Arguments
    ///
    /// * `path` - File to create; must not exist
    /// * `retentions` - Archive declarations, in any order
    /// * `completeness_factor` - Fraction of known points a window needs to propagate
    /// * `method` - How windows are aggregated
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ConfigurationError`] for invalid declarations or an
    /// existing path, or a storage error if the file cannot be written.
    pub fn create<P: AsRef<Path>>(
        &self,
        path: P,
        retentions: &[RetentionDef],
        completeness_factor: f32,
        method: AggregationMethod,
    ) -> Result<Header> {
        let path = path.as_ref();
        let header = layout::plan(retentions, completeness_factor, method)?;

        let mut file = MappedFile::create(path, header.file_size())?;
        let initialized = self
            .lock(&file)
            .and_then(|()| layout::initialize(&mut file, &header))
            .and_then(|()| self.finish(&mut file));
        if let Err(e) = initialized {
            drop(file);
            // Leave nothing half-written behind.
            if let Err(cleanup) = std::fs::remove_file(path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "failed to remove partially created file"
                );
            }
            return Err(e);
        }
        self.cache.invalidate(path);

        tracing::debug!(
            path = %path.display(),
            archives = header.archives.len(),
            max_retention = header.max_retention(),
            "created file"
        );
        Ok(header)
    }

    /// Stores one point. `None` as the timestamp means now.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::UpdateError`] if the timestamp is too old (or in
    /// the future while future writes are rejected), a corrupt-file error for
    /// an invalid header, or a storage error.
    pub fn update<P: AsRef<Path>>(&self, path: P, value: f64, timestamp: Option<u32>) -> Result<()> {
        let path = path.as_ref();
        let now = self.clock.now();
        let mut file = self.open_for_write(path)?;
        let header = self.header(path, &file)?;
        write::update_point(
            &mut file,
            &header,
            value,
            timestamp.unwrap_or(now),
            now,
            self.options.future_writes,
        )?;
        self.finish(&mut file)
    }

    /// Stores a batch of `(timestamp, value)` points.
    ///
    /// Points older than every archive are dropped. Returns the number of
    /// slots written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::UpdateError::FutureTimestamp`] if future writes are
    /// rejected and any point is in the future, a corrupt-file error for an
    /// invalid header, or a storage error.
    pub fn update_many<P: AsRef<Path>>(&self, path: P, points: &[(u32, f64)]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }
        let path = path.as_ref();
        let now = self.clock.now();
        let mut file = self.open_for_write(path)?;
        let header = self.header(path, &file)?;
        let written = write::update_many(&mut file, &header, points, now, self.options.future_writes)?;
        self.finish(&mut file)?;
        Ok(written)
    }

    /// Changes the aggregation method used for future propagation.
    ///
    /// Only the first four bytes of the file are rewritten. Points already
    /// propagated keep their values.
    ///
    /// # Errors
    ///
    /// Returns a corrupt-file error if the file is not a valid murmur file,
    /// or a storage error.
    pub fn set_aggregation_method<P: AsRef<Path>>(&self, path: P, method: AggregationMethod) -> Result<()> {
        let path = path.as_ref();
        let mut file = self.open_for_write(path)?;
        let previous = Header::read(&file)?.aggregation_method();
        Header::write_aggregation_method(&mut file, method)?;
        self.cache.invalidate(path);
        self.finish(&mut file)?;
        tracing::debug!(path = %path.display(), %previous, %method, "changed aggregation method");
        Ok(())
    }

    /// Reads the file header.
    ///
    /// # Errors
    ///
    /// Returns a corrupt-file error for an invalid header, or a storage error.
    pub fn info<P: AsRef<Path>>(&self, path: P) -> Result<Header> {
        let path = path.as_ref();
        if self.options.cache_headers
            && let Some(header) = self.cache.get(path)
        {
            return Ok(header);
        }
        let file = MappedFile::open_read_only(path)?;
        self.header(path, &file)
    }

    /// Reads the range `[from, until)`. `None` for `from` means the oldest
    /// retained instant; `None` for `until` means now.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FetchError::InvalidTimeInterval`] for an empty range,
    /// a corrupt-file error for an invalid header, or a storage error.
    pub fn fetch<P: AsRef<Path>>(&self, path: P, from: Option<u32>, until: Option<u32>) -> Result<TimeInfo> {
        let path = path.as_ref();
        let file = MappedFile::open_read_only(path)?;
        let header = self.header(path, &file)?;
        fetch::fetch(&file, &header, from, until, self.clock.now())
    }

    /// Returns the header for `path`, from the cache when enabled.
    fn header(&self, path: &Path, file: &MappedFile) -> Result<Header> {
        if !self.options.cache_headers {
            return Header::read(file);
        }
        if let Some(header) = self.cache.get(path) {
            return Ok(header);
        }
        let header = Header::read(file)?;
        self.cache.insert(path, header.clone());
        Ok(header)
    }

    fn open_for_write(&self, path: &Path) -> Result<MappedFile> {
        let file = MappedFile::open(path)?;
        self.lock(&file)?;
        Ok(file)
    }

    fn lock(&self, file: &MappedFile) -> Result<()> {
        if self.options.lock {
            file.lock()?;
        }
        Ok(())
    }

    fn finish(&self, file: &mut MappedFile) -> Result<()> {
        if self.options.autoflush {
            file.sync()?;
        }
        Ok(())
    }
}
