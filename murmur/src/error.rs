//! Error types for the murmur time-series file engine.

use thiserror::Error;

/// The main error type for all murmur operations.
///
/// Each variant wraps the error enum of one concern, so callers can match on
/// the broad category first and the specific condition second.
#[derive(Error, Debug)]
pub enum MurmurError {
    /// Bad retention declarations, bad options, or the target already exists.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Header or archive bytes are insufficient or inconsistent.
    #[error("corrupt file: {0}")]
    CorruptFile(#[from] CorruptFileError),

    /// Unknown aggregation method code or name.
    #[error("invalid aggregation method: {0}")]
    Aggregation(#[from] AggregationError),

    /// Error during a write (single point or batch).
    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    /// Error during a range fetch.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Error from the underlying byte storage.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors raised while validating creation parameters or runtime options.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// No retention declarations were given.
    #[error("at least one archive must be declared")]
    NoArchives,

    /// A single declaration is unusable on its own.
    #[error("invalid archive {seconds_per_point}:{points}: {reason}")]
    InvalidArchive {
        /// Declared seconds per point.
        seconds_per_point: u32,
        /// Declared point count.
        points: u32,
        /// Why the declaration is invalid.
        reason: String,
    },

    /// The completeness factor is outside `[0, 1]` or not finite.
    #[error("completeness factor {value} must be within [0, 1]")]
    InvalidCompleteness {
        /// The rejected value.
        value: f32,
    },

    /// Two declarations share the same precision.
    #[error("two archives share the same precision of {seconds_per_point}s")]
    DuplicatePrecision {
        /// The duplicated seconds per point.
        seconds_per_point: u32,
    },

    /// A finer archive's precision does not evenly divide the next coarser one.
    #[error("precision {finer}s does not evenly divide the next archive's precision {coarser}s")]
    PrecisionNotDivisible {
        /// Seconds per point of the finer archive.
        finer: u32,
        /// Seconds per point of the coarser archive.
        coarser: u32,
    },

    /// A coarser archive does not retain strictly more time than the finer one.
    #[error("archive {finer_precision}s retains {finer_retention}s, which is not less than the next archive's {coarser_retention}s")]
    RetentionNotIncreasing {
        /// Seconds per point of the finer archive.
        finer_precision: u32,
        /// Retention of the finer archive in seconds.
        finer_retention: u64,
        /// Retention of the coarser archive in seconds.
        coarser_retention: u64,
    },

    /// Offsets, retention, or the total size do not fit the 32-bit header fields.
    #[error("layout does not fit the file format: {reason}")]
    LayoutOverflow {
        /// Which quantity overflowed.
        reason: String,
    },

    /// The target file already exists; creation never overwrites.
    #[error("file '{path}' already exists")]
    AlreadyExists {
        /// The existing path.
        path: String,
    },

    /// A textual retention definition could not be parsed.
    #[error("invalid retention definition '{input}': {reason}")]
    InvalidRetention {
        /// The text that failed to parse.
        input: String,
        /// Why it failed.
        reason: String,
    },

    /// Failed to read an options file.
    #[error("failed to load options from '{path}': {source}")]
    OptionsLoad {
        /// The options file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse an options file.
    #[error("failed to parse options from '{path}': {source}")]
    OptionsParse {
        /// The options file path.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised when the on-disk bytes cannot be a valid file.
#[derive(Error, Debug)]
pub enum CorruptFileError {
    /// The file ends before the header or a declared archive does.
    #[error("'{path}' is truncated: needed {needed} bytes, file has {available}")]
    Truncated {
        /// The file path.
        path: String,
        /// Bytes required by the header.
        needed: u64,
        /// Bytes actually present.
        available: u64,
    },

    /// A header field holds a value no valid file can contain.
    #[error("'{path}' has a malformed header: {reason}")]
    Malformed {
        /// The file path.
        path: String,
        /// Description of the inconsistency.
        reason: String,
    },
}

/// Errors for aggregation method lookup.
#[derive(Error, Debug)]
pub enum AggregationError {
    /// The numeric code is not one of 1 through 5.
    #[error("unknown aggregation method code {code}")]
    UnknownCode {
        /// The rejected code.
        code: i32,
    },

    /// The textual name is not a known method.
    #[error("unknown aggregation method '{name}'")]
    UnknownName {
        /// The rejected name.
        name: String,
    },
}

/// Errors that can occur during writes.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The timestamp is older than the coarsest archive retains.
    #[error("timestamp {timestamp} is not covered by any archive (now {now}, max retention {max_retention}s)")]
    TimestampNotCovered {
        /// The rejected timestamp.
        timestamp: u32,
        /// The current time used for the check.
        now: u32,
        /// The file's maximum retention.
        max_retention: u32,
    },

    /// The timestamp is in the future and future writes are disabled.
    #[error("timestamp {timestamp} is in the future (now {now})")]
    FutureTimestamp {
        /// The rejected timestamp.
        timestamp: u32,
        /// The current time used for the check.
        now: u32,
    },
}

/// Errors that can occur during range fetches.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The range is empty or inverted after clamping.
    #[error("invalid time interval: from {from} is not before until {until}")]
    InvalidTimeInterval {
        /// Start of the range after clamping.
        from: i64,
        /// End of the range after clamping.
        until: i64,
    },
}

/// Errors from the byte storage under a file.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The file could not be created or opened.
    #[error("failed to open '{path}': {source}")]
    Open {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Memory mapping failed.
    #[error("memory mapping failed for '{path}': {source}")]
    Map {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Attempted to access beyond the end of the storage.
    #[error("access beyond bounds of '{path}': offset {offset} + length {length} > size {size}")]
    OutOfBounds {
        /// The storage path.
        path: String,
        /// The attempted offset.
        offset: u64,
        /// The attempted length.
        length: u64,
        /// The actual storage size.
        size: u64,
    },

    /// Flushing to stable storage failed.
    #[error("failed to sync '{path}' to disk: {source}")]
    Sync {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Acquiring the advisory lock failed.
    #[error("failed to lock '{path}': {source}")]
    Lock {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A write was attempted through a read-only mapping.
    #[error("'{path}' is open read-only")]
    ReadOnly {
        /// The file path.
        path: String,
    },
}

/// Type alias for `Result<T, MurmurError>`.
pub type Result<T> = std::result::Result<T, MurmurError>;
