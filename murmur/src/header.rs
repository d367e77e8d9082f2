//! File header codec.
//!
//! # File Format
//!
//! ```text
//! [0..4)    i32  aggregation method code
//! [4..8)    i32  maximum retention in seconds
//! [8..12)   f32  completeness factor
//! [12..16)  i32  archive count N
//! [16..16+12N)   N archive descriptors:
//!                  i32 byte offset | i32 seconds per point | i32 points
//! [16+12N..)     archive data, contiguous, in descriptor order
//! ```
//!
//! All fields are big-endian with no padding. Retention and byte size of each
//! archive are not stored; they are re-derived from the descriptor.

use crate::aggregate::AggregationMethod;
use crate::error::{CorruptFileError, Result};
use crate::point::POINT_SIZE;
use crate::storage::Storage;

/// Size of the fixed metadata block in bytes.
pub const METADATA_SIZE: usize = 16;

/// Size of one archive descriptor in bytes.
pub const ARCHIVE_INFO_SIZE: usize = 12;

/// Returns the header size for a file with `archive_count` archives.
pub fn header_size(archive_count: usize) -> u64 {
    (METADATA_SIZE + ARCHIVE_INFO_SIZE * archive_count) as u64
}

/// File-wide settings from the first 16 header bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetaData {
    /// How propagation reduces a window.
    pub aggregation_method: AggregationMethod,
    /// Longest retention of any archive, in seconds.
    pub max_retention: u32,
    /// Fraction of known samples a window needs before it propagates.
    pub completeness_factor: f32,
    /// Number of archive descriptors that follow.
    pub archive_count: u32,
}

/// Descriptor of one archive (one retention tier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveInfo {
    /// Byte offset of the archive's base slot.
    pub offset: u32,
    /// Sampling interval.
    pub seconds_per_point: u32,
    /// Slot capacity.
    pub points: u32,
}

impl ArchiveInfo {
    /// Seconds of history this archive holds.
    pub fn retention(&self) -> u64 {
        u64::from(self.seconds_per_point) * u64::from(self.points)
    }

    /// Bytes occupied by this archive's slots.
    pub fn size(&self) -> u64 {
        u64::from(self.points) * POINT_SIZE as u64
    }

    /// Byte offset one past the archive's last slot.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + self.size()
    }

    /// Rounds `timestamp` down to a multiple of this archive's interval.
    pub fn align(&self, timestamp: i64) -> i64 {
        let step = i64::from(self.seconds_per_point);
        timestamp - timestamp.rem_euclid(step)
    }
}

/// Metadata plus the ordered (finest first) archive list.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// File-wide settings.
    pub metadata: MetaData,
    /// Archive descriptors, finest resolution first.
    pub archives: Vec<ArchiveInfo>,
}

impl Header {
    /// Returns the aggregation method.
    pub fn aggregation_method(&self) -> AggregationMethod {
        self.metadata.aggregation_method
    }

    /// Returns the maximum retention in seconds.
    pub fn max_retention(&self) -> u32 {
        self.metadata.max_retention
    }

    /// Returns the completeness factor.
    pub fn completeness_factor(&self) -> f32 {
        self.metadata.completeness_factor
    }

    /// Size of the encoded header in bytes.
    pub fn size(&self) -> u64 {
        header_size(self.archives.len())
    }

    /// Total file size implied by the header.
    pub fn file_size(&self) -> u64 {
        self.archives
            .iter()
            .map(ArchiveInfo::end)
            .max()
            .unwrap_or_else(|| self.size())
    }

    /// Selects the finest archive whose retention covers a point `age`
    /// seconds old.
    ///
    /// Archives are examined finest first and the first match wins. Negative
    /// ages (future timestamps) select the finest archive.
    pub fn archive_for_age(&self, age: i64) -> Option<(usize, &ArchiveInfo)> {
        self.archives
            .iter()
            .enumerate()
            .find(|(_, archive)| i128::from(archive.retention()) >= i128::from(age))
    }

    /// Encodes the full header region.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.archives.len() * ARCHIVE_INFO_SIZE + METADATA_SIZE);
        buf.extend_from_slice(&self.metadata.aggregation_method.code().to_be_bytes());
        buf.extend_from_slice(&self.metadata.max_retention.to_be_bytes());
        buf.extend_from_slice(&self.metadata.completeness_factor.to_be_bytes());
        buf.extend_from_slice(&self.metadata.archive_count.to_be_bytes());
        for archive in &self.archives {
            buf.extend_from_slice(&archive.offset.to_be_bytes());
            buf.extend_from_slice(&archive.seconds_per_point.to_be_bytes());
            buf.extend_from_slice(&archive.points.to_be_bytes());
        }
        buf
    }

    /// Writes the full header region at the start of `storage`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn write<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<()> {
        storage.write_at(0, &self.encode())
    }

    /// Rewrites only the aggregation method field (the first four bytes).
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn write_aggregation_method<S: Storage + ?Sized>(
        storage: &mut S,
        method: AggregationMethod,
    ) -> Result<()> {
        storage.write_at(0, &method.code().to_be_bytes())
    }

    /// Reads and validates the header at the start of `storage`.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptFileError::Truncated`] if the storage is shorter than
    /// the header or an archive it declares, [`CorruptFileError::Malformed`]
    /// for negative fields, zero-sized archives, or no archives at all, and
    /// [`crate::AggregationError::UnknownCode`] for an unknown method code.
    pub fn read<S: Storage + ?Sized>(storage: &S) -> Result<Self> {
        let available = storage.len();
        let truncated = |needed: u64| CorruptFileError::Truncated {
            path: storage.path().to_string(),
            needed,
            available,
        };
        let malformed = |reason: String| CorruptFileError::Malformed {
            path: storage.path().to_string(),
            reason,
        };

        if available < METADATA_SIZE as u64 {
            return Err(truncated(METADATA_SIZE as u64).into());
        }
        let mut meta = [0u8; METADATA_SIZE];
        storage.read_at(0, &mut meta)?;

        let aggregation_code = be_i32(&meta, 0);
        let max_retention = be_i32(&meta, 4);
        let completeness_factor = f32::from_be_bytes([meta[8], meta[9], meta[10], meta[11]]);
        let archive_count = be_i32(&meta, 12);

        let max_retention = u32::try_from(max_retention)
            .map_err(|_| malformed(format!("negative max retention {max_retention}")))?;
        let archive_count = usize::try_from(archive_count)
            .map_err(|_| malformed(format!("negative archive count {archive_count}")))?;
        if archive_count == 0 {
            return Err(malformed("no archives declared".to_string()).into());
        }

        let needed = header_size(archive_count);
        if available < needed {
            return Err(truncated(needed).into());
        }
        let mut descriptors = vec![0u8; archive_count * ARCHIVE_INFO_SIZE];
        storage.read_at(METADATA_SIZE as u64, &mut descriptors)?;

        let mut archives = Vec::with_capacity(archive_count);
        for (index, raw) in descriptors.chunks_exact(ARCHIVE_INFO_SIZE).enumerate() {
            let field = |at: usize, name: &str| {
                let value = be_i32(raw, at);
                u32::try_from(value)
                    .map_err(|_| malformed(format!("archive {index} has negative {name} {value}")))
            };
            let archive = ArchiveInfo {
                offset: field(0, "offset")?,
                seconds_per_point: field(4, "seconds per point")?,
                points: field(8, "points")?,
            };
            if archive.seconds_per_point == 0 || archive.points == 0 {
                return Err(malformed(format!(
                    "archive {index} declares {}:{}",
                    archive.seconds_per_point, archive.points
                ))
                .into());
            }
            if u64::from(archive.offset) < needed {
                return Err(malformed(format!(
                    "archive {index} offset {} overlaps the header",
                    archive.offset
                ))
                .into());
            }
            if archive.end() > available {
                return Err(truncated(archive.end()).into());
            }
            archives.push(archive);
        }

        let aggregation_method = AggregationMethod::try_from(aggregation_code)?;

        Ok(Self {
            metadata: MetaData {
                aggregation_method,
                max_retention,
                completeness_factor,
                archive_count: u32::try_from(archive_count)
                    .map_err(|_| malformed(format!("archive count {archive_count}")))?,
            },
            archives,
        })
    }
}

/// Reads a big-endian `i32` at `at`.
fn be_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
