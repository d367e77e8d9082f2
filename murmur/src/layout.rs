//! Archive layout planner.
//!
//! Turns a list of [`RetentionDef`]s into a validated [`Header`] with every
//! byte offset derived, and initializes fresh storage from it.
//!
//! ```text
//! header size  = 16 + 12 * N
//! offset[0]    = header size
//! offset[i+1]  = offset[i] + points[i] * 12
//! max retention = max(seconds_per_point[i] * points[i])
//! ```

use crate::aggregate::AggregationMethod;
use crate::error::{ConfigurationError, Result};
use crate::header::{ArchiveInfo, Header, MetaData, header_size};
use crate::retention::RetentionDef;
use crate::storage::Storage;

/// Size of the zero buffer used when clearing the data region.
const ZERO_CHUNK: usize = 16 * 1024;

/// Validates declarations and computes the file layout.
///
/// Declarations may be given in any order; they are sorted finest first
/// before validation. The checks, in order:
///
/// 1. at least one declaration
/// 2. positive precision and point count, completeness factor within `[0, 1]`
/// 3. no two declarations share a precision
/// 4. each precision evenly divides the next coarser one
/// 5. each retention is strictly less than the next coarser one
/// 6. the layout fits the format's 32-bit signed fields
///
/// # Errors
///
/// Returns the [`ConfigurationError`] naming the first violation.
///
/// # Examples
///
/// ```rust
/// use murmur::{AggregationMethod, RetentionDef, layout};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let header = layout::plan(
///     &[RetentionDef::new(60, 1440), RetentionDef::new(3600, 168)],
///     0.5,
///     AggregationMethod::Average,
/// )?;
/// assert_eq!(header.archives[0].offset, 40);
/// assert_eq!(header.archives[1].offset, 40 + 1440 * 12);
/// assert_eq!(header.max_retention(), 604_800);
/// # Ok(())
/// # }
/// ```
pub fn plan(
    retentions: &[RetentionDef],
    completeness_factor: f32,
    aggregation_method: AggregationMethod,
) -> Result<Header> {
    if retentions.is_empty() {
        return Err(ConfigurationError::NoArchives.into());
    }

    let mut sorted = retentions.to_vec();
    sorted.sort_by_key(|def| def.seconds_per_point);

    for def in &sorted {
        if def.seconds_per_point == 0 || def.points == 0 {
            return Err(ConfigurationError::InvalidArchive {
                seconds_per_point: def.seconds_per_point,
                points: def.points,
                reason: "precision and point count must be positive".to_string(),
            }
            .into());
        }
    }
    if !completeness_factor.is_finite() || !(0.0..=1.0).contains(&completeness_factor) {
        return Err(ConfigurationError::InvalidCompleteness {
            value: completeness_factor,
        }
        .into());
    }

    for pair in sorted.windows(2) {
        let (finer, coarser) = (pair[0], pair[1]);
        if finer.seconds_per_point == coarser.seconds_per_point {
            return Err(ConfigurationError::DuplicatePrecision {
                seconds_per_point: finer.seconds_per_point,
            }
            .into());
        }
    }
    for pair in sorted.windows(2) {
        let (finer, coarser) = (pair[0], pair[1]);
        if !coarser.seconds_per_point.is_multiple_of(finer.seconds_per_point) {
            return Err(ConfigurationError::PrecisionNotDivisible {
                finer: finer.seconds_per_point,
                coarser: coarser.seconds_per_point,
            }
            .into());
        }
    }
    for pair in sorted.windows(2) {
        let (finer, coarser) = (pair[0], pair[1]);
        if finer.retention() >= coarser.retention() {
            return Err(ConfigurationError::RetentionNotIncreasing {
                finer_precision: finer.seconds_per_point,
                finer_retention: finer.retention(),
                coarser_retention: coarser.retention(),
            }
            .into());
        }
    }

    let limit = i32::MAX as u64;
    let overflow = |reason: String| ConfigurationError::LayoutOverflow { reason };

    let mut offset = header_size(sorted.len());
    let mut archives = Vec::with_capacity(sorted.len());
    for def in &sorted {
        if def.retention() > limit {
            return Err(overflow(format!("retention of {def} exceeds {limit}s")).into());
        }
        if offset > limit {
            return Err(overflow(format!("offset of {def} exceeds {limit} bytes")).into());
        }
        // Checked against i32::MAX just above.
        #[allow(clippy::cast_possible_truncation)]
        let archive = ArchiveInfo {
            offset: offset as u32,
            seconds_per_point: def.seconds_per_point,
            points: def.points,
        };
        offset += archive.size();
        archives.push(archive);
    }
    if offset > limit {
        return Err(overflow(format!("file size {offset} exceeds {limit} bytes")).into());
    }

    // Every retention was checked against i32::MAX, and the archive count is
    // bounded by the file size check.
    #[allow(clippy::cast_possible_truncation)]
    let (max_retention, archive_count) = (
        archives.iter().map(ArchiveInfo::retention).max().unwrap_or(0) as u32,
        archives.len() as u32,
    );
    Ok(Header {
        metadata: MetaData {
            aggregation_method,
            max_retention,
            completeness_factor,
            archive_count,
        },
        archives,
    })
}

/// Writes `header` and zero-fills every archive, leaving all slots missing.
///
/// # Errors
///
/// Returns a storage error if the storage is too small or a write fails.
pub fn initialize<S: Storage + ?Sized>(storage: &mut S, header: &Header) -> Result<()> {
    header.write(storage)?;

    let zeros = [0u8; ZERO_CHUNK];
    let mut offset = header.size();
    let end = header.file_size();
    while offset < end {
        // Bounded by ZERO_CHUNK.
        #[allow(clippy::cast_possible_truncation)]
        let len = (end - offset).min(ZERO_CHUNK as u64) as usize;
        storage.write_at(offset, &zeros[..len])?;
        offset += len as u64;
    }

    tracing::debug!(
        path = storage.path(),
        archives = header.archives.len(),
        bytes = end,
        "initialized archive layout"
    );
    Ok(())
}
