//! Fetch engine: reconstructing an aligned, gap-aware range.
//!
//! A fetch picks one archive (the finest that still covers `from`), aligns
//! the range to its interval, and reads the slots in between. Slots holding
//! anything other than their expected timestamp come back missing, so stale
//! data from an earlier lap of the ring never leaks into a result.

use crate::error::{FetchError, Result};
use crate::header::Header;
use crate::point::Point;
use crate::ring;
use crate::storage::Storage;

/// Result of a range fetch.
///
/// `points[i]` belongs to `from_interval + i * step`; missing slots are
/// [`Point::MISSING`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimeInfo {
    /// First aligned timestamp in the result.
    pub from_interval: i64,
    /// Aligned end of the result, exclusive.
    pub until_interval: i64,
    /// Interval of the archive the result was read from.
    pub step: u32,
    /// One entry per step.
    pub points: Vec<Point>,
}

impl TimeInfo {
    /// Number of slots in the result.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the aligned range holds no slots.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterates `(expected timestamp, value)` pairs, `None` for missing slots.
    pub fn values(&self) -> impl Iterator<Item = (i64, Option<f64>)> + '_ {
        let step = i64::from(self.step);
        self.points.iter().enumerate().map(move |(i, point)| {
            // Result lengths are bounded by an archive's point count.
            #[allow(clippy::cast_possible_wrap)]
            let timestamp = self.from_interval + i as i64 * step;
            (timestamp, (!point.is_missing()).then_some(point.value))
        })
    }
}

/// Reads the range `[from, until)` as of `now`.
///
/// `None` for `from` means the oldest retained instant; `None` for `until`
/// means `now`. `from` is clamped up to `now - max_retention`; `until` is
/// clamped down to `now`, and reset to `now` if it falls before `from`.
///
/// # Errors
///
/// Returns [`FetchError::InvalidTimeInterval`] if `from` is not before
/// `until` after clamping, or a storage error.
pub fn fetch<S: Storage + ?Sized>(
    storage: &S,
    header: &Header,
    from: Option<u32>,
    until: Option<u32>,
    now: u32,
) -> Result<TimeInfo> {
    let now = i64::from(now);
    let oldest = now - i64::from(header.max_retention());

    let from = from.map_or(oldest, i64::from).max(oldest);
    let mut until = until.map_or(now, i64::from).min(now);
    if until < from {
        until = now;
    }
    if from >= until {
        return Err(FetchError::InvalidTimeInterval { from, until }.into());
    }

    let Some((index, archive)) = header.archive_for_age(now - from) else {
        return Err(FetchError::InvalidTimeInterval { from, until }.into());
    };
    let step = i64::from(archive.seconds_per_point);
    let from_interval = archive.align(from) + step;
    let until_interval = archive.align(until) + step;
    // Both intervals are aligned and ordered, so the quotient is exact and
    // non-negative.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = ((until_interval - from_interval) / step) as usize;

    let anchor = ring::read_anchor(storage, archive)?;
    let points = if anchor.is_missing() {
        vec![Point::MISSING; count]
    } else {
        let from_offset = ring::offset_for(archive, &anchor, from_interval);
        let mut points = ring::read_span(storage, archive, from_offset, count)?;
        ring::validate_span(&mut points, from_interval, archive.seconds_per_point);
        points
    };

    tracing::debug!(
        archive = index,
        from_interval,
        until_interval,
        slots = count,
        "fetched range"
    );
    Ok(TimeInfo {
        from_interval,
        until_interval,
        step: archive.seconds_per_point,
        points,
    })
}
