//! Propagation: downsampling a finer archive into the next coarser one.
//!
//! After a write lands in archive `i`, the window of archive `i` that makes
//! up one slot of archive `i + 1` is read back, checked for completeness,
//! aggregated, and written into archive `i + 1`. The cascade then continues
//! with `i + 1` as the finer archive until a window lacks enough data.

use crate::error::Result;
use crate::header::{ArchiveInfo, Header};
use crate::point::Point;
use crate::ring;
use crate::storage::Storage;

/// Outcome of propagating one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// The coarser archive received an aggregated point.
    Propagated,
    /// Too few known points in the window; nothing was written.
    Insufficient,
}

/// Propagates the window containing `timestamp` from `higher` into `lower`.
///
/// `higher` must be finer than `lower` and its interval must divide
/// `lower`'s. The window covers `lower.seconds_per_point /
/// higher.seconds_per_point` slots of `higher`, starting at the slot whose
/// expected timestamp is `timestamp` aligned to `lower`. Slots holding any
/// other timestamp count as missing.
///
/// # Errors
///
/// Returns a storage error if a read or write fails.
pub fn propagate<S: Storage + ?Sized>(
    storage: &mut S,
    header: &Header,
    timestamp: i64,
    higher: &ArchiveInfo,
    lower: &ArchiveInfo,
) -> Result<Propagation> {
    let lower_interval = lower.align(timestamp);
    let window = (lower.seconds_per_point / higher.seconds_per_point) as usize;

    let higher_anchor = ring::read_anchor(storage, higher)?;
    let from_offset = ring::offset_for(higher, &higher_anchor, lower_interval);
    let mut points = ring::read_span(storage, higher, from_offset, window)?;
    ring::validate_span(&mut points, lower_interval, higher.seconds_per_point);

    let known: Vec<f64> = points
        .iter()
        .filter(|p| !p.is_missing())
        .map(|p| p.value)
        .collect();

    // Window sizes are far below f32's exact integer range.
    #[allow(clippy::cast_precision_loss)]
    let known_fraction = known.len() as f32 / window as f32;
    let Some(value) = header.aggregation_method().apply(&known) else {
        tracing::trace!(lower_interval, window, "propagation window is empty");
        return Ok(Propagation::Insufficient);
    };
    if known_fraction < header.completeness_factor() {
        tracing::trace!(
            lower_interval,
            known = known.len(),
            window,
            "propagation window below completeness factor"
        );
        return Ok(Propagation::Insufficient);
    }

    // Aligned timestamps of stored points are always within u32.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let point = Point::new(lower_interval as u32, value);
    let lower_anchor = ring::read_anchor(storage, lower)?;
    let offset = ring::offset_for(lower, &lower_anchor, lower_interval);
    ring::write_point(storage, offset, &point)?;

    tracing::trace!(
        lower_interval,
        seconds_per_point = lower.seconds_per_point,
        value,
        "propagated window"
    );
    Ok(Propagation::Propagated)
}

/// Propagates `timestamp` from archive `from_index` through every coarser
/// archive, stopping at the first insufficient window.
///
/// Returns how many coarser archives received a point.
///
/// # Errors
///
/// Returns a storage error if a read or write fails.
pub fn cascade<S: Storage + ?Sized>(
    storage: &mut S,
    header: &Header,
    timestamp: i64,
    from_index: usize,
) -> Result<usize> {
    let mut propagated = 0;
    for pair in header.archives[from_index..].windows(2) {
        match propagate(storage, header, timestamp, &pair[0], &pair[1])? {
            Propagation::Propagated => propagated += 1,
            Propagation::Insufficient => break,
        }
    }
    Ok(propagated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationMethod;
    use crate::layout;
    use crate::retention::RetentionDef;
    use crate::storage::MemoryStorage;

    fn setup(xff: f32, method: AggregationMethod) -> (MemoryStorage, Header) {
        let header = layout::plan(
            &[RetentionDef::new(60, 10), RetentionDef::new(240, 10), RetentionDef::new(960, 10)],
            xff,
            method,
        )
        .unwrap();
        let mut storage = MemoryStorage::new(usize::try_from(header.file_size()).unwrap());
        layout::initialize(&mut storage, &header).unwrap();
        (storage, header)
    }

    /// Writes fine points the way the write path would, anchored at the base.
    fn write_fine(storage: &mut MemoryStorage, header: &Header, points: &[(u32, f64)]) {
        let archive = header.archives[0];
        for &(ts, value) in points {
            let anchor = ring::read_anchor(storage, &archive).unwrap();
            let offset = ring::offset_for(&archive, &anchor, i64::from(ts));
            ring::write_point(storage, offset, &Point::new(ts, value)).unwrap();
        }
    }

    fn coarse_point(storage: &MemoryStorage, archive: &ArchiveInfo, ts: u32) -> Point {
        let anchor = ring::read_anchor(storage, archive).unwrap();
        let offset = ring::offset_for(archive, &anchor, i64::from(ts));
        ring::read_point(storage, offset).unwrap()
    }

    #[test]
    fn test_half_window_propagates() {
        let (mut storage, header) = setup(0.5, AggregationMethod::Average);
        write_fine(&mut storage, &header, &[(2400, 1.0), (2460, 3.0)]);

        let outcome = propagate(&mut storage, &header, 2460, &header.archives[0], &header.archives[1]).unwrap();
        assert_eq!(outcome, Propagation::Propagated);
        assert_eq!(coarse_point(&storage, &header.archives[1], 2400), Point::new(2400, 2.0));
    }

    #[test]
    fn test_below_threshold_does_not_propagate() {
        let (mut storage, header) = setup(0.5, AggregationMethod::Average);
        write_fine(&mut storage, &header, &[(2400, 1.0)]);

        let before = storage.clone();
        let outcome = propagate(&mut storage, &header, 2400, &header.archives[0], &header.archives[1]).unwrap();
        assert_eq!(outcome, Propagation::Insufficient);
        assert_eq!(storage, before);
    }

    #[test]
    fn test_fractional_threshold_is_exact() {
        let header = layout::plan(
            &[RetentionDef::new(1, 100), RetentionDef::new(10, 100)],
            0.3,
            AggregationMethod::Sum,
        )
        .unwrap();
        let mut storage = MemoryStorage::new(usize::try_from(header.file_size()).unwrap());
        layout::initialize(&mut storage, &header).unwrap();
        let fine = header.archives[0];
        for ts in [1000u32, 1004, 1009] {
            let anchor = ring::read_anchor(&storage, &fine).unwrap();
            let offset = ring::offset_for(&fine, &anchor, i64::from(ts));
            ring::write_point(&mut storage, offset, &Point::new(ts, 1.0)).unwrap();
        }
        let outcome = propagate(&mut storage, &header, 1009, &header.archives[0], &header.archives[1]).unwrap();
        assert_eq!(outcome, Propagation::Propagated);
        assert_eq!(coarse_point(&storage, &header.archives[1], 1000), Point::new(1000, 3.0));
    }

    #[test]
    fn test_empty_window_is_insufficient_even_at_zero() {
        let (mut storage, header) = setup(0.0, AggregationMethod::Sum);
        write_fine(&mut storage, &header, &[(2400, 1.0)]);
        // A window with nothing in it, three coarse slots later.
        let outcome = propagate(&mut storage, &header, 3120, &header.archives[0], &header.archives[1]).unwrap();
        assert_eq!(outcome, Propagation::Insufficient);
    }

    #[test]
    fn test_stale_slots_are_ignored() {
        let (mut storage, header) = setup(0.5, AggregationMethod::Max);
        // 2400 anchors the ring; 3000 is a full lap later and lands on the
        // same slot as 2400, then 3060 replaces 2460.
        write_fine(&mut storage, &header, &[(2400, 1.0), (2460, 2.0), (3000, 7.0), (3060, 8.0)]);

        // The window for 2400..2640 now holds 3000 and 3060, neither expected.
        let outcome = propagate(&mut storage, &header, 2400, &header.archives[0], &header.archives[1]).unwrap();
        assert_eq!(outcome, Propagation::Insufficient);

        let outcome = propagate(&mut storage, &header, 3060, &header.archives[0], &header.archives[1]).unwrap();
        assert_eq!(outcome, Propagation::Propagated);
        assert_eq!(coarse_point(&storage, &header.archives[1], 2880), Point::new(2880, 8.0));
    }

    #[test]
    fn test_last_uses_chronological_order_across_wrap() {
        let (mut storage, header) = setup(0.5, AggregationMethod::Last);
        // Anchor at 2520 puts 2400..2460 at the tail of the ring, so the
        // window for 2400 wraps.
        write_fine(&mut storage, &header, &[(2520, 3.0), (2400, 1.0), (2460, 2.0)]);
        let outcome = propagate(&mut storage, &header, 2400, &header.archives[0], &header.archives[1]).unwrap();
        assert_eq!(outcome, Propagation::Propagated);
        assert_eq!(coarse_point(&storage, &header.archives[1], 2400), Point::new(2400, 3.0));
    }

    #[test]
    fn test_cascade_through_all_tiers() {
        let (mut storage, header) = setup(0.5, AggregationMethod::Sum);
        let fine: Vec<(u32, f64)> = (0..8).map(|i| (1920 + i * 60, 1.0)).collect();
        write_fine(&mut storage, &header, &fine);
        // Fill the coarse window for 1920..2880 from the fine archive.
        for ts in [1920i64, 2160] {
            propagate(&mut storage, &header, ts, &header.archives[0], &header.archives[1]).unwrap();
        }

        assert_eq!(cascade(&mut storage, &header, 2340, 0).unwrap(), 2);
        assert_eq!(coarse_point(&storage, &header.archives[1], 2160), Point::new(2160, 4.0));
        assert_eq!(coarse_point(&storage, &header.archives[2], 1920), Point::new(1920, 8.0));
    }

    #[test]
    fn test_cascade_stops_at_insufficient() {
        let (mut storage, header) = setup(0.5, AggregationMethod::Average);
        write_fine(&mut storage, &header, &[(2400, 1.0), (2460, 1.0)]);
        // Second tier gets one point out of a window of four: not enough for
        // the third tier.
        assert_eq!(cascade(&mut storage, &header, 2460, 0).unwrap(), 1);
        let third = header.archives[2];
        assert!(ring::read_anchor(&storage, &third).unwrap().is_missing());
    }
}
