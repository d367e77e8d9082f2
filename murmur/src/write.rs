//! Write engine: storing points and driving propagation.
//!
//! A point goes into the finest archive whose retention covers its age
//! (`now - timestamp`), aligned down to that archive's interval. The write
//! then cascades into coarser archives through [`crate::propagate`].
//!
//! Both entry points work on any [`Storage`] and take the current time as an
//! argument, so they are deterministic under test.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, UpdateError};
use crate::header::{ArchiveInfo, Header};
use crate::options::FutureWrites;
use crate::point::Point;
use crate::propagate::{self, Propagation};
use crate::ring;
use crate::storage::Storage;

/// Checks that a point `timestamp` may be written at `now`.
fn check_age(header: &Header, timestamp: u32, now: u32, future: FutureWrites) -> Result<i64> {
    let age = i64::from(now) - i64::from(timestamp);
    if age >= 0 && age >= i64::from(header.max_retention()) {
        return Err(UpdateError::TimestampNotCovered {
            timestamp,
            now,
            max_retention: header.max_retention(),
        }
        .into());
    }
    if age < 0 && future == FutureWrites::Reject {
        return Err(UpdateError::FutureTimestamp { timestamp, now }.into());
    }
    Ok(age)
}

/// Converts an aligned interval back into a stored timestamp.
///
/// Intervals come from aligning a `u32` down to a positive step, so they are
/// always within `0..=u32::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stored(interval: i64) -> u32 {
    interval as u32
}

/// Writes one point and propagates it.
///
/// # Errors
///
/// Returns [`UpdateError::TimestampNotCovered`] if the point is at least
/// `max_retention` seconds old, [`UpdateError::FutureTimestamp`] if it is in
/// the future and `future` is [`FutureWrites::Reject`], or a storage error.
pub fn update_point<S: Storage + ?Sized>(
    storage: &mut S,
    header: &Header,
    value: f64,
    timestamp: u32,
    now: u32,
    future: FutureWrites,
) -> Result<()> {
    let age = check_age(header, timestamp, now, future)?;
    let Some((index, archive)) = header.archive_for_age(age) else {
        return Err(UpdateError::TimestampNotCovered {
            timestamp,
            now,
            max_retention: header.max_retention(),
        }
        .into());
    };

    let interval = archive.align(i64::from(timestamp));
    let anchor = ring::read_anchor(storage, archive)?;
    let offset = ring::offset_for(archive, &anchor, interval);
    ring::write_point(storage, offset, &Point::new(stored(interval), value))?;

    let propagated = propagate::cascade(storage, header, interval, index)?;
    tracing::debug!(
        timestamp,
        interval,
        archive = index,
        propagated,
        "updated point"
    );
    Ok(())
}

/// Writes a batch of points and propagates them.
///
/// Each point is routed to the finest archive covering its age. Points at
/// least `max_retention` seconds old are dropped. Within one archive, points
/// aligning to the same interval keep the newest timestamp's value, and for
/// identical timestamps the one given last.
///
/// Returns the number of slots written across all archives.
///
/// # Errors
///
/// Returns [`UpdateError::FutureTimestamp`] before writing anything if a
/// point is in the future and `future` is [`FutureWrites::Reject`], or a
/// storage error.
pub fn update_many<S: Storage + ?Sized>(
    storage: &mut S,
    header: &Header,
    points: &[(u32, f64)],
    now: u32,
    future: FutureWrites,
) -> Result<usize> {
    if future == FutureWrites::Reject
        && let Some(&(timestamp, _)) = points.iter().find(|(ts, _)| *ts > now)
    {
        return Err(UpdateError::FutureTimestamp { timestamp, now }.into());
    }

    let mut ordered = points.to_vec();
    ordered.sort_by_key(|&(ts, _)| ts);

    let mut routed: Vec<Vec<(u32, f64)>> = vec![Vec::new(); header.archives.len()];
    let mut dropped = 0usize;
    for &(timestamp, value) in &ordered {
        let age = i64::from(now) - i64::from(timestamp);
        let covered = age < 0 || age < i64::from(header.max_retention());
        match header.archive_for_age(age) {
            Some((index, _)) if covered => routed[index].push((timestamp, value)),
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::warn!(dropped, now, "dropped points older than every archive");
    }

    let mut written = 0;
    for (index, batch) in routed.iter().enumerate() {
        if !batch.is_empty() {
            written += write_archive(storage, header, index, batch)?;
        }
    }
    Ok(written)
}

/// Writes points already routed to archive `index`, then propagates the
/// coarser archives they touch.
fn write_archive<S: Storage + ?Sized>(
    storage: &mut S,
    header: &Header,
    index: usize,
    batch: &[(u32, f64)],
) -> Result<usize> {
    let archive = &header.archives[index];
    let step = i64::from(archive.seconds_per_point);

    // Ascending input order, so later entries win.
    let aligned: BTreeMap<i64, f64> = batch
        .iter()
        .map(|&(ts, value)| (archive.align(i64::from(ts)), value))
        .collect();

    let runs = contiguous_runs(&aligned, step);
    let mut anchor = ring::read_anchor(storage, archive)?;
    if anchor.is_missing()
        && let Some(first) = runs.first()
    {
        // An empty archive is anchored by the oldest run.
        anchor = first[0];
    }
    for run in &runs {
        let offset = ring::offset_for(archive, &anchor, i64::from(run[0].timestamp));
        ring::write_span(storage, archive, offset, run)?;
    }
    tracing::debug!(
        archive = index,
        points = aligned.len(),
        runs = runs.len(),
        "wrote batch"
    );

    let mut higher = archive;
    for lower in &header.archives[index + 1..] {
        if !propagate_intervals(storage, header, aligned.keys(), higher, lower)? {
            break;
        }
        higher = lower;
    }
    Ok(aligned.len())
}

/// Propagates every distinct `lower` interval touched by `intervals`.
///
/// Returns `true` if at least one window propagated.
fn propagate_intervals<'a, S: Storage + ?Sized>(
    storage: &mut S,
    header: &Header,
    intervals: impl Iterator<Item = &'a i64>,
    higher: &ArchiveInfo,
    lower: &ArchiveInfo,
) -> Result<bool> {
    let lower_intervals: BTreeSet<i64> = intervals.map(|&i| lower.align(i)).collect();
    let mut any = false;
    for interval in lower_intervals {
        if propagate::propagate(storage, header, interval, higher, lower)? == Propagation::Propagated {
            any = true;
        }
    }
    Ok(any)
}

/// Groups sorted aligned points into runs of consecutive intervals.
fn contiguous_runs(aligned: &BTreeMap<i64, f64>, step: i64) -> Vec<Vec<Point>> {
    let mut runs: Vec<Vec<Point>> = Vec::new();
    let mut previous: Option<i64> = None;
    for (&interval, &value) in aligned {
        let point = Point::new(stored(interval), value);
        let extends = previous.is_some_and(|prev| interval == prev + step);
        previous = Some(interval);
        if extends && let Some(run) = runs.last_mut() {
            run.push(point);
            continue;
        }
        runs.push(vec![point]);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MurmurError;
    use crate::aggregate::AggregationMethod;
    use crate::layout;
    use crate::retention::RetentionDef;
    use crate::storage::MemoryStorage;

    const NOW: u32 = 1_700_000_040;

    fn setup(defs: &[(u32, u32)], xff: f32, method: AggregationMethod) -> (MemoryStorage, Header) {
        let defs: Vec<RetentionDef> = defs.iter().map(|&(s, p)| RetentionDef::new(s, p)).collect();
        let header = layout::plan(&defs, xff, method).unwrap();
        let mut storage = MemoryStorage::new(usize::try_from(header.file_size()).unwrap());
        layout::initialize(&mut storage, &header).unwrap();
        (storage, header)
    }

    fn slot(storage: &MemoryStorage, archive: &ArchiveInfo, ts: i64) -> Point {
        let anchor = ring::read_anchor(storage, archive).unwrap();
        ring::read_point(storage, ring::offset_for(archive, &anchor, ts)).unwrap()
    }

    #[test]
    fn test_first_write_seeds_anchor() {
        let (mut storage, header) = setup(&[(60, 10)], 0.5, AggregationMethod::Average);
        update_point(&mut storage, &header, 4.0, NOW - 5, NOW, FutureWrites::Accept).unwrap();

        let anchor = ring::read_anchor(&storage, &header.archives[0]).unwrap();
        assert_eq!(anchor, Point::new(1_699_999_980, 4.0));
    }

    #[test]
    fn test_write_is_idempotent() {
        let (mut once, header) = setup(&[(60, 10), (300, 12)], 0.5, AggregationMethod::Sum);
        update_point(&mut once, &header, 2.0, NOW - 100, NOW, FutureWrites::Accept).unwrap();

        let mut twice = once.clone();
        update_point(&mut twice, &header, 2.0, NOW - 100, NOW, FutureWrites::Accept).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_too_old_rejected() {
        let (mut storage, header) = setup(&[(60, 10)], 0.5, AggregationMethod::Average);
        let before = storage.clone();
        let err = update_point(&mut storage, &header, 1.0, NOW - 600, NOW, FutureWrites::Accept).unwrap_err();
        assert!(matches!(
            err,
            MurmurError::Update(UpdateError::TimestampNotCovered { max_retention: 600, .. })
        ));
        assert_eq!(storage, before);

        update_point(&mut storage, &header, 1.0, NOW - 599, NOW, FutureWrites::Accept).unwrap();
    }

    #[test]
    fn test_future_policy() {
        let (mut storage, header) = setup(&[(60, 10)], 0.5, AggregationMethod::Average);
        update_point(&mut storage, &header, 1.0, NOW + 120, NOW, FutureWrites::Accept).unwrap();

        let err = update_point(&mut storage, &header, 1.0, NOW + 120, NOW, FutureWrites::Reject).unwrap_err();
        assert!(matches!(err, MurmurError::Update(UpdateError::FutureTimestamp { .. })));
    }

    #[test]
    fn test_old_point_goes_to_coarser_archive() {
        let (mut storage, header) = setup(&[(60, 10), (300, 12)], 0.5, AggregationMethod::Average);
        update_point(&mut storage, &header, 9.0, NOW - 1000, NOW, FutureWrites::Accept).unwrap();

        assert!(ring::read_anchor(&storage, &header.archives[0]).unwrap().is_missing());
        let coarse = header.archives[1];
        let interval = coarse.align(i64::from(NOW - 1000));
        assert_eq!(slot(&storage, &coarse, interval), Point::new(stored(interval), 9.0));
    }

    #[test]
    fn test_cascade_from_single_writes() {
        let (mut storage, header) = setup(&[(60, 10), (300, 12)], 0.5, AggregationMethod::Average);
        let fine = header.archives[0];
        let coarse = header.archives[1];
        let base = coarse.align(i64::from(NOW) - 300);

        // Three of five fine slots: 0.6 >= 0.5, so the coarse slot fills.
        for (i, value) in [(0, 1.0), (1, 2.0), (2, 6.0)] {
            let ts = stored(base + i * 60);
            update_point(&mut storage, &header, value, ts, NOW, FutureWrites::Accept).unwrap();
        }
        assert_eq!(slot(&storage, &fine, base + 120), Point::new(stored(base + 120), 6.0));
        assert_eq!(slot(&storage, &coarse, base), Point::new(stored(base), 3.0));
    }

    #[test]
    fn test_batch_matches_single_updates() {
        let points: Vec<(u32, f64)> = (0..6).map(|i| (NOW - 500 + i * 60, f64::from(i))).collect();

        let (mut single, header) = setup(&[(60, 10), (300, 12)], 0.5, AggregationMethod::Average);
        for &(ts, value) in &points {
            update_point(&mut single, &header, value, ts, NOW, FutureWrites::Accept).unwrap();
        }

        let (mut batch, _) = setup(&[(60, 10), (300, 12)], 0.5, AggregationMethod::Average);
        let written = update_many(&mut batch, &header, &points, NOW, FutureWrites::Accept).unwrap();

        assert_eq!(written, 6);
        assert_eq!(single, batch);
    }

    #[test]
    fn test_batch_routes_and_drops() {
        let (mut storage, header) = setup(&[(60, 10), (300, 12)], 0.5, AggregationMethod::Sum);
        let points = [
            (NOW - 30, 1.0),    // fine
            (NOW - 2000, 2.0),  // coarse
            (NOW - 3600, 3.0),  // exactly max retention: dropped
            (NOW - 99_999, 4.0), // dropped
        ];
        let written = update_many(&mut storage, &header, &points, NOW, FutureWrites::Accept).unwrap();
        assert_eq!(written, 2);

        let fine = header.archives[0];
        let coarse = header.archives[1];
        let fine_interval = fine.align(i64::from(NOW - 30));
        let coarse_interval = coarse.align(i64::from(NOW - 2000));
        assert_eq!(slot(&storage, &fine, fine_interval).value, 1.0);
        assert_eq!(slot(&storage, &coarse, coarse_interval).value, 2.0);
    }

    #[test]
    fn test_batch_duplicates_newest_wins() {
        let (mut storage, header) = setup(&[(60, 10)], 0.5, AggregationMethod::Average);
        let base = stored(header.archives[0].align(i64::from(NOW) - 120));
        let points = [(base + 10, 2.0), (base, 1.0), (base + 10, 3.0)];
        let written = update_many(&mut storage, &header, &points, NOW, FutureWrites::Accept).unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            slot(&storage, &header.archives[0], i64::from(base)),
            Point::new(base, 3.0)
        );
    }

    #[test]
    fn test_batch_with_gaps_and_wrap() {
        let (mut storage, header) = setup(&[(60, 5), (120, 10)], 0.5, AggregationMethod::Max);
        let fine = header.archives[0];
        let start = stored(fine.align(i64::from(NOW) - 240));
        // Anchor one step after `start`, so the run starting at `start` sits
        // in the last slot and wraps onto the base slot.
        update_point(&mut storage, &header, 0.0, start + 60, NOW, FutureWrites::Accept).unwrap();

        let points = [(start, 1.0), (start + 60, 2.0), (start + 180, 4.0)];
        update_many(&mut storage, &header, &points, NOW, FutureWrites::Accept).unwrap();

        assert_eq!(ring::read_point(&storage, fine.end() - 12).unwrap(), Point::new(start, 1.0));
        assert_eq!(ring::read_anchor(&storage, &fine).unwrap(), Point::new(start + 60, 2.0));
        assert!(slot(&storage, &fine, i64::from(start + 120)).is_missing());
        assert_eq!(slot(&storage, &fine, i64::from(start + 180)).value, 4.0);
    }

    #[test]
    fn test_batch_future_rejected_up_front() {
        let (mut storage, header) = setup(&[(60, 10)], 0.5, AggregationMethod::Average);
        let before = storage.clone();
        let points = [(NOW - 60, 1.0), (NOW + 60, 2.0)];
        assert!(update_many(&mut storage, &header, &points, NOW, FutureWrites::Reject).is_err());
        assert_eq!(storage, before);
    }

    #[test]
    fn test_contiguous_runs() {
        let aligned: BTreeMap<i64, f64> = [(60, 1.0), (120, 2.0), (240, 4.0), (300, 5.0), (420, 7.0)]
            .into_iter()
            .collect();
        let runs = contiguous_runs(&aligned, 60);
        let starts: Vec<u32> = runs.iter().map(|r| r[0].timestamp).collect();
        let lengths: Vec<usize> = runs.iter().map(Vec::len).collect();
        assert_eq!(starts, vec![60, 240, 420]);
        assert_eq!(lengths, vec![2, 2, 1]);
    }
}
