//! Ring addressing inside one archive.
//!
//! An archive is a circular buffer of 12-byte slots. Nothing records where
//! the "head" is; instead every offset is derived from the *anchor*, the point
//! currently stored in the archive's base slot:
//!
//! ```text
//! distance = (target - anchor.timestamp) / seconds_per_point * 12
//! offset   = archive.offset + (distance mod archive.size)
//! ```
//!
//! The modulus is non-negative, so targets older than the anchor wrap
//! backwards into the tail of the archive. An archive whose anchor is missing
//! has never been written, and its only defined target is the base slot.
//!
//! Contiguous ranges that run past the end of the archive continue at its
//! base: one read or write for the part up to the end, one for the rest.

use crate::error::Result;
use crate::header::ArchiveInfo;
use crate::point::{POINT_SIZE, Point};
use crate::storage::Storage;

/// Reads the point at an absolute byte offset.
///
/// # Errors
///
/// Returns a storage error if the read fails.
pub fn read_point<S: Storage + ?Sized>(storage: &S, offset: u64) -> Result<Point> {
    let mut buf = [0u8; POINT_SIZE];
    storage.read_at(offset, &mut buf)?;
    Ok(Point::decode(&buf))
}

/// Writes a point at an absolute byte offset.
///
/// # Errors
///
/// Returns a storage error if the write fails.
pub fn write_point<S: Storage + ?Sized>(storage: &mut S, offset: u64, point: &Point) -> Result<()> {
    storage.write_at(offset, &point.encode())
}

/// Reads the anchor (base slot) of an archive.
///
/// # Errors
///
/// Returns a storage error if the read fails.
pub fn read_anchor<S: Storage + ?Sized>(storage: &S, archive: &ArchiveInfo) -> Result<Point> {
    read_point(storage, u64::from(archive.offset))
}

/// Byte offset of the slot for `interval`, relative to `anchor`.
///
/// `interval` must already be aligned to the archive's interval. A missing
/// anchor maps everything to the base slot.
pub fn offset_for(archive: &ArchiveInfo, anchor: &Point, interval: i64) -> u64 {
    if anchor.is_missing() {
        return u64::from(archive.offset);
    }
    let step = i64::from(archive.seconds_per_point);
    let slots = (interval - i64::from(anchor.timestamp)).div_euclid(step);
    // rem_euclid yields a slot index in [0, points).
    #[allow(clippy::cast_sign_loss)]
    let slot = slots.rem_euclid(i64::from(archive.points)) as u64;
    u64::from(archive.offset) + slot * POINT_SIZE as u64
}

/// Reads `count` consecutive slots starting at `from_offset`, wrapping at the
/// archive end.
///
/// When `count` does not exceed the archive capacity this takes at most two
/// reads.
///
/// # Errors
///
/// Returns a storage error if a read fails.
pub fn read_span<S: Storage + ?Sized>(
    storage: &S,
    archive: &ArchiveInfo,
    from_offset: u64,
    count: usize,
) -> Result<Vec<Point>> {
    let mut bytes = vec![0u8; count * POINT_SIZE];
    let mut filled = 0;
    let mut offset = from_offset;
    while filled < bytes.len() {
        let room = archive.end() - offset;
        // Bounded by the remaining buffer length.
        #[allow(clippy::cast_possible_truncation)]
        let len = room.min((bytes.len() - filled) as u64) as usize;
        storage.read_at(offset, &mut bytes[filled..filled + len])?;
        filled += len;
        offset = u64::from(archive.offset);
    }
    Ok(Point::decode_all(&bytes))
}

/// Writes consecutive points starting at `from_offset`, wrapping at the
/// archive end.
///
/// # Errors
///
/// Returns a storage error if a write fails.
pub fn write_span<S: Storage + ?Sized>(
    storage: &mut S,
    archive: &ArchiveInfo,
    from_offset: u64,
    points: &[Point],
) -> Result<()> {
    let bytes: Vec<u8> = points.iter().flat_map(|p| p.encode()).collect();
    let mut written = 0;
    let mut offset = from_offset;
    while written < bytes.len() {
        let room = archive.end() - offset;
        #[allow(clippy::cast_possible_truncation)]
        let len = room.min((bytes.len() - written) as u64) as usize;
        storage.write_at(offset, &bytes[written..written + len])?;
        written += len;
        offset = u64::from(archive.offset);
    }
    Ok(())
}

/// Replaces every slot whose timestamp is not the expected one with
/// [`Point::MISSING`].
///
/// Slot `i` is expected to hold `first_interval + i * step`. Stale slots left
/// over from an earlier lap of the ring fail this check.
pub fn validate_span(points: &mut [Point], first_interval: i64, step: u32) {
    let mut expected = first_interval;
    for point in points.iter_mut() {
        if i64::from(point.timestamp) != expected {
            *point = Point::MISSING;
        }
        expected += i64::from(step);
    }
}
