//! Integration tests for file creation and header inspection.
//!
//! These tests create real files through the store and check that the
//! header read back describes the layout that was asked for.

use murmur::error::{AggregationError, ConfigurationError, CorruptFileError};
use murmur::{AggregationMethod, ManualClock, MurmurError, Options, RetentionDef, Store};
use tempfile::tempdir;

const NOW: u32 = 1_700_000_000;

fn store(options: Options) -> Store<ManualClock> {
    Store::with_clock(options, ManualClock::new(NOW))
}

fn parse(defs: &[&str]) -> Vec<RetentionDef> {
    defs.iter().map(|s| s.parse().unwrap()).collect()
}

#[test]
fn test_single_archive_layout() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("yearly.wsp");
    let store = store(Options::default());

    store
        .create(&path, &parse(&["12h:2y"]), 0.5, AggregationMethod::Average)
        .unwrap();
    let header = store.info(&path).unwrap();

    assert_eq!(header.archives.len(), 1);
    let archive = &header.archives[0];
    assert_eq!(archive.seconds_per_point, 43_200);
    assert_eq!(archive.points, 1460);
    assert_eq!(archive.offset, 28);
    assert_eq!(archive.size(), 17_520);
    assert_eq!(archive.retention(), 63_072_000);
    assert_eq!(header.max_retention(), 63_072_000);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 28 + 17_520);
}

#[test]
fn test_multi_archive_layout() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("tiers.wsp");
    let store = store(Options::default());

    // Declared out of order; the file is always finest first.
    let created = store
        .create(&path, &parse(&["1d:1y", "1m:1d", "1h:7d"]), 0.25, AggregationMethod::Max)
        .unwrap();
    let header = store.info(&path).unwrap();
    assert_eq!(created, header);

    let layout: Vec<(u32, u32, u32)> = header
        .archives
        .iter()
        .map(|a| (a.offset, a.seconds_per_point, a.points))
        .collect();
    assert_eq!(
        layout,
        vec![(52, 60, 1440), (17_332, 3600, 168), (19_348, 86_400, 365)]
    );
    assert_eq!(header.max_retention(), 31_536_000);
    assert_eq!(header.aggregation_method(), AggregationMethod::Max);
    assert!((header.completeness_factor() - 0.25).abs() < f32::EPSILON);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 23_728);
}

#[test]
fn test_new_file_is_all_missing() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("empty.wsp");
    let store = store(Options::default());

    store
        .create(&path, &parse(&["60:1440"]), 0.5, AggregationMethod::Average)
        .unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes[28..].iter().all(|&b| b == 0));

    let range = store.fetch(&path, None, None).unwrap();
    assert_eq!(range.len(), 1440);
    assert!(range.values().all(|(_, v)| v.is_none()));
}

#[test]
fn test_existing_file_is_not_overwritten() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("taken.wsp");
    std::fs::write(&path, b"keep me").unwrap();
    let store = store(Options::default());

    let result = store.create(&path, &parse(&["60:10"]), 0.5, AggregationMethod::Average);
    assert!(matches!(
        result,
        Err(MurmurError::Configuration(ConfigurationError::AlreadyExists { .. }))
    ));
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
}

#[test]
fn test_invalid_declarations() {
    let temp_dir = tempdir().unwrap();
    let store = store(Options::default());
    let cases: [(&[&str], f32); 4] = [
        (&[], 0.5),
        (&["60:10", "60:20"], 0.5),
        // 15 minutes for 2 hours cannot follow a full day of minutes.
        (&["60:1440", "15m:8"], 0.5),
        (&["60:10"], 1.5),
    ];

    for (i, (defs, xff)) in cases.iter().enumerate() {
        let path = temp_dir.path().join(format!("bad-{i}.wsp"));
        let result = store.create(&path, &parse(defs), *xff, AggregationMethod::Average);
        assert!(
            matches!(result, Err(MurmurError::Configuration(_))),
            "case {i} should be rejected"
        );
        assert!(!path.exists(), "case {i} left a file behind");
    }
}

#[test]
fn test_truncated_file_is_corrupt() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("short.wsp");
    let store = store(Options::default());
    store
        .create(&path, &parse(&["60:10"]), 0.5, AggregationMethod::Average)
        .unwrap();

    // Cut the data region short.
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 12]).unwrap();
    assert!(matches!(
        store.info(&path),
        Err(MurmurError::CorruptFile(CorruptFileError::Truncated { .. }))
    ));

    // And the header itself.
    std::fs::write(&path, &bytes[..10]).unwrap();
    assert!(matches!(
        store.info(&path),
        Err(MurmurError::CorruptFile(CorruptFileError::Truncated { .. }))
    ));
}

#[test]
fn test_unknown_aggregation_code_is_rejected() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("agg.wsp");
    let store = store(Options::default());
    store
        .create(&path, &parse(&["60:10"]), 0.5, AggregationMethod::Average)
        .unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[..4].copy_from_slice(&9i32.to_be_bytes());
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        store.info(&path),
        Err(MurmurError::Aggregation(AggregationError::UnknownCode { code: 9 }))
    ));
    assert!(store.update(&path, 1.0, None).is_err());
}

#[test]
fn test_set_aggregation_method_only_touches_method() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("method.wsp");
    let store = store(Options::default());
    store
        .create(&path, &parse(&["60:10", "300:12"]), 0.5, AggregationMethod::Average)
        .unwrap();
    store.update(&path, 4.0, Some(NOW - 60)).unwrap();
    let before = std::fs::read(&path).unwrap();

    store.set_aggregation_method(&path, AggregationMethod::Last).unwrap();
    let after = std::fs::read(&path).unwrap();

    assert_eq!(&after[..4], &3i32.to_be_bytes());
    assert_eq!(&after[4..], &before[4..]);
    assert_eq!(store.info(&path).unwrap().aggregation_method(), AggregationMethod::Last);
}

#[test]
fn test_cached_headers_follow_method_changes() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("cached.wsp");
    let store = store(Options {
        cache_headers: true,
        ..Options::default()
    });
    store
        .create(&path, &parse(&["60:10"]), 0.5, AggregationMethod::Average)
        .unwrap();

    for method in AggregationMethod::ALL {
        store.set_aggregation_method(&path, method).unwrap();
        assert_eq!(store.info(&path).unwrap().aggregation_method(), method);
    }
    assert!(store.cache().get(&path).is_some());
}

#[test]
fn test_stores_share_one_header_cache() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("shared.wsp");
    let cached = Options {
        cache_headers: true,
        ..Options::default()
    };
    let first = store(cached);
    let second = store(cached);

    first
        .create(&path, &parse(&["60:10", "300:12"]), 0.5, AggregationMethod::Average)
        .unwrap();
    assert_eq!(first.info(&path).unwrap().aggregation_method(), AggregationMethod::Average);

    second.set_aggregation_method(&path, AggregationMethod::Max).unwrap();
    assert_eq!(first.info(&path).unwrap().aggregation_method(), AggregationMethod::Max);

    // Propagation through the first store uses the new method too.
    let window = NOW - 500;
    for (i, value) in (0u32..).zip([1.0, 9.0, 4.0]) {
        first.update(&path, value, Some(window + 60 * i)).unwrap();
    }
    let range = first.fetch(&path, Some(NOW - 3000), None).unwrap();
    assert_eq!(range.step, 300);
    let known: Vec<(i64, f64)> = range
        .values()
        .filter_map(|(ts, v)| v.map(|v| (ts, v)))
        .collect();
    assert_eq!(known, vec![(i64::from(window), 9.0)]);
}
