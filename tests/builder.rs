use std::{collections::BTreeMap, io::Cursor};

use temp_dir::TempDir;

use node_index::{
    builder::{load_manifest, BuilderOptions, ChunkedIdBuffer, IndexBuilder, IndexFormat},
    error::Error,
    handler::TaggingHandler,
    index::{IndexSet, NodeIndex, SortedU64Index},
    schema::{FeatureSpecs, Tags},
};

/// Initialize the logger
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const RECORDS: &str = "\
# id tags...
1 highway=traffic_signals
2 highway=stop
3
4 crossing=traffic_signals traffic_calming=bump
5 highway=residential
1 highway=traffic_signals
4294967296 highway=stop
1099511627776 traffic_calming=table
";

#[test]
fn test_scan_and_build() {
    init_logger();
    let tmp = TempDir::new().expect("Could not create temporary directory");
    let out = TempDir::new().expect("Could not create temporary directory");

    let mut handler = TaggingHandler::new(FeatureSpecs::default_specs(), tmp.path(), 2).unwrap();
    handler.scan(Cursor::new(RECORDS)).unwrap();

    let stats = handler.statistics();
    assert_eq!(stats.nodes_processed, 8);
    assert_eq!(stats.nodes_matched, 6);
    assert_eq!(stats.feature_counts["signals"], 3);
    assert_eq!(stats.feature_counts["stops"], 2);
    assert_eq!(stats.feature_counts["calming"], 2);

    let options = BuilderOptions {
        flush_threshold: 2,
        external_sort_threshold: 1,
        ..Default::default()
    };
    let chunk_paths = handler.chunk_paths().unwrap();
    let manifest = IndexBuilder::new(out.path(), tmp.path(), IndexFormat::Both, &options)
        .unwrap()
        .build(&chunk_paths, &stats.feature_counts)
        .unwrap();

    assert_eq!(manifest.features["signals"].raw_count, 3);
    assert_eq!(manifest.features["signals"].unique_count, 2);
    assert_eq!(
        manifest.features["calming"].files,
        vec!["calming.u64".to_string(), "calming.roar".to_string()]
    );
    assert_eq!(load_manifest(out.path()).unwrap(), manifest);

    // Chunks are consumed by the build
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);

    let set = IndexSet::load_dir(out.path()).unwrap();
    let queries = [1, 2, 4, 5, 1 << 32, 1 << 40, 1 << 40];
    assert!(set.cross_check(&queries).unwrap().is_empty());
    for backend in set.backends() {
        assert_eq!(backend.count("signals", &queries).unwrap(), 2);
        assert_eq!(backend.count("stops", &queries).unwrap(), 2);
        assert_eq!(backend.count("calming", &queries).unwrap(), 3);
        assert!(!backend.contains("stops", 5).unwrap());
    }

    let roaring = set.roaring.as_ref().unwrap();
    assert!(roaring.bitmap("stops").unwrap().is_64bit());
    assert!(!roaring.bitmap("signals").unwrap().is_64bit());
}

#[test]
fn test_handler_records() {
    let tmp = TempDir::new().expect("Could not create temporary directory");
    let specs = FeatureSpecs::select(&["stops", "give_way"]).unwrap();
    let mut handler = TaggingHandler::new(specs, tmp.path(), 100).unwrap();

    let mut tags = Tags::new();
    handler.node(10, &tags).unwrap();
    tags.insert("highway".to_string(), "give_way".to_string());
    handler.node(11, &tags).unwrap();
    tags.insert("highway".to_string(), "traffic_signals".to_string());
    handler.node(12, &tags).unwrap();

    let stats = handler.statistics();
    assert_eq!(stats.nodes_processed, 3);
    assert_eq!(stats.nodes_matched, 1);
    assert_eq!(stats.feature_counts["give_way"], 1);
    assert_eq!(stats.feature_counts["stops"], 0);

    let chunks = handler.chunk_paths().unwrap();
    assert_eq!(chunks["give_way"].len(), 1);
    assert!(chunks["stops"].is_empty());
}

#[test]
fn test_scan_reports_line() {
    let tmp = TempDir::new().expect("Could not create temporary directory");
    let mut handler = TaggingHandler::new(FeatureSpecs::default_specs(), tmp.path(), 10).unwrap();
    let result = handler.scan(Cursor::new("1 highway=stop\n\nx highway=stop\n"));
    assert!(matches!(result, Err(Error::InvalidRecord { line: 3, .. })));
}

/// Chunks are indexed even when no raw count is given for the feature
#[test]
fn test_build_without_raw_counts() {
    let tmp = TempDir::new().expect("Could not create temporary directory");
    let out = TempDir::new().expect("Could not create temporary directory");

    let mut buffer = ChunkedIdBuffer::new("signals", tmp.path(), 2).unwrap();
    for id in [3, 1, 2] {
        buffer.add(id).unwrap();
    }
    let chunk_paths = BTreeMap::from([("signals".to_string(), buffer.chunk_paths().unwrap())]);

    let options = BuilderOptions::default();
    let manifest = IndexBuilder::new(out.path(), tmp.path(), IndexFormat::SortedU64, &options)
        .unwrap()
        .build(&chunk_paths, &BTreeMap::new())
        .unwrap();

    assert_eq!(manifest.features["signals"].unique_count, 3);
    assert_eq!(manifest.features["signals"].raw_count, 0);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);

    let index = SortedU64Index::load_dir(out.path()).unwrap();
    assert_eq!(index.size("signals").unwrap(), 3);
    assert_eq!(index.count("signals", &[1, 2, 3]).unwrap(), 3);
}
