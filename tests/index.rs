use std::collections::BTreeSet;

use log::debug;
use rand::{rngs::StdRng, SeedableRng};
use rstest::rstest;
use temp_dir::TempDir;

use helpers::{ids::random_ids, index::TestIndex};
use node_index::{
    base::{write_ids_to_path, NodeId, ROAR64_MAGIC},
    builder::{load_manifest, BuilderOptions, IndexFormat},
    error::Error,
    index::{IndexSet, NodeIndex, RoaringIndex, SortedU64Index},
    writers::{IndexWriter, RoaringWriter, SortedU64Writer},
};

/// Initialize the logger
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn check_backend(index: &dyn NodeIndex, data: &TestIndex, queries: &[NodeId]) {
    assert_eq!(
        index.available_features(),
        data.expected.keys().cloned().collect::<Vec<_>>()
    );

    for (feature, expected) in data.expected.iter() {
        debug!("Checking {} on .{}", feature, index.extension());
        assert_eq!(index.size(feature).unwrap(), expected.len() as u64);
        for id in expected.iter() {
            assert!(index.contains(feature, *id).unwrap(), "{} not in {}", id, feature);
        }
        assert_eq!(
            index.count(feature, queries).unwrap(),
            data.expected_count(feature, queries)
        );
    }

    let counts = index.count_all(queries).unwrap();
    assert_eq!(counts.len(), data.expected.len());
}

#[rstest]
#[case(1000, 0, 1 << 20)]
#[case(1000, 0, u64::MAX)]
#[case(20_000, 1 << 33, (1 << 33) + 50_000)]
fn test_backends_agree(#[case] id_count: usize, #[case] min: NodeId, #[case] max: NodeId) {
    init_logger();
    let options = BuilderOptions {
        flush_threshold: 333,
        external_sort_threshold: 1000,
        ..Default::default()
    };

    let mut rng = StdRng::seed_from_u64(id_count as u64);
    let features = vec![
        ("signals", random_ids(id_count, min, max, &mut rng)),
        ("stops", random_ids(id_count / 2, min, max, &mut rng)),
        ("calming", Vec::new()),
    ];
    let data = TestIndex::new(&features, IndexFormat::Both, &options);

    // Queries mix members, repeats and likely non-members
    let mut queries = random_ids(500, min, max, &mut rng);
    queries.extend(features[0].1.iter().take(100));
    queries.extend(features[0].1.iter().take(10));

    let sorted = SortedU64Index::load_dir(data.path()).unwrap();
    let in_memory = SortedU64Index::load_dir_with(data.path(), true).unwrap();
    let roaring = RoaringIndex::load_dir(data.path()).unwrap();

    check_backend(&sorted, &data, &queries);
    check_backend(&in_memory, &data, &queries);
    check_backend(&roaring, &data, &queries);

    let set = IndexSet::load_dir(data.path()).unwrap();
    assert_eq!(set.backends().len(), 2);
    assert!(set.cross_check(&queries).unwrap().is_empty());
}

#[test]
fn test_random_index_manifest() {
    let options = BuilderOptions::default();
    let data = TestIndex::random(3, 2000, 5000, Some(5), IndexFormat::Roaring, &options);

    let manifest = load_manifest(data.path()).unwrap();
    assert_eq!(manifest, data.manifest);
    assert_eq!(manifest.format, IndexFormat::Roaring);
    for (feature, expected) in data.expected.iter() {
        let summary = &manifest.features[feature];
        assert_eq!(summary.raw_count, 2000);
        assert_eq!(summary.unique_count, expected.len() as u64);
        assert_eq!(summary.files, vec![format!("{}.roar", feature)]);
    }

    // Only the roaring files were written
    assert!(SortedU64Index::load_dir(data.path())
        .unwrap()
        .available_features()
        .is_empty());
    let set = IndexSet::load_dir(data.path()).unwrap();
    assert!(set.sorted.is_none());
    assert!(set.cross_check(&[1, 2, 3]).unwrap().is_empty());
}

#[test]
fn test_unknown_feature() {
    let data = TestIndex::new(
        &[("signals", vec![1, 2, 3])],
        IndexFormat::Both,
        &BuilderOptions::default(),
    );

    let set = IndexSet::load_dir(data.path()).unwrap();
    for backend in set.backends() {
        match backend.contains("bogus", 1) {
            Err(Error::UnknownFeature { feature, available }) => {
                assert_eq!(feature, "bogus");
                assert_eq!(available, vec!["signals".to_string()]);
            }
            other => panic!("Unexpected result {:?}", other.map_err(|e| e.to_string())),
        }
        assert!(backend.count("bogus", &[1]).is_err());
        assert!(backend.size("bogus").is_err());
    }
}

#[test]
fn test_extended_groups() {
    let dir = TempDir::new().expect("Could not create temporary directory");
    let ids: Vec<NodeId> = vec![1 << 40, (1 << 40) + 100, 1 << 50];

    let path = RoaringWriter::new(dir.path())
        .unwrap()
        .write("far", &ids)
        .unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..8], ROAR64_MAGIC);
    assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 2);

    let index = RoaringIndex::load_file(&path, None).unwrap();
    assert!(index.bitmap("far").unwrap().is_64bit());
    for id in ids.iter() {
        assert!(index.contains("far", *id).unwrap());
    }
    assert!(!index.contains("far", (1 << 40) + 1).unwrap());
    assert!(!index.contains("far", 100).unwrap());
    assert_eq!(index.size("far").unwrap(), 3);
    assert_eq!(index.statistics()["far"].is_64bit, Some(true));
}

#[rstest]
#[case(vec![], false)]
#[case(vec![0, 17, u32::MAX as NodeId], false)]
#[case(vec![0, u32::MAX as NodeId + 1], true)]
fn test_mode_tag(#[case] ids: Vec<NodeId>, #[case] extended: bool) {
    let dir = TempDir::new().expect("Could not create temporary directory");
    let path = RoaringWriter::new(dir.path())
        .unwrap()
        .write("f", &ids)
        .unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.starts_with(ROAR64_MAGIC), extended);

    let index = RoaringIndex::load_file(&path, Some("renamed")).unwrap();
    assert_eq!(index.available_features(), vec!["renamed".to_string()]);
    assert_eq!(index.size("renamed").unwrap(), ids.len() as u64);
    assert_eq!(index.count("renamed", &ids).unwrap(), ids.len());
}

#[test]
fn test_sorted_file_layout() {
    let dir = TempDir::new().expect("Could not create temporary directory");
    let path = SortedU64Writer::new(dir.path())
        .unwrap()
        .write("stops", &[5, 1 << 40])
        .unwrap();
    assert_eq!(path, dir.path().join("stops.u64"));

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 16);
    assert_eq!(&bytes[..8], &5u64.to_le_bytes());
    assert_eq!(&bytes[8..], &(1u64 << 40).to_le_bytes());

    let index = SortedU64Index::load_file(&path, None).unwrap();
    assert!(index.contains("stops", 1 << 40).unwrap());
    assert_eq!(index.count("stops", &[5, 5, 6, 1 << 40]).unwrap(), 3);
    assert_eq!(index.statistics()["stops"].size_bytes, 16);
    assert_eq!(index.statistics()["stops"].is_64bit, None);
}

#[test]
fn test_empty_sets() {
    let data = TestIndex::new(&[("calming", vec![])], IndexFormat::Both, &BuilderOptions::default());

    let set = IndexSet::load_dir(data.path()).unwrap();
    assert_eq!(set.backends().len(), 2);
    for backend in set.backends() {
        assert_eq!(backend.size("calming").unwrap(), 0);
        assert!(!backend.contains("calming", 0).unwrap());
        assert_eq!(backend.count("calming", &[0, 1, 2]).unwrap(), 0);
    }
}

#[test]
fn test_invalid_array_length() {
    let dir = TempDir::new().expect("Could not create temporary directory");
    let path = dir.path().join("broken.u64");
    std::fs::write(&path, [0u8; 12]).unwrap();

    for in_memory in [false, true] {
        let mut index = SortedU64Index::new(in_memory);
        assert!(matches!(
            index.add_file(&path, None),
            Err(Error::InvalidArrayLength { len: 12, .. })
        ));
    }
}

#[test]
fn test_malformed_container() {
    let dir = TempDir::new().expect("Could not create temporary directory");
    let path = dir.path().join("broken.roar");

    // One group declaring more bytes than the file holds
    let mut bytes = ROAR64_MAGIC.to_vec();
    bytes.extend(1u32.to_le_bytes());
    bytes.extend(1u32.to_le_bytes());
    bytes.extend(1000u32.to_le_bytes());
    bytes.extend([0u8; 10]);
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        RoaringIndex::load_file(&path, None),
        Err(Error::MalformedBitmapContainer { .. })
    ));

    // Not a roaring serialization at all
    std::fs::write(&path, [1u8, 2, 3]).unwrap();
    assert!(matches!(
        RoaringIndex::load_file(&path, None),
        Err(Error::InvalidBitmap { .. })
    ));
}

#[test]
fn test_directory_scan_ignores_other_files() {
    let dir = TempDir::new().expect("Could not create temporary directory");
    write_ids_to_path(&dir.path().join("a.u64"), &[1, 2]).unwrap();
    write_ids_to_path(&dir.path().join("b.u64"), &[3]).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    std::fs::create_dir(dir.path().join("c.u64")).unwrap();

    let index = SortedU64Index::load_dir(dir.path()).unwrap();
    assert_eq!(index.available_features(), vec!["a", "b"]);

    let counts = index.count_all(&[1, 3, 4]).unwrap();
    let found: BTreeSet<_> = counts.into_iter().collect();
    assert_eq!(
        found,
        BTreeSet::from([("a".to_string(), 1), ("b".to_string(), 1)])
    );
}
