use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use kagami_core::{IndexConfig, KagamiError, Matrix, UNKNOWN_LABEL, labels_path_for};
use kagami_vecdb::{FeatureDatabase, SimilaritySearch, VectorStore};

fn index_path(dir: &Path) -> PathBuf {
    dir.join("database").join("features.kgm")
}

fn clustered(n: usize) -> (Matrix, Vec<String>) {
    let mut rows = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let offset = if i % 2 == 0 { 0.0 } else { 10.0 };
        rows.push([offset + i as f32 * 0.01, offset - i as f32 * 0.02, offset]);
        labels.push(if i % 2 == 0 { "even" } else { "odd" }.to_string());
    }
    (Matrix::from_rows(&rows).unwrap(), labels)
}

fn queries() -> Matrix {
    Matrix::from_rows(&[[0.1, 0.0, 0.0], [9.9, 10.0, 10.0], [5.0, 5.0, 5.0]]).unwrap()
}

#[test]
fn reload_gives_identical_results() {
    for config in [IndexConfig::Flat, IndexConfig::ivf(4)] {
        let dir = tempfile::tempdir().unwrap();
        let path = index_path(dir.path());
        let (batch, labels) = clustered(20);

        let db = FeatureDatabase::create(&path, 3, config).unwrap();
        db.commit(&batch, &labels).unwrap();
        let before = db.search(&queries(), 5).unwrap();

        let reloaded = FeatureDatabase::load(&path).unwrap();
        assert_eq!(reloaded.len(), 20);
        assert_eq!(reloaded.search(&queries(), 5).unwrap(), before);
        assert_eq!(reloaded.labels(&[0, 1]), vec!["even", "odd"]);
    }
}

#[test]
fn search_is_idempotent() {
    let db = FeatureDatabase::create("unused.kgm", 3, IndexConfig::ivf(3)).unwrap();
    let (batch, labels) = clustered(12);
    db.add_batch(&batch, &labels).unwrap();

    let first = db.search(&queries(), 4).unwrap();
    let second = db.search(&queries(), 4).unwrap();
    assert_eq!(first, second);
}

#[test]
fn crash_between_index_and_labels_recovers_previous_pair() {
    let dir = tempfile::tempdir().unwrap();
    let path = index_path(dir.path());
    let (batch, labels) = clustered(6);

    let db = FeatureDatabase::create(&path, 3, IndexConfig::Flat).unwrap();
    db.commit(&batch, &labels).unwrap();
    let before = db.search(&queries(), 3).unwrap();

    // New index reached disk, labels did not.
    let mut store = VectorStore::load(&path).unwrap();
    store
        .add(&Matrix::from_rows(&[[0.1, 0.0, 0.0], [0.2, 0.0, 0.0]]).unwrap())
        .unwrap();
    store.persist(&path).unwrap();

    let recovered = FeatureDatabase::load(&path).unwrap();
    assert_eq!(recovered.len(), 6);
    assert_eq!(recovered.stats().labels, 6);
    assert_eq!(recovered.search(&queries(), 3).unwrap(), before);
}

#[test]
fn extra_labels_are_a_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = index_path(dir.path());
    let (batch, labels) = clustered(2);

    let db = FeatureDatabase::create(&path, 3, IndexConfig::Flat).unwrap();
    db.commit(&batch, &labels).unwrap();
    fs::write(labels_path_for(&path), "even\nodd\nstray\n").unwrap();

    assert!(matches!(
        FeatureDatabase::load(&path),
        Err(KagamiError::LedgerMismatch {
            vectors: 2,
            labels: 3
        })
    ));

    let fresh = FeatureDatabase::open(&path, 3, IndexConfig::Flat).unwrap();
    assert!(fresh.is_empty());
}

#[test]
fn corrupt_index_opens_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = index_path(dir.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"\x1f\x8b not really gzip").unwrap();

    let db = FeatureDatabase::open(&path, 3, IndexConfig::Flat).unwrap();
    assert!(db.is_empty());
    assert_eq!(db.dim(), 3);

    // The next commit replaces the damaged file.
    let (batch, labels) = clustered(2);
    db.commit(&batch, &labels).unwrap();
    assert_eq!(FeatureDatabase::load(&path).unwrap().len(), 2);
}

#[test]
fn missing_index_opens_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = index_path(dir.path());

    let db = FeatureDatabase::open(&path, 8, IndexConfig::ivf(2)).unwrap();
    assert!(db.is_empty());
    assert_eq!(db.stats().index, IndexConfig::ivf(2));
    assert!(!path.exists());
}

#[test]
fn dimension_change_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = index_path(dir.path());
    let (batch, labels) = clustered(2);

    FeatureDatabase::create(&path, 3, IndexConfig::Flat)
        .unwrap()
        .commit(&batch, &labels)
        .unwrap();

    assert!(matches!(
        FeatureDatabase::open(&path, 64, IndexConfig::Flat),
        Err(KagamiError::DimensionMismatch {
            expected: 64,
            actual: 3
        })
    ));
}

#[test]
fn appends_across_sessions_keep_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = index_path(dir.path());

    let db = FeatureDatabase::open(&path, 3, IndexConfig::Flat).unwrap();
    let first = db
        .commit(&Matrix::from_row(&[1.0, 0.0, 0.0]), &["a"])
        .unwrap();
    drop(db);

    let db = FeatureDatabase::open(&path, 3, IndexConfig::Flat).unwrap();
    let second = db
        .commit(&Matrix::from_row(&[0.0, 1.0, 0.0]), &["b"])
        .unwrap();

    assert_eq!(first, 0..1);
    assert_eq!(second, 1..2);
    assert_eq!(db.labels(&[0, 1, 2]), vec!["a", "b", "Unknown"]);
}

#[test]
fn unreadable_label_file_opens_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = index_path(dir.path());
    let (batch, labels) = clustered(1);

    let db = FeatureDatabase::create(&path, 3, IndexConfig::Flat).unwrap();
    db.commit(&batch, &labels).unwrap();
    fs::write(labels_path_for(&path), b"c\xffat\n").unwrap();

    assert!(matches!(
        FeatureDatabase::load(&path),
        Err(KagamiError::CorruptIndex { .. })
    ));
    let fresh = FeatureDatabase::open(&path, 3, IndexConfig::Flat).unwrap();
    assert!(fresh.is_empty());
}

#[test]
fn failed_persist_keeps_batch_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"").unwrap();
    let path = blocker.join("features.kgm");

    let db = FeatureDatabase::create(&path, 3, IndexConfig::Flat).unwrap();
    let (batch, labels) = clustered(4);
    let err = db.commit(&batch, &labels).unwrap_err();
    assert!(matches!(err, KagamiError::Io(_)));

    assert_eq!(db.len(), 4);
    let results = db.search(&queries(), 2).unwrap();
    assert_eq!(results.rows[0].len(), 2);
    assert_eq!(db.labels(&results.ids()[0]), vec!["even", "even"]);
}

#[test]
fn readers_see_consistent_pairs_during_commits() {
    let dir = tempfile::tempdir().unwrap();
    let path = index_path(dir.path());
    let db = Arc::new(FeatureDatabase::create(&path, 2, IndexConfig::ivf(4)).unwrap());
    let search = SimilaritySearch::new(Arc::clone(&db));
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..3 {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let results = search.find_similar(&[[7.0f32, 0.0]], 8).unwrap();
                    for m in results.rows.iter().flatten() {
                        assert_ne!(m.label, UNKNOWN_LABEL);
                        assert_eq!(m.label, format!("v{}", m.id));
                    }
                }
            });
        }

        for round in 0..20 {
            let start = round * 5;
            let rows: Vec<[f32; 2]> = (start..start + 5).map(|id| [id as f32, 0.0]).collect();
            let labels: Vec<String> = (start..start + 5).map(|id| format!("v{id}")).collect();
            db.commit(&Matrix::from_rows(&rows).unwrap(), &labels).unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(db.len(), 100);
    assert_eq!(FeatureDatabase::load(&path).unwrap().len(), 100);
}
