//! # Feature Database
//!
//! Pairs one [`VectorStore`] with one [`LabelLedger`] and guards them with a
//! single-writer, multi-reader lock.
//!
//! Persist order: the index file is written first, then the label file,
//! each atomically. After a crash between the two writes the index holds
//! more vectors than there are labels; [`FeatureDatabase::load`] detects
//! this and truncates the index back to the label count, which restores
//! the previous pair exactly because ids are append-only.

use std::cmp::Ordering;
use std::ops::Range;
use std::path::{Path, PathBuf};

use kagami_core::{IndexConfig, KagamiError, Matrix, Result, VectorId, labels_path_for};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use tracing::{info, warn};

use crate::index::{SearchResults, VectorStore};
use crate::ledger::LabelLedger;

struct Inner {
    store: VectorStore,
    ledger: LabelLedger,
}

impl Inner {
    fn persist(&self, index_path: &Path, labels_path: &Path) -> Result<()> {
        self.store.persist(index_path)?;
        self.ledger.persist(labels_path)
    }
}

/// Summary of the database contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseStats {
    pub index_path: PathBuf,
    pub vectors: usize,
    pub labels: usize,
    pub dim: usize,
    pub index: IndexConfig,
    pub placeholder_trained: bool,
    pub classes: Vec<(String, usize)>,
}

/// Read-locked view of the store and ledger.
///
/// Writers wait until every snapshot is dropped, so ids seen through one
/// snapshot always resolve against the matching ledger.
pub struct Snapshot<'a> {
    guard: RwLockReadGuard<'a, Inner>,
}

impl Snapshot<'_> {
    pub fn store(&self) -> &VectorStore {
        &self.guard.store
    }

    pub fn ledger(&self) -> &LabelLedger {
        &self.guard.ledger
    }
}

/// Persisted vector store + label ledger.
pub struct FeatureDatabase {
    index_path: PathBuf,
    labels_path: PathBuf,
    inner: RwLock<Inner>,
}

impl FeatureDatabase {
    /// A fresh, empty database that will persist to `index_path`.
    pub fn create(index_path: impl Into<PathBuf>, dim: usize, config: IndexConfig) -> Result<Self> {
        let index_path = index_path.into();
        let store = VectorStore::create(dim, config)?;
        Ok(Self::from_parts(index_path, store, LabelLedger::new()))
    }

    /// Load a persisted database, failing on corruption.
    ///
    /// An index with more vectors than labels is repaired by truncation;
    /// more labels than vectors is `LedgerMismatch`.
    pub fn load(index_path: impl Into<PathBuf>) -> Result<Self> {
        let index_path = index_path.into();
        let labels_path = labels_path_for(&index_path);

        let mut store = VectorStore::load(&index_path)?;
        let mut ledger = if labels_path.exists() {
            LabelLedger::load(&labels_path)?
        } else {
            warn!(path = %labels_path.display(), "label file missing");
            LabelLedger::new()
        };

        match store.len().cmp(&ledger.len()) {
            Ordering::Equal => {}
            Ordering::Greater => {
                warn!(
                    vectors = store.len(),
                    labels = ledger.len(),
                    "index is ahead of its labels, dropping unlabeled vectors"
                );
                store.truncate(ledger.len());
            }
            Ordering::Less => {
                return Err(KagamiError::LedgerMismatch {
                    vectors: store.len(),
                    labels: ledger.len(),
                });
            }
        }
        ledger.truncate(store.len());

        Ok(Self::from_parts(index_path, store, ledger))
    }

    /// Load the database at `index_path`, or start a fresh one.
    ///
    /// A missing, corrupt or inconsistent index yields an empty database
    /// (logged as a warning). A readable index built for a different
    /// dimension is an error, since starting over would discard it.
    pub fn open(index_path: impl Into<PathBuf>, dim: usize, config: IndexConfig) -> Result<Self> {
        let index_path = index_path.into();

        if !index_path.exists() {
            let labels_path = labels_path_for(&index_path);
            if labels_path.exists() {
                warn!(path = %labels_path.display(), "ignoring label file without an index");
            }
            info!(path = %index_path.display(), "initialized new feature database");
            return Self::create(index_path, dim, config);
        }

        match Self::load(&index_path) {
            Ok(db) if db.dim() == dim => Ok(db),
            Ok(db) => Err(KagamiError::DimensionMismatch {
                expected: dim,
                actual: db.dim(),
            }),
            Err(e @ (KagamiError::CorruptIndex { .. } | KagamiError::LedgerMismatch { .. })) => {
                warn!(error = %e, "failed to load feature database, starting empty");
                Self::create(index_path, dim, config)
            }
            Err(e) => Err(e),
        }
    }

    fn from_parts(index_path: PathBuf, store: VectorStore, ledger: LabelLedger) -> Self {
        let labels_path = labels_path_for(&index_path);
        Self {
            index_path,
            labels_path,
            inner: RwLock::new(Inner { store, ledger }),
        }
    }

    /// Append vectors and their labels as one atomic step, in memory only.
    pub fn add_batch<S: AsRef<str>>(
        &self,
        vectors: &Matrix,
        labels: &[S],
    ) -> Result<Range<VectorId>> {
        let mut inner = self.inner.write();
        Self::add_locked(&mut inner, vectors, labels)
    }

    /// Append a batch and persist the result in one critical section.
    ///
    /// Readers may search while the files are written; other writers wait.
    /// If persisting fails the in-memory database keeps the batch.
    pub fn commit<S: AsRef<str>>(&self, vectors: &Matrix, labels: &[S]) -> Result<Range<VectorId>> {
        let mut inner = self.inner.write();
        let ids = Self::add_locked(&mut inner, vectors, labels)?;

        let inner = RwLockWriteGuard::downgrade_to_upgradable(inner);
        inner.persist(&self.index_path, &self.labels_path)?;
        info!(
            added = ids.end - ids.start,
            index = %self.index_path.display(),
            labels = %self.labels_path.display(),
            "saved feature database"
        );
        Ok(ids)
    }

    fn add_locked<S: AsRef<str>>(
        inner: &mut Inner,
        vectors: &Matrix,
        labels: &[S],
    ) -> Result<Range<VectorId>> {
        if labels.len() != vectors.rows() {
            return Err(KagamiError::InvalidShape(format!(
                "{} vectors but {} labels",
                vectors.rows(),
                labels.len()
            )));
        }
        for label in labels {
            LabelLedger::validate_label(label.as_ref())?;
        }

        let ids = inner.store.add(vectors).inspect_err(|e| {
            warn!(error = %e, "rejected vector batch");
        })?;
        inner
            .ledger
            .append(labels.iter().map(|l| <S as AsRef<str>>::as_ref(l)));
        Ok(ids)
    }

    /// Write the current state to disk.
    pub fn persist(&self) -> Result<()> {
        let inner = self.inner.upgradable_read();
        inner.persist(&self.index_path, &self.labels_path)
    }

    /// Re-cluster an IVF index on the stored vectors and persist.
    pub fn retrain(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.store.retrain();
        let inner = RwLockWriteGuard::downgrade_to_upgradable(inner);
        inner.persist(&self.index_path, &self.labels_path)
    }

    /// Read-locked view for multi-step queries.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            guard: self.inner.read(),
        }
    }

    /// k-NN search without label resolution.
    pub fn search(&self, queries: &Matrix, k: usize) -> Result<SearchResults> {
        self.inner.read().store.search(queries, k)
    }

    /// Resolve ids to labels.
    pub fn labels(&self, ids: &[VectorId]) -> Vec<String> {
        self.inner.read().ledger.get(ids)
    }

    pub fn len(&self) -> usize {
        self.inner.read().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.inner.read().store.dim()
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn labels_path(&self) -> &Path {
        &self.labels_path
    }

    pub fn stats(&self) -> DatabaseStats {
        let inner = self.inner.read();
        DatabaseStats {
            index_path: self.index_path.clone(),
            vectors: inner.store.len(),
            labels: inner.ledger.len(),
            dim: inner.store.dim(),
            index: inner.store.config(),
            placeholder_trained: inner.store.is_placeholder_trained(),
            classes: inner.ledger.counts(),
        }
    }
}
