//! # Vector Store
//!
//! Append-only store of fixed-dimension embeddings with a k-NN index.
//! Insertion order assigns each vector a stable id that survives reloads.

pub mod codec;
pub mod flat;
pub mod ivf;
pub mod kmeans;

use std::ops::Range;
use std::path::Path;

use kagami_core::{IndexConfig, KagamiError, Matrix, Neighbor, Result, VectorId};
use tracing::{debug, info};

use crate::persist::write_atomic;
use ivf::IvfIndex;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Index {
    Flat,
    Ivf(IvfIndex),
}

/// k-NN results, one row per query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub rows: Vec<Vec<Neighbor>>,
}

impl SearchResults {
    /// Distances per query, ascending.
    pub fn distances(&self) -> Vec<Vec<f32>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|n| n.distance).collect())
            .collect()
    }

    /// Ids per query, in distance order.
    pub fn ids(&self) -> Vec<Vec<VectorId>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|n| n.id).collect())
            .collect()
    }

    /// Returns `true` if no query found any neighbor.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }
}

/// Fixed-dimension vector store with a flat or inverted-file index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStore {
    pub(crate) dim: usize,
    pub(crate) vectors: Vec<f32>,
    pub(crate) index: Index,
}

impl VectorStore {
    /// Build an empty, immediately usable store.
    ///
    /// IVF indexes are trained on a placeholder batch here so they can be
    /// searched and added to before any real data exists.
    pub fn create(dim: usize, config: IndexConfig) -> Result<Self> {
        if dim == 0 {
            return Err(KagamiError::InvalidConfig("feature_dim must be > 0".into()));
        }
        config.validate()?;

        let index = match config {
            IndexConfig::Flat => Index::Flat,
            IndexConfig::Ivf { nlist, nprobe } => {
                Index::Ivf(IvfIndex::with_placeholder(dim, nlist, nprobe))
            }
        };
        info!(dim, index = %config, "initialized new vector index");

        Ok(Self {
            dim,
            vectors: Vec::new(),
            index,
        })
    }

    /// Read a persisted store. See [`codec::read_store`] for error cases.
    pub fn load(path: &Path) -> Result<Self> {
        let store = codec::read_store(path)?;
        info!(
            path = %path.display(),
            vectors = store.len(),
            dim = store.dim,
            "loaded vector index"
        );
        Ok(store)
    }

    /// Atomically write the store to `path`.
    pub fn persist(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| codec::write_store(self, w))?;
        debug!(path = %path.display(), vectors = self.len(), "persisted vector index");
        Ok(())
    }

    /// Append a batch. Rejects the whole batch if its width is wrong.
    ///
    /// Returns the ids assigned to the new rows.
    pub fn add(&mut self, batch: &Matrix) -> Result<Range<VectorId>> {
        self.check_width(batch.cols())?;

        let start = self.len();
        self.vectors.reserve(batch.as_slice().len());
        self.vectors.extend_from_slice(batch.as_slice());

        if let Index::Ivf(ivf) = &mut self.index {
            if ivf.wants_training(self.vectors.len() / self.dim) {
                ivf.train(&self.vectors, self.dim);
            } else {
                for (offset, row) in batch.iter_rows().enumerate() {
                    ivf.assign(start + offset, row, self.dim);
                }
            }
        }

        let end = self.len();
        debug!(added = end - start, total = end, "added vectors");
        Ok(start as VectorId..end as VectorId)
    }

    /// The `k` nearest stored vectors for each query row.
    ///
    /// Rows hold fewer than `k` neighbors when the store is smaller than `k`.
    pub fn search(&self, queries: &Matrix, k: usize) -> Result<SearchResults> {
        self.check_width(queries.cols())?;

        let rows = queries
            .iter_rows()
            .map(|q| match &self.index {
                Index::Flat => flat::scan_all(&self.vectors, self.dim, q, k),
                Index::Ivf(ivf) => ivf.search(&self.vectors, self.dim, q, k),
            })
            .collect();

        debug!(queries = queries.rows(), k, "performed vector search");
        Ok(SearchResults { rows })
    }

    /// Re-cluster an IVF index on the stored vectors. No-op for flat indexes.
    pub fn retrain(&mut self) {
        if let Index::Ivf(ivf) = &mut self.index {
            ivf.train(&self.vectors, self.dim);
        }
    }

    /// Forget every vector with id `>= len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        self.vectors.truncate(len * self.dim);
        if let Index::Ivf(ivf) = &mut self.index {
            ivf.truncate(len);
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The index structure currently in use.
    pub fn config(&self) -> IndexConfig {
        match &self.index {
            Index::Flat => IndexConfig::Flat,
            Index::Ivf(ivf) => IndexConfig::Ivf {
                nlist: ivf.nlist,
                nprobe: ivf.nprobe,
            },
        }
    }

    /// `true` while an IVF index still uses placeholder centroids.
    pub fn is_placeholder_trained(&self) -> bool {
        matches!(&self.index, Index::Ivf(ivf) if ivf.placeholder)
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.dim {
            return Err(KagamiError::DimensionMismatch {
                expected: self.dim,
                actual: width,
            });
        }
        Ok(())
    }
}
