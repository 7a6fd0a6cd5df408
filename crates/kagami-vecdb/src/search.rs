//! # Similarity Search
//!
//! k-NN search with label resolution. Holds nothing but a handle to the
//! shared [`FeatureDatabase`].

use std::sync::Arc;

use kagami_core::{Match, Matrix, Result, VectorId};
use tracing::debug;

use crate::database::FeatureDatabase;

/// Labeled k-NN results, one row per query, nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimilarityResults {
    pub rows: Vec<Vec<Match>>,
}

impl SimilarityResults {
    pub fn distances(&self) -> Vec<Vec<f32>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|m| m.distance).collect())
            .collect()
    }

    pub fn labels(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|m| m.label.clone()).collect())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }
}

#[derive(Clone)]
pub struct SimilaritySearch {
    database: Arc<FeatureDatabase>,
}

impl SimilaritySearch {
    pub fn new(database: Arc<FeatureDatabase>) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Arc<FeatureDatabase> {
        &self.database
    }

    /// Nearest `k` labeled neighbors for each query row.
    ///
    /// # Errors
    /// `InvalidShape` for zero or ragged rows, `DimensionMismatch` for a
    /// width other than the store's dimension.
    pub fn find_similar<R: AsRef<[f32]>>(
        &self,
        queries: &[R],
        k: usize,
    ) -> Result<SimilarityResults> {
        let queries = Matrix::from_rows(queries)?;
        self.find_similar_matrix(&queries, k)
    }

    /// [`find_similar`](Self::find_similar) for an already shaped batch.
    pub fn find_similar_matrix(&self, queries: &Matrix, k: usize) -> Result<SimilarityResults> {
        // One read lock for both lookups so ids and labels agree.
        let snapshot = self.database.snapshot();
        let results = snapshot.store().search(queries, k)?;

        let flat_ids: Vec<VectorId> = results.rows.iter().flatten().map(|n| n.id).collect();
        let mut labels = snapshot.ledger().get(&flat_ids).into_iter();

        let rows: Vec<Vec<Match>> = results
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(labels.by_ref())
                    .map(|(n, label)| Match {
                        id: n.id,
                        distance: n.distance,
                        label,
                    })
                    .collect()
            })
            .collect();

        debug!(
            queries = rows.len(),
            k,
            found = flat_ids.len(),
            "resolved neighbor labels"
        );
        Ok(SimilarityResults { rows })
    }
}
