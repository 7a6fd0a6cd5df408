//! # Classifier
//!
//! Majority vote over the labels of a query's nearest neighbors.
//!
//! Ties go to the label encountered first in the distance-sorted neighbor
//! list, i.e. the tied label with the closest supporting neighbor.

use kagami_core::{KagamiError, Match, Matrix, Prediction, Result};
use tracing::{debug, info};

use crate::search::SimilaritySearch;

#[derive(Clone)]
pub struct Classifier {
    search: SimilaritySearch,
}

impl Classifier {
    pub fn new(search: SimilaritySearch) -> Self {
        Self { search }
    }

    pub fn search(&self) -> &SimilaritySearch {
        &self.search
    }

    /// Predicted label for one embedding. `"Unknown"` on an empty store.
    pub fn predict(&self, query: &[f32], k: usize) -> Result<String> {
        Ok(self.predict_detailed(query, k)?.label)
    }

    /// [`predict`](Self::predict) with vote diagnostics.
    pub fn predict_detailed(&self, query: &[f32], k: usize) -> Result<Prediction> {
        if query.is_empty() {
            return Err(KagamiError::EmptyEmbedding);
        }
        let mut results = self.search.find_similar_matrix(&Matrix::from_row(query), k)?;
        let neighbors = results.rows.pop().unwrap_or_default();

        let prediction = majority_vote(&neighbors);
        log_prediction(&prediction);
        Ok(prediction)
    }

    /// One label per query row, from a single shared search.
    pub fn predict_batch<R: AsRef<[f32]>>(&self, queries: &[R], k: usize) -> Result<Vec<String>> {
        Ok(self
            .predict_batch_detailed(queries, k)?
            .into_iter()
            .map(|p| p.label)
            .collect())
    }

    pub fn predict_batch_detailed<R: AsRef<[f32]>>(
        &self,
        queries: &[R],
        k: usize,
    ) -> Result<Vec<Prediction>> {
        if queries.iter().any(|q| q.as_ref().is_empty()) {
            return Err(KagamiError::EmptyEmbedding);
        }
        let results = self.search.find_similar(queries, k)?;

        let predictions: Vec<Prediction> = results
            .rows
            .iter()
            .map(|row| majority_vote(row))
            .collect();
        for p in &predictions {
            log_prediction(p);
        }
        info!(queries = predictions.len(), k, "classified batch");
        Ok(predictions)
    }
}

fn log_prediction(p: &Prediction) {
    if p.is_unknown() {
        info!("no neighbors found, prediction is Unknown");
    } else {
        debug!(
            label = %p.label,
            votes = p.votes,
            neighbors = p.neighbors,
            confidence = p.confidence(),
            nearest = p.nearest_distance,
            "prediction"
        );
    }
}

/// Most frequent label among `neighbors`, which must be sorted by distance.
pub fn majority_vote(neighbors: &[Match]) -> Prediction {
    let Some(nearest) = neighbors.first() else {
        return Prediction::unknown();
    };

    // (label, votes) in first-appearance order
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for m in neighbors {
        match tally.iter_mut().find(|(label, _)| *label == m.label) {
            Some((_, votes)) => *votes += 1,
            None => tally.push((&m.label, 1)),
        }
    }

    let mut winner = tally[0];
    for &entry in &tally[1..] {
        if entry.1 > winner.1 {
            winner = entry;
        }
    }

    Prediction {
        label: winner.0.to_string(),
        votes: winner.1,
        neighbors: neighbors.len(),
        nearest_distance: Some(nearest.distance),
    }
}
