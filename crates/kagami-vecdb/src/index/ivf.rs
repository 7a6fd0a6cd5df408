//! Inverted-file index: vectors are bucketed by their nearest centroid and
//! a query scans only the `nprobe` closest buckets.

use kagami_core::{Neighbor, VectorId};
use tracing::info;

use super::flat::{TopK, l2_squared};
use super::kmeans::{KMEANS_MAX_ITER, kmeans, nearest_centroid};

#[derive(Debug, Clone, PartialEq)]
pub struct IvfIndex {
    pub(crate) nlist: usize,
    pub(crate) nprobe: usize,
    pub(crate) centroids: Vec<f32>,
    pub(crate) lists: Vec<Vec<usize>>,
    /// Centroids came from the placeholder batch, not real data.
    pub(crate) placeholder: bool,
}

impl IvfIndex {
    /// A ready index trained on an all-zero placeholder batch of `nlist` rows.
    ///
    /// Every centroid is zero, so all vectors land in list 0 and search is
    /// exact until [`IvfIndex::train`] runs on real data.
    pub fn with_placeholder(dim: usize, nlist: usize, nprobe: usize) -> Self {
        let zeros = vec![0.0f32; nlist * dim];
        let centroids = kmeans(&zeros, dim, nlist, KMEANS_MAX_ITER);
        Self {
            nlist,
            nprobe: nprobe.min(nlist),
            centroids,
            lists: vec![Vec::new(); nlist],
            placeholder: true,
        }
    }

    /// Whether enough real vectors exist to replace placeholder centroids.
    pub fn wants_training(&self, count: usize) -> bool {
        self.placeholder && count >= self.nlist
    }

    /// Re-cluster on `vectors` and reassign every id. Ids are unchanged.
    pub fn train(&mut self, vectors: &[f32], dim: usize) {
        let count = vectors.len() / dim;
        if count == 0 {
            return;
        }
        self.centroids = kmeans(vectors, dim, self.nlist, KMEANS_MAX_ITER);
        self.placeholder = false;
        self.lists = vec![Vec::new(); self.nlist];
        for (id, v) in vectors.chunks_exact(dim).enumerate() {
            self.assign(id, v, dim);
        }
        info!(
            nlist = self.nlist,
            vectors = count,
            "trained IVF centroids on stored vectors"
        );
    }

    /// File `id` under the list of its nearest centroid.
    pub fn assign(&mut self, id: usize, v: &[f32], dim: usize) {
        let list = nearest_centroid(&self.centroids, dim, v);
        self.lists[list].push(id);
    }

    /// The `nprobe` lists whose centroids are closest to `query`.
    fn probe(&self, query: &[f32], dim: usize) -> Vec<usize> {
        let mut order: Vec<(f32, usize)> = self
            .centroids
            .chunks_exact(dim)
            .enumerate()
            .map(|(c, centroid)| (l2_squared(query, centroid), c))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        order.truncate(self.nprobe);
        order.into_iter().map(|(_, c)| c).collect()
    }

    pub fn search(&self, vectors: &[f32], dim: usize, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut top = TopK::new(k);
        for list in self.probe(query, dim) {
            for &id in &self.lists[list] {
                let v = &vectors[id * dim..(id + 1) * dim];
                top.push(id as VectorId, l2_squared(query, v));
            }
        }
        top.into_sorted()
    }

    /// Drop every id `>= len`.
    pub fn truncate(&mut self, len: usize) {
        for list in &mut self.lists {
            list.retain(|&id| id < len);
        }
    }
}
