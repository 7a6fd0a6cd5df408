//! Distance kernel and bounded top-k selection shared by every index.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use kagami_core::{Neighbor, VectorId};

/// Squared Euclidean distance.
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Heap entry ordered by (distance, id) so the worst candidate is on top.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    id: VectorId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Keeps the `k` closest candidates seen so far.
pub struct TopK {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
        }
    }

    pub fn push(&mut self, id: VectorId, distance: f32) {
        if self.k == 0 {
            return;
        }
        let candidate = Candidate { distance, id };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Neighbors ascending by distance, ties by id.
    pub fn into_sorted(self) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                id: c.id,
                distance: c.distance,
            })
            .collect()
    }
}

/// Exact k-NN over every row of `vectors`.
pub fn scan_all(vectors: &[f32], dim: usize, query: &[f32], k: usize) -> Vec<Neighbor> {
    let mut top = TopK::new(k);
    for (id, v) in vectors.chunks_exact(dim).enumerate() {
        top.push(id as VectorId, l2_squared(query, v));
    }
    top.into_sorted()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_matches_hand_computation() {
        assert_eq!(l2_squared(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(l2_squared(&[1.0], &[1.0]), 0.0);
    }

    #[test]
    fn top_k_keeps_closest_in_order() {
        let mut top = TopK::new(2);
        top.push(0, 5.0);
        top.push(1, 1.0);
        top.push(2, 3.0);
        top.push(3, 0.5);

        let ids: Vec<_> = top.into_sorted().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn equal_distances_order_by_id() {
        let mut top = TopK::new(3);
        for id in [4, 2, 9, 1] {
            top.push(id, 1.0);
        }
        let ids: Vec<_> = top.into_sorted().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn scan_returns_fewer_than_k_when_small() {
        let vectors = vec![0.0, 0.0, 1.0, 1.0];
        let found = scan_all(&vectors, 2, &[0.9, 0.9], 10);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, 1);
    }

    #[test]
    fn zero_k_finds_nothing() {
        let vectors = vec![0.0, 0.0];
        assert!(scan_all(&vectors, 2, &[0.0, 0.0], 0).is_empty());
    }
}
