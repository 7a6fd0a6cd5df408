//! Lloyd's k-means with k-means++ seeding, used to train IVF centroids.

use oorandom::Rand64;

use super::flat::l2_squared;

/// Fixed seed so training is reproducible.
pub const KMEANS_SEED: u128 = 0x6b61_6761_6d69;
pub const KMEANS_MAX_ITER: usize = 25;

/// Cluster `data` (row-major, `dim` wide) into `k` centroids.
///
/// Returns `k * dim` values. Requires at least one row; when there are
/// fewer rows than `k`, rows are reused as seeds.
pub fn kmeans(data: &[f32], dim: usize, k: usize, max_iter: usize) -> Vec<f32> {
    let n = data.len() / dim;
    debug_assert!(n > 0 && k > 0);

    let row = |i: usize| &data[i * dim..(i + 1) * dim];
    let mut rng = Rand64::new(KMEANS_SEED);

    // k-means++ seeding
    let mut centroids = Vec::with_capacity(k * dim);
    centroids.extend_from_slice(row(rng.rand_range(0..n as u64) as usize));
    let mut nearest: Vec<f32> = (0..n).map(|i| l2_squared(row(i), &centroids[..dim])).collect();

    for _ in 1..k {
        let total: f64 = nearest.iter().map(|&d| d as f64).sum();
        let pick = if total > 0.0 {
            let mut target = rng.rand_float() * total;
            let mut chosen = n - 1;
            for (i, &d) in nearest.iter().enumerate() {
                target -= d as f64;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rng.rand_range(0..n as u64) as usize
        };

        let start = centroids.len();
        centroids.extend_from_slice(row(pick));
        let added = &centroids[start..start + dim];
        for (i, best) in nearest.iter_mut().enumerate() {
            let d = l2_squared(row(i), added);
            if d < *best {
                *best = d;
            }
        }
    }

    // Lloyd iterations
    let mut assignment = vec![usize::MAX; n];
    for _ in 0..max_iter {
        let mut changed = false;
        for (i, slot) in assignment.iter_mut().enumerate() {
            let c = nearest_centroid(&centroids, dim, row(i));
            if *slot != c {
                *slot = c;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![0.0f64; k * dim];
        let mut counts = vec![0usize; k];
        for (i, &c) in assignment.iter().enumerate() {
            counts[c] += 1;
            for (s, &x) in sums[c * dim..(c + 1) * dim].iter_mut().zip(row(i)) {
                *s += x as f64;
            }
        }
        for c in 0..k {
            // Empty clusters keep their previous centroid.
            if counts[c] == 0 {
                continue;
            }
            let inv = 1.0 / counts[c] as f64;
            for (dst, &s) in centroids[c * dim..(c + 1) * dim]
                .iter_mut()
                .zip(&sums[c * dim..(c + 1) * dim])
            {
                *dst = (s * inv) as f32;
            }
        }
    }

    centroids
}

/// Index of the closest centroid; the lowest index wins ties.
pub fn nearest_centroid(centroids: &[f32], dim: usize, v: &[f32]) -> usize {
    let mut best = 0;
    let mut best_d = f32::INFINITY;
    for (c, centroid) in centroids.chunks_exact(dim).enumerate() {
        let d = l2_squared(v, centroid);
        if d < best_d {
            best = c;
            best_d = d;
        }
    }
    best
}
