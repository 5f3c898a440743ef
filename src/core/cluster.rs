//! K-means over T-F embedding vectors and the masks derived from it.

use std::collections::HashSet;

use ndarray::{Array2, Array3, ArrayView2, ArrayViewD, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::{
    error::{Result, SeparationError},
    types::{ClusterOptions, MaskMode},
};

#[derive(Clone, Debug)]
pub struct KMeansFit {
    /// Cluster index per input row.
    pub labels: Vec<usize>,
    /// Shape (k, dim).
    pub centers: Array2<f32>,
    /// Sum of squared distances of every row to its center.
    pub inertia: f32,
    pub n_iter: usize,
}

/// Seeded k-means++ / Lloyd clustering with restarts.
#[derive(Clone, Debug)]
pub struct KMeans {
    k: usize,
    opts: ClusterOptions,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self::with_options(k, ClusterOptions::default())
    }

    pub fn with_options(k: usize, opts: ClusterOptions) -> Self {
        Self { k, opts }
    }

    /// Clusters the rows of `data` (shape (n, dim)).
    ///
    /// Restarts are independent and seeded from `opts.seed`, so the result is
    /// the same for any worker count.
    pub fn fit(&self, data: ArrayView2<'_, f32>) -> Result<KMeansFit> {
        let (n, dim) = data.dim();
        if n == 0 || dim == 0 {
            return Err(SeparationError::ShapeMismatch(format!(
                "k-means needs a non-empty (n, dim) matrix, got ({n}, {dim})"
            )));
        }
        if self.k == 0 {
            return Err(SeparationError::Clustering(
                "number of clusters must be at least 1".into(),
            ));
        }
        if self.opts.n_init == 0 || self.opts.max_iter == 0 {
            return Err(SeparationError::InvalidConfig(
                "k-means needs at least one restart and one iteration".into(),
            ));
        }

        let points: Vec<f32> = data.iter().copied().collect();
        if points.iter().any(|v| !v.is_finite()) {
            return Err(SeparationError::Clustering(
                "embedding vectors contain non-finite values".into(),
            ));
        }

        let distinct = count_distinct(&points, dim, self.k);
        if distinct < self.k {
            return Err(SeparationError::Clustering(format!(
                "cannot form {} clusters from {} distinct vectors",
                self.k, distinct
            )));
        }

        let tol = self.opts.tol * mean_variance(&points, n, dim);
        let run = |i: usize| {
            let seed = self.opts.seed.wrapping_add(i as u64);
            lloyd(&points, n, dim, self.k, self.opts.max_iter, tol, seed)
        };

        let runs: Vec<Run> = if self.opts.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.opts.workers)
                .build()
                .map_err(anyhow::Error::from)?;
            pool.install(|| (0..self.opts.n_init).into_par_iter().map(run).collect())
        } else {
            (0..self.opts.n_init).map(run).collect()
        };

        // Lowest inertia wins; ties go to the earliest restart
        let best = runs
            .into_iter()
            .enumerate()
            .min_by(|(ia, a), (ib, b)| a.inertia.total_cmp(&b.inertia).then(ia.cmp(ib)))
            .map(|(_, run)| run)
            .ok_or_else(|| SeparationError::Clustering("k-means produced no result".into()))?;

        debug!(
            k = self.k,
            n,
            dim,
            n_iter = best.n_iter,
            inertia = best.inertia,
            "k-means converged"
        );

        Ok(KMeansFit {
            labels: best.labels,
            centers: Array2::from_shape_vec((self.k, dim), best.centers)?,
            inertia: best.inertia,
            n_iter: best.n_iter,
        })
    }
}

/// Derives per-source masks of shape (time, frequency, num_sources) from
/// embedding vectors of shape (batch, time, frequency, embedding).
///
/// Only batch 0 is clustered.
pub fn get_cluster_masks(
    vectors: ArrayViewD<'_, f32>,
    num_sources: usize,
    mode: MaskMode,
    opts: &ClusterOptions,
) -> Result<Array3<f32>> {
    if vectors.ndim() != 4 {
        return Err(SeparationError::ShapeMismatch(format!(
            "embedding vectors must be (batch, time, frequency, embedding), got shape {:?}",
            vectors.shape()
        )));
    }
    let shape = vectors.shape();
    let (batch, t, f, d) = (shape[0], shape[1], shape[2], shape[3]);
    if batch == 0 || t == 0 || f == 0 || d == 0 {
        return Err(SeparationError::ShapeMismatch(format!(
            "embedding vectors have an empty axis: {:?}",
            shape
        )));
    }

    let first = vectors.index_axis(Axis(0), 0);
    let flat = Array2::from_shape_vec((t * f, d), first.iter().copied().collect())?;

    let fit = KMeans::with_options(num_sources, opts.clone()).fit(flat.view())?;

    let masks = match mode {
        MaskMode::Binary => {
            let mut masks = Array3::<f32>::zeros((t, f, num_sources));
            for (i, &label) in fit.labels.iter().enumerate() {
                masks[(i / f, i % f, label)] = 1.0;
            }
            masks
        }
        MaskMode::Soft => {
            let affinity = flat.dot(&fit.centers.t()).mapv(sigmoid);
            affinity.into_shape((t, f, num_sources))?
        }
    };

    Ok(masks)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn row(points: &[f32], dim: usize, i: usize) -> &[f32] {
    &points[i * dim..(i + 1) * dim]
}

fn sq_dist(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Stops counting once `limit` distinct rows have been seen.
fn count_distinct(points: &[f32], dim: usize, limit: usize) -> usize {
    let mut seen: HashSet<Vec<u32>> = HashSet::new();
    for chunk in points.chunks_exact(dim) {
        // -0.0 and 0.0 are the same point
        seen.insert(chunk.iter().map(|v| (v + 0.0).to_bits()).collect());
        if seen.len() >= limit {
            break;
        }
    }
    seen.len()
}

fn mean_variance(points: &[f32], n: usize, dim: usize) -> f32 {
    let mut total = 0.0f64;
    for j in 0..dim {
        let mean = (0..n).map(|i| points[i * dim + j] as f64).sum::<f64>() / n as f64;
        let var = (0..n)
            .map(|i| {
                let v = points[i * dim + j] as f64 - mean;
                v * v
            })
            .sum::<f64>()
            / n as f64;
        total += var;
    }
    (total / dim as f64) as f32
}

fn nearest(point: &[f32], centers: &[f32], dim: usize) -> (usize, f32) {
    let mut best = (0usize, f32::INFINITY);
    for (c, center) in centers.chunks_exact(dim).enumerate() {
        let dist = sq_dist(point, center);
        if dist < best.1 {
            best = (c, dist);
        }
    }
    best
}

/// k-means++ seeding: first center uniform, then proportional to squared distance.
fn init_plus_plus(points: &[f32], n: usize, dim: usize, k: usize, rng: &mut StdRng) -> Vec<f32> {
    let mut centers: Vec<f32> = Vec::with_capacity(k * dim);
    let first = rng.gen_range(0..n);
    centers.extend_from_slice(row(points, dim, first));

    let mut closest: Vec<f32> = (0..n)
        .map(|i| sq_dist(row(points, dim, i), row(points, dim, first)))
        .collect();

    while centers.len() < k * dim {
        let total: f64 = closest.iter().map(|&d| d as f64).sum();

        let chosen = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0f64;
            let mut pick = None;
            for (i, &d) in closest.iter().enumerate() {
                acc += d as f64;
                if acc > target && d > 0.0 {
                    pick = Some(i);
                    break;
                }
            }
            // Rounding can leave the target past the last positive weight
            pick.unwrap_or_else(|| farthest(&closest))
        } else {
            farthest(&closest)
        };

        let start = centers.len();
        centers.extend_from_slice(row(points, dim, chosen));
        for (i, d) in closest.iter_mut().enumerate() {
            let nd = sq_dist(row(points, dim, i), &centers[start..start + dim]);
            if nd < *d {
                *d = nd;
            }
        }
    }

    centers
}

fn farthest(dists: &[f32]) -> usize {
    dists
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |best, (i, &d)| {
            if d > best.1 {
                (i, d)
            } else {
                best
            }
        })
        .0
}

/// One seeded restart; centers are flattened row-major (k * dim).
struct Run {
    labels: Vec<usize>,
    centers: Vec<f32>,
    inertia: f32,
    n_iter: usize,
}

fn lloyd(points: &[f32], n: usize, dim: usize, k: usize, max_iter: usize, tol: f32, seed: u64) -> Run {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centers = init_plus_plus(points, n, dim, k, &mut rng);

    let mut labels = vec![usize::MAX; n];
    let mut dists = vec![0.0f32; n];
    let mut n_iter = 0usize;

    for iter in 0..max_iter {
        n_iter = iter + 1;

        // 1) Assignment step
        let mut changed = false;
        for i in 0..n {
            let (c, d) = nearest(row(points, dim, i), &centers, dim);
            if labels[i] != c {
                labels[i] = c;
                changed = true;
            }
            dists[i] = d;
        }
        if !changed {
            break;
        }

        // 2) Update step
        let mut sums = vec![0.0f64; k * dim];
        let mut counts = vec![0usize; k];
        for (i, &c) in labels.iter().enumerate() {
            counts[c] += 1;
            for (s, &v) in sums[c * dim..(c + 1) * dim].iter_mut().zip(row(points, dim, i)) {
                *s += v as f64;
            }
        }

        let mut shift = 0.0f32;
        for c in 0..k {
            let new_center: Vec<f32> = if counts[c] == 0 {
                // Empty cluster: take the point worst served by its current center
                let i = farthest(&dists);
                dists[i] = 0.0;
                row(points, dim, i).to_vec()
            } else {
                let inv = 1.0 / counts[c] as f64;
                sums[c * dim..(c + 1) * dim]
                    .iter()
                    .map(|s| (s * inv) as f32)
                    .collect()
            };
            let old = &mut centers[c * dim..(c + 1) * dim];
            shift += sq_dist(old, &new_center);
            old.copy_from_slice(&new_center);
        }

        if shift <= tol {
            break;
        }
    }

    // Final assignment against the final centers
    let mut inertia = 0.0f64;
    for i in 0..n {
        let (c, d) = nearest(row(points, dim, i), &centers, dim);
        labels[i] = c;
        inertia += d as f64;
    }

    Run {
        labels,
        centers,
        inertia: inertia as f32,
        n_iter,
    }
}
