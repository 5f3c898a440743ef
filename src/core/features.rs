//! Model input features computed from complex spectrograms.

use std::f32::consts::PI;

use ndarray::{Array, Array2, Array3, ArrayView, ArrayView1, ArrayView2, ArrayView3, Dimension};
use num_complex::Complex32;
use tracing::debug;

/// Normalized model input plus what is needed to undo the normalization.
#[derive(Clone, Debug)]
pub struct Features {
    /// Square-root magnitude scaled to [0, 1], shape (time, frequency).
    pub input: Array2<f32>,
    /// Phase unwrapped along the frequency axis, shape (time, frequency).
    pub phases: Array2<f32>,
    pub max: f32,
    pub min: f32,
}

impl Features {
    /// Maps normalized model output back to linear magnitudes: `(y * (max - min) + min)^2`.
    pub fn denormalize<D: Dimension>(&self, output: ArrayView<'_, f32, D>) -> Array<f32, D> {
        let range = self.max - self.min;
        let min = self.min;
        output.mapv(|y| {
            let v = y * range + min;
            v * v
        })
    }
}

pub fn featurize_spectrogram(spectrogram: ArrayView2<'_, Complex32>) -> Features {
    let mut input = spectrogram.mapv(|c| c.norm().sqrt());
    let (min, max) = min_max_normalize(&mut input);

    let mut phases = spectrogram.mapv(|c| c.arg());
    for mut row in phases.rows_mut() {
        if let Some(slice) = row.as_slice_mut() {
            unwrap_phase(slice);
        } else {
            let mut owned = row.to_vec();
            unwrap_phase(&mut owned);
            row.assign(&ArrayView1::from(owned.as_slice()));
        }
    }

    Features {
        input,
        phases,
        max,
        min,
    }
}

/// Prepares an already batched spectrogram of shape (batch, frequency, time)
/// for a model: sqrt-magnitude, min-max over the whole batch, transposed to
/// (batch, time, frequency).
pub fn normalize_model_batch(spec_batch: ArrayView3<'_, Complex32>) -> Array3<f32> {
    let mut mags = spec_batch.mapv(|c| c.norm().sqrt());
    min_max_normalize(&mut mags);
    let transposed = mags.permuted_axes([0, 2, 1]);
    transposed.as_standard_layout().into_owned()
}

/// Scales `x` into [0, 1] in place and returns the original (min, max).
///
/// Constant or non-finite input is zeroed instead of divided by a zero range.
fn min_max_normalize<D: Dimension>(x: &mut Array<f32, D>) -> (f32, f32) {
    if x.is_empty() {
        return (0.0, 0.0);
    }
    let min = x.iter().copied().fold(f32::INFINITY, f32::min);
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if !range.is_finite() || range <= f32::EPSILON {
        debug!(min, max, "degenerate magnitude range, features zeroed");
        x.fill(0.0);
        return (min, max);
    }

    x.mapv_inplace(|v| (v - min) / range);
    (min, max)
}

/// In-place phase unwrapping with the same conventions as numpy's `unwrap`.
fn unwrap_phase(phase: &mut [f32]) {
    let mut correction = 0.0f32;
    let mut prev = match phase.first() {
        Some(&p) => p,
        None => return,
    };
    for p in phase.iter_mut().skip(1) {
        let raw = *p;
        let dd = raw - prev;
        let mut dd_mod = (dd + PI).rem_euclid(2.0 * PI) - PI;
        if dd_mod == -PI && dd > 0.0 {
            dd_mod = PI;
        }
        if dd.abs() >= PI {
            correction += dd_mod - dd;
        }
        prev = raw;
        *p = raw + correction;
    }
}
