use ndarray::Array2;
use num_complex::Complex32;
use tracing::debug;

use crate::{
    core::dsp::{istft, undo_preemphasis},
    error::{Result, SeparationError},
    types::StftConfig,
};

const MIN_STD: f32 = 1e-8;

/// Inverts every masked spectrogram to a waveform and stacks them as
/// (sources, samples), in input order.
///
/// Each waveform has the preemphasis removed and, when `normalize` is set,
/// is standardized to zero mean and unit variance. Silent sources skip the
/// standardization.
pub fn reconstruct_waveforms(
    masked: &[Array2<Complex32>],
    cfg: &StftConfig,
    preemphasis_coeff: f32,
    normalize: bool,
) -> Result<Array2<f32>> {
    let Some(first) = masked.first() else {
        return Err(SeparationError::ShapeMismatch(
            "no spectrograms to reconstruct".into(),
        ));
    };
    if let Some(bad) = masked.iter().find(|m| m.dim() != first.dim()) {
        return Err(SeparationError::ShapeMismatch(format!(
            "masked spectrograms differ in shape: {:?} vs {:?}",
            first.dim(),
            bad.dim()
        )));
    }

    let mut waveforms = Vec::with_capacity(masked.len());
    for spec in masked {
        let waveform = istft(spec.view(), cfg, None)?;
        let mut waveform = undo_preemphasis(&waveform, preemphasis_coeff);
        if normalize {
            standardize(&mut waveform);
        }
        waveforms.push(waveform);
    }

    let len = waveforms[0].len();
    let flat: Vec<f32> = waveforms.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((masked.len(), len), flat)?)
}

/// Zero mean, unit variance. Returns false when the signal has no variance
/// and was left untouched.
pub fn standardize(signal: &mut [f32]) -> bool {
    if signal.is_empty() {
        return false;
    }
    let n = signal.len() as f64;
    let mean = signal.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = signal
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = var.sqrt() as f32;

    if !std.is_finite() || std <= MIN_STD {
        debug!(std, "zero-variance waveform, skipping normalization");
        return false;
    }

    let mean = mean as f32;
    for x in signal.iter_mut() {
        *x = (*x - mean) / std;
    }
    true
}
