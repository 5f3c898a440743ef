use ndarray::{Array2, ArrayView2};
use num_complex::Complex32;
use rubato::{FftFixedInOut, Resampler};
use rustfft::{num_traits::Zero, FftPlanner};
use tracing::debug;

use crate::{
    error::{Result, SeparationError},
    types::StftConfig,
};

const RESAMPLE_CHUNK: usize = 1024;

pub fn compute_hann(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * (i as f32) / denom).cos())
        .collect()
}

/// Number of frames `stft` produces for a signal of `len` samples.
pub fn frame_count(len: usize, cfg: &StftConfig) -> usize {
    let frame_len = cfg.frame_len();
    if len <= frame_len {
        1
    } else {
        1 + (len - frame_len) / cfg.hop_len()
    }
}

/// Complex spectrogram with shape (frames, bins).
///
/// Frames start at sample 0 (no centering), each frame is Hann-windowed and
/// zero-padded to `fft_size`. A signal shorter than one window is zero-padded
/// to a single frame.
pub fn stft(signal: &[f32], cfg: &StftConfig) -> Result<Array2<Complex32>> {
    cfg.validate()?;

    let frame_len = cfg.frame_len();
    let hop = cfg.hop_len();
    let n_fft = cfg.fft_size;
    let bins = cfg.freq_bins();
    let frames = frame_count(signal.len(), cfg);

    let window = compute_hann(frame_len);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);

    let mut out = Array2::<Complex32>::zeros((frames, bins));
    let mut buf = vec![Complex32::zero(); n_fft];

    for (fr, mut row) in out.rows_mut().into_iter().enumerate() {
        buf.fill(Complex32::zero());

        let start = fr * hop;
        for (i, w) in window.iter().enumerate() {
            let x = signal.get(start + i).copied().unwrap_or(0.0);
            buf[i] = Complex32::new(x * w, 0.0);
        }

        fft.process(&mut buf);

        for (dst, src) in row.iter_mut().zip(buf.iter()) {
            *dst = *src;
        }
    }

    Ok(out)
}

/// Inverse of [`stft`]: windowed overlap-add normalized by the summed squared window.
///
/// When `length` is given the output is truncated or zero-extended to it,
/// otherwise it spans `(frames - 1) * hop + window` samples.
pub fn istft(spec: ArrayView2<'_, Complex32>, cfg: &StftConfig, length: Option<usize>) -> Result<Vec<f32>> {
    cfg.validate()?;

    let bins = cfg.freq_bins();
    if spec.ncols() != bins {
        return Err(SeparationError::ShapeMismatch(format!(
            "spectrogram has {} frequency bins, configuration expects {}",
            spec.ncols(),
            bins
        )));
    }

    let frame_len = cfg.frame_len();
    let hop = cfg.hop_len();
    let n_fft = cfg.fft_size;
    let frames = spec.nrows();

    let natural_len = if frames == 0 {
        0
    } else {
        (frames - 1) * hop + frame_len
    };

    let window = compute_hann(frame_len);
    let ifft = FftPlanner::<f32>::new().plan_fft_inverse(n_fft);
    let scale = 1.0 / (n_fft as f32);

    let mut out = vec![0.0f32; natural_len];
    let mut window_sum = vec![0.0f32; natural_len];
    let mut buf = vec![Complex32::zero(); n_fft];

    for (fr, row) in spec.rows().into_iter().enumerate() {
        buf.fill(Complex32::zero());
        for (dst, src) in buf.iter_mut().zip(row.iter()) {
            *dst = *src;
        }

        if !cfg.two_sided {
            // Rebuild the negative frequencies from the conjugate mirror
            for fi in 1..bins {
                let neg = n_fft - fi;
                if neg >= bins {
                    buf[neg] = buf[fi].conj();
                }
            }
            buf[0].im = 0.0;
            if n_fft % 2 == 0 {
                buf[n_fft / 2].im = 0.0;
            }
        }

        ifft.process(&mut buf);

        let start = fr * hop;
        for (i, w) in window.iter().enumerate() {
            let pos = start + i;
            out[pos] += buf[i].re * scale * w;
            window_sum[pos] += w * w;
        }
    }

    for (x, &sum) in out.iter_mut().zip(window_sum.iter()) {
        if sum > 1e-10 {
            *x /= sum;
        }
    }

    if let Some(len) = length {
        out.resize(len, 0.0);
    }

    Ok(out)
}

/// First-order high-pass `y[n] = x[n] - coeff * x[n - 1]`.
pub fn preemphasis(signal: &[f32], coeff: f32) -> Vec<f32> {
    let mut prev = 0.0f32;
    signal
        .iter()
        .map(|&x| {
            let y = x - coeff * prev;
            prev = x;
            y
        })
        .collect()
}

/// Inverse of [`preemphasis`]: `x[n] = y[n] + coeff * x[n - 1]`.
pub fn undo_preemphasis(signal: &[f32], coeff: f32) -> Vec<f32> {
    let mut prev = 0.0f32;
    signal
        .iter()
        .map(|&y| {
            let x = y + coeff * prev;
            prev = x;
            x
        })
        .collect()
}

/// Mono resampling with rubato's FFT resampler. The output is trimmed of the
/// resampler delay and holds `ceil(len * to / from)` samples.
pub fn resample(signal: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == 0 || to == 0 {
        return Err(SeparationError::InvalidConfig(format!(
            "cannot resample from {from} Hz to {to} Hz"
        )));
    }
    if from == to || signal.is_empty() {
        return Ok(signal.to_vec());
    }

    let mut resampler = FftFixedInOut::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 1)
        .map_err(|e| SeparationError::Audio(format!("Failed to create resampler: {e}")))?;

    let expected = ((signal.len() as u64 * to as u64 + from as u64 - 1) / from as u64) as usize;
    let delay = resampler.output_delay();
    let mut out: Vec<f32> = Vec::with_capacity(expected + delay);

    let mut pos = 0usize;
    while pos + resampler.input_frames_next() <= signal.len() {
        let n = resampler.input_frames_next();
        let input = vec![&signal[pos..pos + n]];
        let chunk = resampler
            .process(&input, None)
            .map_err(|e| SeparationError::Audio(format!("Resampling failed: {e}")))?;
        out.extend_from_slice(&chunk[0]);
        pos += n;
    }

    if pos < signal.len() {
        let input = vec![&signal[pos..]];
        let chunk = resampler
            .process_partial(Some(input.as_slice()), None)
            .map_err(|e| SeparationError::Audio(format!("Resampling failed: {e}")))?;
        out.extend_from_slice(&chunk[0]);
    }

    // Flush the delay line
    while out.len() < expected + delay {
        let chunk = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| SeparationError::Audio(format!("Resampling failed: {e}")))?;
        if chunk[0].is_empty() {
            break;
        }
        out.extend_from_slice(&chunk[0]);
    }

    let mut out: Vec<f32> = out.into_iter().skip(delay).take(expected).collect();
    out.resize(expected, 0.0);

    debug!(from, to, input = signal.len(), output = out.len(), "resampled");
    Ok(out)
}

/// Model-rate spectrogram of a raw signal: resample to `cfg.sample_rate`,
/// apply preemphasis, then [`stft`].
pub fn make_stft_features(
    signal: &[f32],
    sample_rate: u32,
    cfg: &StftConfig,
    preemphasis_coeff: f32,
) -> Result<Array2<Complex32>> {
    let target_rate = cfg.sample_rate.round() as u32;
    let resampled = resample(signal, sample_rate, target_rate)?;
    let emphasized = preemphasis(&resampled, preemphasis_coeff);
    stft(&emphasized, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_is_symmetric_and_zero_at_edges() {
        let w = compute_hann(9);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-6);
        for i in 0..9 {
            assert!((w[i] - w[8 - i]).abs() < 1e-6);
        }
    }

    #[test]
    fn frame_count_covers_short_signals() {
        let cfg = StftConfig::default();
        assert_eq!(frame_count(0, &cfg), 1);
        assert_eq!(frame_count(cfg.frame_len(), &cfg), 1);
        assert_eq!(frame_count(cfg.frame_len() + cfg.hop_len(), &cfg), 2);
    }
}
