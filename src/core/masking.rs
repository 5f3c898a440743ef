use ndarray::{Array2, ArrayView2, ArrayView3, Axis, Zip};
use num_complex::Complex32;

use crate::error::{Result, SeparationError};

/// Multiplies `spectrogram` (time, frequency) by every mask slice of
/// `masks` (time, frequency, sources). Output order follows the source axis.
pub fn apply_masks(
    spectrogram: ArrayView2<'_, Complex32>,
    masks: ArrayView3<'_, f32>,
) -> Result<Vec<Array2<Complex32>>> {
    let (t, f, _) = masks.dim();
    if (t, f) != spectrogram.dim() {
        return Err(SeparationError::ShapeMismatch(format!(
            "masks cover {}x{} cells but the spectrogram is {}x{}",
            t,
            f,
            spectrogram.nrows(),
            spectrogram.ncols()
        )));
    }

    let masked = masks
        .axis_iter(Axis(2))
        .map(|mask| {
            let mut out = Array2::<Complex32>::zeros((t, f));
            Zip::from(&mut out)
                .and(&spectrogram)
                .and(&mask)
                .for_each(|o, &s, &m| *o = s * m);
            out
        })
        .collect();

    Ok(masked)
}
