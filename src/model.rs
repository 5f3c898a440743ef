use ndarray::{ArrayD, ArrayViewD};

use crate::error::{Result, SeparationError};

/// A pretrained separation network, seen only through its two entry points.
///
/// Implementations override whichever operation they support; the other one
/// reports [`SeparationError::Unsupported`].
pub trait SeparationModel {
    /// Embeds every T-F cell of a normalized input of shape (batch, time, frequency).
    ///
    /// Expected output shape: (batch, time, frequency, embedding).
    fn get_vectors(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let _ = input;
        Err(SeparationError::Unsupported("get_vectors"))
    }

    /// Predicts normalized per-source magnitudes for an input of shape
    /// (batch, time, frequency, 1).
    ///
    /// Expected output shape: (batch, time, frequency, sources).
    fn predict(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let _ = input;
        Err(SeparationError::Unsupported("predict"))
    }
}
