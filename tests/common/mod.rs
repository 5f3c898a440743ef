#![allow(dead_code)]

use ndarray::{Array4, ArrayD, ArrayViewD};
use tf_cluster_separator::{Result, SeparationError, SeparationModel};

/// Embeds every cell by its relative frequency position.
pub struct FrequencyModel;

impl SeparationModel for FrequencyModel {
    fn get_vectors(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let shape = input.shape();
        if shape.len() != 3 {
            return Err(SeparationError::ShapeMismatch(format!("{shape:?}")));
        }
        let (b, t, f) = (shape[0], shape[1], shape[2]);
        Ok(Array4::from_shape_fn((b, t, f, 1), |(_, _, fi, _)| fi as f32 / f as f32).into_dyn())
    }
}

/// Same embedding for every cell.
pub struct ConstantModel;

impl SeparationModel for ConstantModel {
    fn get_vectors(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let shape = input.shape();
        Ok(ArrayD::from_elem(vec![shape[0], shape[1], shape[2], 4], 0.25))
    }
}

/// Splits the normalized input into a low band and a high band.
pub struct BandSplitModel;

impl SeparationModel for BandSplitModel {
    fn predict(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let shape = input.shape();
        let (b, t, f) = (shape[0], shape[1], shape[2]);
        Ok(Array4::from_shape_fn((b, t, f, 2), |(bi, ti, fi, s)| {
            let low = fi < f / 2;
            if (s == 0) == low {
                input[[bi, ti, fi, 0]]
            } else {
                0.0
            }
        })
        .into_dyn())
    }
}

pub fn two_tone(len: usize, sample_rate: f32, f1: f32, f2: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate;
            0.5 * (2.0 * std::f32::consts::PI * f1 * t).sin()
                + 0.5 * (2.0 * std::f32::consts::PI * f2 * t).sin()
        })
        .collect()
}
