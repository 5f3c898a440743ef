use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeparationError};

#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// How cluster assignments are turned into per-source masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskMode {
    /// One-hot masks from the k-means labels; every T-F cell belongs to exactly one source.
    #[default]
    Binary,
    /// Sigmoid of the dot product between each embedding and each cluster center.
    Soft,
}

/// Short-time Fourier transform parameters.
///
/// `window_size` and `overlap` are in seconds; `overlap` is the hop between
/// the starts of successive frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StftConfig {
    pub sample_rate: f32,
    pub window_size: f32,
    pub overlap: f32,
    pub fft_size: usize,
    pub two_sided: bool,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1e4,
            window_size: 0.0512,
            overlap: 0.0256,
            fft_size: 512,
            two_sided: false,
        }
    }
}

impl StftConfig {
    /// Framing used by models that predict magnitudes directly.
    pub fn direct_mask() -> Self {
        Self {
            sample_rate: 1e4,
            window_size: 0.05,
            overlap: 0.025,
            fft_size: 500,
            two_sided: false,
        }
    }

    pub fn frame_len(&self) -> usize {
        (self.window_size * self.sample_rate).round() as usize
    }

    pub fn hop_len(&self) -> usize {
        (self.overlap * self.sample_rate).round() as usize
    }

    pub fn freq_bins(&self) -> usize {
        if self.two_sided {
            self.fft_size
        } else {
            self.fft_size / 2 + 1
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(SeparationError::InvalidConfig(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        let frame = self.frame_len();
        let hop = self.hop_len();
        if frame == 0 || hop == 0 {
            return Err(SeparationError::InvalidConfig(format!(
                "window ({frame} samples) and hop ({hop} samples) must be non-empty"
            )));
        }
        if hop > frame {
            return Err(SeparationError::InvalidConfig(format!(
                "hop ({hop}) exceeds window ({frame})"
            )));
        }
        if self.fft_size < frame {
            return Err(SeparationError::InvalidConfig(format!(
                "fft_size ({}) is smaller than the window ({frame} samples)",
                self.fft_size
            )));
        }
        Ok(())
    }
}

/// K-means settings for the vector clusterer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f32,
    /// Threads used for k-means restarts. 1 keeps everything on the calling thread.
    pub workers: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            workers: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    pub stft: StftConfig,
    pub num_sources: usize,
    pub mask_mode: MaskMode,
    pub preemphasis: f32,
    /// Standardize reconstructed waveforms to zero mean and unit variance.
    pub normalize_output: bool,
    pub cluster: ClusterOptions,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            stft: StftConfig::default(),
            num_sources: 2,
            mask_mode: MaskMode::Binary,
            preemphasis: 0.95,
            normalize_output: false,
            cluster: ClusterOptions::default(),
        }
    }
}

impl SeparationConfig {
    /// Settings for [`crate::mask_separate`]: direct-mask framing and
    /// standardized output waveforms.
    pub fn direct_mask() -> Self {
        Self {
            stft: StftConfig::direct_mask(),
            normalize_output: true,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.stft.validate()?;
        if self.num_sources == 0 {
            return Err(SeparationError::InvalidConfig(
                "num_sources must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.preemphasis) {
            return Err(SeparationError::InvalidConfig(format!(
                "preemphasis coefficient must be in [0, 1), got {}",
                self.preemphasis
            )));
        }
        if self.cluster.n_init == 0 || self.cluster.max_iter == 0 {
            return Err(SeparationError::InvalidConfig(
                "k-means needs at least one restart and one iteration".into(),
            ));
        }
        Ok(())
    }
}
