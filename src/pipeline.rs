use std::path::{Path, PathBuf};

use ndarray::{stack, Array2, Array3, Array4, ArrayD, ArrayView2, ArrayView3, Axis, Ix4, Zip};
use num_complex::Complex32;
use tracing::{debug, info};

use crate::{
    audio::{downmix_to_mono, read_audio, write_audio},
    core::{
        cluster::get_cluster_masks,
        dsp::make_stft_features,
        features::{featurize_spectrogram, normalize_model_batch},
        masking::apply_masks,
        reconstruct::reconstruct_waveforms,
    },
    error::{Result, SeparationError},
    model::SeparationModel,
    types::{AudioData, MaskMode, SeparationConfig},
};

/// What the caller hands to the separator.
#[derive(Clone, Copy, Debug)]
pub enum SeparationInput<'a> {
    /// Raw mono waveform at any rate; resampled, preemphasized and transformed here.
    Waveform { signal: &'a [f32], sample_rate: u32 },
    /// Already batched complex spectrogram of shape (batch, frequency, time).
    Spectrogram(ArrayView3<'a, Complex32>),
}

/// Output form, matching the input variant.
#[derive(Clone, Debug)]
pub enum SeparationOutput {
    /// Shape (sources, samples).
    Waveforms(Array2<f32>),
    /// Masked spectrograms of shape (sources, frequency, time).
    Spectrograms(Array3<Complex32>),
}

impl SeparationOutput {
    pub fn num_sources(&self) -> usize {
        match self {
            SeparationOutput::Waveforms(w) => w.nrows(),
            SeparationOutput::Spectrograms(s) => s.len_of(Axis(0)),
        }
    }

    pub fn into_waveforms(self) -> Result<Array2<f32>> {
        match self {
            SeparationOutput::Waveforms(w) => Ok(w),
            SeparationOutput::Spectrograms(_) => Err(SeparationError::ShapeMismatch(
                "separation produced spectrograms, not waveforms".into(),
            )),
        }
    }

    pub fn into_spectrograms(self) -> Result<Array3<Complex32>> {
        match self {
            SeparationOutput::Spectrograms(s) => Ok(s),
            SeparationOutput::Waveforms(_) => Err(SeparationError::ShapeMismatch(
                "separation produced waveforms, not spectrograms".into(),
            )),
        }
    }
}

/// The (time, frequency) spectrogram to mask and the tensor the model sees.
struct Prepared {
    spectrogram: Array2<Complex32>,
    model_input: ArrayD<f32>,
}

/// Clustering separator: model vectors → k-means masks → masked spectrograms,
/// with input preparation and output finalization picked by the input variant.
#[derive(Clone, Debug)]
pub struct Separator {
    config: SeparationConfig,
}

impl Separator {
    pub fn new(config: SeparationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    pub fn separate<M: SeparationModel + ?Sized>(
        &self,
        model: &M,
        input: SeparationInput<'_>,
    ) -> Result<SeparationOutput> {
        let prepared = self.prepare(input)?;
        debug!(
            spectrogram = ?prepared.spectrogram.dim(),
            model_input = ?prepared.model_input.shape(),
            "prepared separation input"
        );

        let vectors = model.get_vectors(prepared.model_input.view())?;
        let masks = get_cluster_masks(
            vectors.view(),
            self.config.num_sources,
            self.config.mask_mode,
            &self.config.cluster,
        )?;
        let masked = apply_masks(prepared.spectrogram.view(), masks.view())?;

        let output = self.finalize(input, masked)?;
        info!(
            sources = output.num_sources(),
            mode = ?self.config.mask_mode,
            "separation complete"
        );
        Ok(output)
    }

    fn prepare(&self, input: SeparationInput<'_>) -> Result<Prepared> {
        match input {
            SeparationInput::Waveform {
                signal,
                sample_rate,
            } => {
                let spectrogram = make_stft_features(
                    signal,
                    sample_rate,
                    &self.config.stft,
                    self.config.preemphasis,
                )?;
                let features = featurize_spectrogram(spectrogram.view());
                let model_input = features.input.insert_axis(Axis(0)).into_dyn();
                Ok(Prepared {
                    spectrogram,
                    model_input,
                })
            }
            SeparationInput::Spectrogram(spec) => {
                let (batch, freq, time) = spec.dim();
                if batch == 0 || freq == 0 || time == 0 {
                    return Err(SeparationError::ShapeMismatch(format!(
                        "spectrogram batch must be non-empty (batch, frequency, time), got {:?}",
                        spec.dim()
                    )));
                }
                let spectrogram = spec
                    .index_axis(Axis(0), 0)
                    .t()
                    .as_standard_layout()
                    .into_owned();
                let model_input = normalize_model_batch(spec).into_dyn();
                Ok(Prepared {
                    spectrogram,
                    model_input,
                })
            }
        }
    }

    fn finalize(
        &self,
        input: SeparationInput<'_>,
        masked: Vec<Array2<Complex32>>,
    ) -> Result<SeparationOutput> {
        match input {
            SeparationInput::Waveform { .. } => {
                let waveforms = reconstruct_waveforms(
                    &masked,
                    &self.config.stft,
                    self.config.preemphasis,
                    self.config.normalize_output,
                )?;
                Ok(SeparationOutput::Waveforms(waveforms))
            }
            SeparationInput::Spectrogram(_) => {
                let views: Vec<ArrayView2<'_, Complex32>> = masked.iter().map(|m| m.view()).collect();
                // (sources, time, frequency) back to the caller's (sources, frequency, time)
                let stacked = stack(Axis(0), &views)?.permuted_axes([0, 2, 1]);
                Ok(SeparationOutput::Spectrograms(
                    stacked.as_standard_layout().into_owned(),
                ))
            }
        }
    }
}

/// Separates a raw mono waveform into `num_sources` waveforms of shape
/// (num_sources, samples) using the default clustering configuration.
pub fn clustering_separate<M: SeparationModel + ?Sized>(
    signal: &[f32],
    sample_rate: u32,
    model: &M,
    num_sources: usize,
    mask_mode: MaskMode,
) -> Result<Array2<f32>> {
    let config = SeparationConfig {
        num_sources,
        mask_mode,
        ..SeparationConfig::default()
    };
    Separator::new(config)?
        .separate(
            model,
            SeparationInput::Waveform {
                signal,
                sample_rate,
            },
        )?
        .into_waveforms()
}

/// Separates a batched spectrogram (batch, frequency, time) into masked
/// spectrograms of shape (num_sources, frequency, time). Only batch 0 is masked.
pub fn l41_clustering_separate<M: SeparationModel + ?Sized>(
    spec: ArrayView3<'_, Complex32>,
    model: &M,
    num_sources: usize,
    mask_mode: MaskMode,
) -> Result<Array3<Complex32>> {
    let config = SeparationConfig {
        num_sources,
        mask_mode,
        ..SeparationConfig::default()
    };
    Separator::new(config)?
        .separate(model, SeparationInput::Spectrogram(spec))?
        .into_spectrograms()
}

/// Direct-mask separation through [`SeparationModel::predict`].
///
/// The model sees the normalized magnitude as (1, time, frequency, 1) and
/// returns normalized magnitudes (1, time, frequency, sources); these are
/// denormalized, recombined with the mixture phase and inverted.
pub fn mask_separate<M: SeparationModel + ?Sized>(
    signal: &[f32],
    sample_rate: u32,
    model: &M,
    config: &SeparationConfig,
) -> Result<Array2<f32>> {
    config.validate()?;

    let spectrogram = make_stft_features(signal, sample_rate, &config.stft, config.preemphasis)?;
    let features = featurize_spectrogram(spectrogram.view());
    let (t, f) = features.input.dim();

    let model_input = Array4::from_shape_vec((1, t, f, 1), features.input.iter().copied().collect())?;
    let output = model
        .predict(model_input.into_dyn().view())?
        .into_dimensionality::<Ix4>()?;

    let (batch, ot, of, sources) = output.dim();
    if batch == 0 || ot != t || of != f || sources == 0 {
        return Err(SeparationError::ShapeMismatch(format!(
            "model output {:?} does not match input cells ({t}, {f})",
            output.dim()
        )));
    }

    let magnitudes = features.denormalize(output.index_axis(Axis(0), 0));
    let specs: Vec<Array2<Complex32>> = magnitudes
        .axis_iter(Axis(2))
        .map(|mag| {
            Zip::from(&mag)
                .and(&features.phases)
                .map_collect(|&m, &p| Complex32::from_polar(m, p))
        })
        .collect();

    let waveforms = reconstruct_waveforms(&specs, &config.stft, config.preemphasis, config.normalize_output)?;
    info!(sources, samples = waveforms.ncols(), "mask separation complete");
    Ok(waveforms)
}

/// Reads an audio file, downmixes it to mono and runs [`mask_separate`].
pub fn separate_sources<P: AsRef<Path>, M: SeparationModel + ?Sized>(
    path: P,
    model: &M,
    config: &SeparationConfig,
) -> Result<Array2<f32>> {
    let path = path.as_ref();
    std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("File does not exist: {}: {e}", path.display()))?;

    let audio = read_audio(path)?;
    let mono = downmix_to_mono(&audio.samples, audio.channels);
    mask_separate(&mono, audio.sample_rate, model, config)
}

/// Writes one mono WAV per source as `{base}_source{i}.wav` and returns the paths.
pub fn save_sources<P: AsRef<Path>>(
    sources: ArrayView2<'_, f32>,
    base_path: P,
    sample_rate: u32,
) -> Result<Vec<PathBuf>> {
    let base = base_path.as_ref().to_string_lossy().into_owned();

    let mut paths = Vec::with_capacity(sources.nrows());
    for (i, source) in sources.rows().into_iter().enumerate() {
        let path = PathBuf::from(format!("{base}_source{i}.wav"));
        write_audio(
            &path,
            &AudioData {
                samples: source.to_vec(),
                sample_rate,
                channels: 1,
            },
        )?;
        paths.push(path);
    }

    Ok(paths)
}
