//! # tf-cluster-separator
//!
//! Glue between audio spectrograms and a pretrained separation model:
//! normalized features go in, per-source waveforms or masked spectrograms
//! come out, either by clustering the model's T-F embeddings or by using the
//! magnitudes it predicts directly.

pub mod audio;
pub mod core;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod types;

pub use crate::{
    audio::{downmix_to_mono, read_audio, write_audio},
    core::{
        cluster::{get_cluster_masks, KMeans, KMeansFit},
        dsp::{istft, make_stft_features, preemphasis, resample, stft, undo_preemphasis},
        features::{featurize_spectrogram, normalize_model_batch, Features},
        masking::apply_masks,
        reconstruct::{reconstruct_waveforms, standardize},
    },
    error::{Result, SeparationError},
    model::SeparationModel,
    pipeline::{
        clustering_separate, l41_clustering_separate, mask_separate, save_sources,
        separate_sources, SeparationInput, SeparationOutput, Separator,
    },
    types::{AudioData, ClusterOptions, MaskMode, SeparationConfig, StftConfig},
};
