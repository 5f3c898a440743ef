mod common;

use approx::assert_abs_diff_eq;
use ndarray::{Array3, Axis};
use num_complex::Complex32;
use tempfile::tempdir;
use tf_cluster_separator::{
    clustering_separate, l41_clustering_separate, mask_separate, save_sources, separate_sources,
    write_audio, AudioData, MaskMode, SeparationConfig, SeparationError, SeparationInput,
    SeparationOutput, Separator,
};

use common::{two_tone, BandSplitModel, ConstantModel, FrequencyModel};

fn energy(row: ndarray::ArrayView1<'_, f32>) -> f32 {
    row.iter().map(|v| v * v).sum::<f32>() / row.len() as f32
}

#[test]
fn clustering_separate_two_tones() {
    let signal = two_tone(10_000, 1e4, 300.0, 3500.0);

    let sources = clustering_separate(&signal, 10_000, &FrequencyModel, 2, MaskMode::Binary)
        .expect("separation failed");

    assert_eq!(sources.nrows(), 2);
    let n = sources.ncols();
    assert!(n.abs_diff(signal.len()) <= 512, "length {n} vs {}", signal.len());

    for row in sources.rows() {
        assert!(row.iter().all(|v| v.is_finite()));
        assert!(energy(row) > 1e-2, "near-silent source: {}", energy(row));
    }
}

#[test]
fn clustering_separate_is_reproducible() {
    let signal = two_tone(6_000, 1e4, 300.0, 3500.0);

    let a = clustering_separate(&signal, 10_000, &FrequencyModel, 2, MaskMode::Soft)
        .expect("first run");
    let b = clustering_separate(&signal, 10_000, &FrequencyModel, 2, MaskMode::Soft)
        .expect("second run");
    assert_eq!(a, b);
}

#[test]
fn silent_signal_separates_to_silence() {
    let signal = vec![0.0f32; 4_000];
    let sources = clustering_separate(&signal, 10_000, &FrequencyModel, 2, MaskMode::Binary)
        .expect("separation failed");
    assert!(sources.iter().all(|v| *v == 0.0));
}

#[test]
fn too_many_sources_surfaces_clustering_error() {
    let signal = two_tone(4_000, 1e4, 300.0, 3500.0);
    match clustering_separate(&signal, 10_000, &ConstantModel, 2, MaskMode::Binary) {
        Err(SeparationError::Clustering(_)) => {}
        other => panic!("expected clustering error, got {other:?}"),
    }
}

#[test]
fn l41_output_matches_input_layout() {
    let (freq, time) = (9usize, 7usize);
    let spec = Array3::from_shape_fn((1, freq, time), |(_, f, t)| {
        Complex32::new((f as f32 * 0.4).cos() + t as f32 * 0.1, f as f32 - t as f32)
    });

    let sources = l41_clustering_separate(spec.view(), &FrequencyModel, 2, MaskMode::Binary)
        .expect("separation failed");
    assert_eq!(sources.dim(), (2, freq, time));

    let total = sources.sum_axis(Axis(0));
    for (a, b) in total.iter().zip(spec.index_axis(Axis(0), 0).iter()) {
        assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-5);
        assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-5);
    }
}

#[test]
fn separator_output_variant_follows_input() {
    let separator = Separator::new(SeparationConfig::default()).expect("config");

    let signal = two_tone(3_000, 1e4, 300.0, 3500.0);
    let out = separator
        .separate(
            &FrequencyModel,
            SeparationInput::Waveform {
                signal: &signal,
                sample_rate: 10_000,
            },
        )
        .expect("waveform separation");
    assert!(matches!(out, SeparationOutput::Waveforms(_)));
    assert!(out.into_spectrograms().is_err());

    let spec = Array3::from_elem((1, 5, 4), Complex32::new(1.0, -1.0));
    let out = separator
        .separate(&FrequencyModel, SeparationInput::Spectrogram(spec.view()))
        .expect("spectrogram separation");
    assert_eq!(out.num_sources(), 2);
    assert!(matches!(out, SeparationOutput::Spectrograms(_)));
}

#[test]
fn empty_spectrogram_batch_is_rejected() {
    let spec = Array3::<Complex32>::zeros((0, 5, 4));
    assert!(matches!(
        l41_clustering_separate(spec.view(), &FrequencyModel, 2, MaskMode::Binary),
        Err(SeparationError::ShapeMismatch(_))
    ));
}

#[test]
fn mask_separate_standardizes_sources() {
    let signal = two_tone(8_000, 1e4, 300.0, 3500.0);
    let config = SeparationConfig::direct_mask();

    let sources = mask_separate(&signal, 10_000, &BandSplitModel, &config).expect("separation failed");
    assert_eq!(sources.nrows(), 2);

    for row in sources.rows() {
        let n = row.len() as f32;
        let mean = row.sum() / n;
        let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-2);
    }
}

#[test]
fn missing_model_capability_is_reported() {
    let signal = two_tone(4_000, 1e4, 300.0, 3500.0);
    assert!(matches!(
        mask_separate(&signal, 10_000, &FrequencyModel, &SeparationConfig::direct_mask()),
        Err(SeparationError::Unsupported("predict"))
    ));
    assert!(matches!(
        clustering_separate(&signal, 10_000, &BandSplitModel, 2, MaskMode::Binary),
        Err(SeparationError::Unsupported("get_vectors"))
    ));
}

#[test]
fn separate_sources_from_file_and_save() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("mix.wav");

    let signal = two_tone(20_000, 20_000.0, 300.0, 3500.0);
    write_audio(
        &input,
        &AudioData {
            samples: signal.iter().map(|v| v * 0.5).collect(),
            sample_rate: 20_000,
            channels: 1,
        },
    )
    .expect("write failed");

    let sources = separate_sources(&input, &BandSplitModel, &SeparationConfig::direct_mask())
        .expect("separation failed");
    assert_eq!(sources.nrows(), 2);

    let paths = save_sources(sources.view(), tmp.path().join("mix"), 10_000).expect("save failed");
    assert_eq!(paths.len(), 2);
    for p in &paths {
        let r = hound::WavReader::open(p).unwrap();
        assert_eq!(r.spec().channels, 1);
        assert_eq!(r.spec().sample_rate, 10_000);
        assert_eq!(r.len() as usize, sources.ncols());
    }
}

#[test]
fn config_loads_from_json() {
    let cfg = SeparationConfig::from_json_str(
        r#"{
  "num_sources": 3,
  "mask_mode": "soft",
  "stft": { "fft_size": 1024, "window_size": 0.1, "overlap": 0.05 },
  "cluster": { "seed": 7, "workers": 2 }
}"#,
    )
    .expect("config should parse");

    assert_eq!(cfg.num_sources, 3);
    assert_eq!(cfg.mask_mode, MaskMode::Soft);
    assert_eq!(cfg.stft.fft_size, 1024);
    assert_eq!(cfg.stft.sample_rate, 1e4);
    assert_eq!(cfg.cluster.seed, 7);
    assert_eq!(cfg.cluster.n_init, 10);
    assert_eq!(cfg.preemphasis, 0.95);

    let bad = SeparationConfig::from_json_str(r#"{ "stft": { "fft_size": 128 } }"#);
    assert!(matches!(bad, Err(SeparationError::InvalidConfig(_))));
}

#[test]
fn config_file_drives_separator() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("separation.json");
    std::fs::write(
        &path,
        r#"{ "num_sources": 2, "mask_mode": "soft", "normalize_output": true, "cluster": { "seed": 3 } }"#,
    )
    .expect("write config");

    let cfg = SeparationConfig::from_json_file(&path).expect("config file should load");
    let separator = Separator::new(cfg).expect("valid config");
    assert_eq!(separator.config().num_sources, 2);
    assert_eq!(separator.config().mask_mode, MaskMode::Soft);
    assert!(separator.config().normalize_output);
    assert_eq!(separator.config().cluster.seed, 3);
    assert_eq!(separator.config().stft.fft_size, 512);

    let missing = SeparationConfig::from_json_file(dir.path().join("absent.json"));
    assert!(missing.is_err());
}
