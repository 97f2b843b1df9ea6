#![allow(dead_code)]

use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use voicecast::audio::{ArtifactValidator, MIN_ARTIFACT_BYTES};
use voicecast::combine::AudioCombiner;
use voicecast::config::TtsConfig;
use voicecast::dialogue::LineAudioGenerator;
use voicecast::error::SynthError;
use voicecast::render::TrackRenderer;
use voicecast::tts::{FallbackSynthesizer, SpeechBackend, SynthesisRequest};

pub const LINE_SECS: f64 = 0.3;

pub const TONE_RATE: u32 = 16_000;

pub fn write_tone(path: &Path, secs: f64) -> PathBuf {
    write_tone_at(path, secs, 0.4)
}

/// 330 Hz mono tone with peak `level`.
pub fn write_tone_at(path: &Path, secs: f64, level: f32) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TONE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(secs * TONE_RATE as f64) as u32 {
        let v = (2.0 * PI * 330.0 * i as f32 / TONE_RATE as f32).sin() * level;
        writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path.to_path_buf()
}

/// Peak level the fake fallback voices `text` at, so lines can be told apart
/// in combined output.
pub fn level_for(text: &str) -> f32 {
    (0.05 * text.chars().count() as f32).min(0.9)
}

/// Peak level of each `LINE_SECS` window of mono audio.
pub fn line_levels(samples: &[f32]) -> Vec<f32> {
    let frames = (LINE_SECS * TONE_RATE as f64) as usize;
    samples
        .chunks(frames)
        .map(|w| w.iter().fold(0f32, |m, s| m.max(s.abs())))
        .collect()
}

#[derive(Default)]
pub struct ToneBackend {
    pub requests: Mutex<Vec<SynthesisRequest>>,
}

#[async_trait]
impl SpeechBackend for ToneBackend {
    fn name(&self) -> &str {
        "tone"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf, SynthError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(write_tone(&request.out_path, LINE_SECS))
    }
}

pub struct FailingBackend;

#[async_trait]
impl SpeechBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<PathBuf, SynthError> {
        Err(SynthError::Rejected {
            status: 500,
            body: "model not loaded".into(),
        })
    }
}

#[derive(Default)]
pub struct ToneFallback {
    pub texts: Mutex<Vec<String>>,
}

#[async_trait]
impl FallbackSynthesizer for ToneFallback {
    async fn synthesize(&self, text: &str, out_path: &Path, _slow: bool) -> Result<PathBuf, SynthError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(write_tone_at(out_path, LINE_SECS, level_for(text)))
    }
}

#[derive(Default)]
pub struct DeadFallback {
    pub calls: Mutex<usize>,
}

#[async_trait]
impl FallbackSynthesizer for DeadFallback {
    async fn synthesize(&self, _: &str, _: &Path, _: bool) -> Result<PathBuf, SynthError> {
        *self.calls.lock().unwrap() += 1;
        Err(SynthError::Transport("offline".into()))
    }
}

/// Renderer over fakes. WAV bytes land in files named after `format`, so the
/// validator checks size only.
pub fn renderer(
    backend: Option<Arc<dyn SpeechBackend>>,
    fallback: Arc<dyn FallbackSynthesizer>,
    format: &str,
    require_server: bool,
) -> TrackRenderer {
    let cfg = TtsConfig {
        response_format: format.to_string(),
        require_server,
        ..Default::default()
    };
    let lines = LineAudioGenerator::new(backend, fallback, cfg).with_validator(ArtifactValidator {
        min_bytes: MIN_ARTIFACT_BYTES,
        decode_probe: false,
    });
    TrackRenderer::new(lines, AudioCombiner::default().with_ffmpeg("voicecast-test-no-ffmpeg"))
        .with_track_format(format)
}

pub fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}
