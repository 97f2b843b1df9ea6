//! One audio file per script line, with per-line fallback.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::audio::ArtifactValidator;
use crate::config::TtsConfig;
use crate::error::SynthError;
use crate::naming::sanitize_filename;
use crate::persona::{Speaker, strip_labels};
use crate::tts::{FallbackSynthesizer, SpeechBackend, SynthOutcome, SynthParams, SynthesisRequest};

/// Caller choices applied to every line of a batch.
#[derive(Debug, Clone, Default)]
pub struct LineOptions {
    pub voice_override: Option<String>,
    /// Skip the backend and go straight to the fallback synthesizer.
    pub force_fallback: bool,
    /// Per-key overrides laid over each speaker's defaults.
    pub params: SynthParams,
    /// Label for lines without a recognized `Name:` prefix.
    pub default_speaker: Option<String>,
}

/// A validated per-line file.
#[derive(Debug, Clone, PartialEq)]
pub struct LineArtifact {
    pub index: usize,
    pub speaker: String,
    pub path: PathBuf,
}

pub struct LineAudioGenerator {
    backend: Option<Arc<dyn SpeechBackend>>,
    fallback: Arc<dyn FallbackSynthesizer>,
    cfg: TtsConfig,
    validator: ArtifactValidator,
}

impl LineAudioGenerator {
    pub fn new(
        backend: Option<Arc<dyn SpeechBackend>>,
        fallback: Arc<dyn FallbackSynthesizer>,
        cfg: TtsConfig,
    ) -> Self {
        Self {
            backend,
            fallback,
            cfg,
            validator: ArtifactValidator::default(),
        }
    }

    pub fn with_validator(mut self, validator: ArtifactValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &TtsConfig {
        &self.cfg
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Voice for a speaker: explicit override, then persona voice, then default.
    pub fn resolve_voice(&self, speaker: Option<Speaker>, voice_override: Option<&str>) -> String {
        match (voice_override, speaker) {
            (Some(v), _) => v.to_string(),
            (None, Some(s)) => s.default_voice(&self.cfg).to_string(),
            (None, None) => self.cfg.default_voice.clone(),
        }
    }

    /// Persona defaults with the caller's overrides on top.
    pub fn resolve_params(&self, speaker: Option<Speaker>, overrides: &SynthParams) -> SynthParams {
        speaker
            .map(|s| s.default_params(&self.cfg))
            .unwrap_or_default()
            .overlay(overrides)
    }

    /// Backend only, validated. No backend reads as `NotConfigured`.
    pub async fn synthesize_primary(&self, request: &SynthesisRequest) -> SynthOutcome {
        match &self.backend {
            Some(backend) => {
                info!("Synthesizing via {} with voice '{}'", backend.name(), request.voice);
                SynthOutcome::classify(backend.synthesize(request).await, &self.validator)
            }
            None => SynthOutcome::BackendError(SynthError::NotConfigured),
        }
    }

    /// Backend first (unless forced off), then the fallback synthesizer.
    /// `None` means neither produced a valid file.
    pub async fn synthesize_with_fallback(
        &self,
        request: &SynthesisRequest,
        slow: bool,
        force_fallback: bool,
    ) -> Option<PathBuf> {
        if !force_fallback && self.backend.is_some() {
            match self.synthesize_primary(request).await {
                SynthOutcome::Success(path) => return Some(path),
                SynthOutcome::Invalid(path) => {
                    warn!("[TTS] Backend wrote invalid audio at {}; falling back", path.display())
                }
                SynthOutcome::BackendError(e) => warn!("[TTS] Backend failed, falling back: {}", e),
            }
        }

        let result = self
            .fallback
            .synthesize(&request.text, &request.out_path, slow)
            .await;
        match SynthOutcome::classify(result, &self.validator) {
            SynthOutcome::Success(path) => Some(path),
            SynthOutcome::Invalid(path) => {
                warn!("[TTS] Fallback wrote invalid audio at {}", path.display());
                None
            }
            SynthOutcome::BackendError(e) => {
                warn!("[TTS] Fallback failed: {}", e);
                None
            }
        }
    }

    /// Synthesizes `lines` in order into `out_dir` as `{speaker}_line_{n}`,
    /// `n` counting that speaker's lines from zero.
    /// Lines that fail on both paths are left out of the result.
    pub async fn generate(
        &self,
        lines: &[String],
        out_dir: &Path,
        opts: &LineOptions,
    ) -> Result<Vec<LineArtifact>, SynthError> {
        tokio::fs::create_dir_all(out_dir).await?;
        info!("[Audio Generation] Processing {} line(s)...", lines.len());

        let fallback_label = opts
            .default_speaker
            .as_deref()
            .map(sanitize_filename)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "speaker".to_string());
        let ext = self.cfg.response_format.to_lowercase();

        let mut artifacts = Vec::new();
        let mut per_speaker: HashMap<String, usize> = HashMap::new();
        for (index, line) in lines.iter().enumerate() {
            let detected = Speaker::detect(line);
            let speaker =
                detected.or_else(|| opts.default_speaker.as_deref().and_then(Speaker::from_label));
            let label = match detected {
                Some(s) => s.key().to_string(),
                None => fallback_label.clone(),
            };
            info!("[Audio Generation] Line {}: {}", index + 1, label);

            let stripped = strip_labels(line);
            let text = match speaker {
                Some(s) => s.speakable(&stripped),
                None => stripped,
            };
            if text.trim().is_empty() {
                warn!("[TTS] Line {} has nothing to speak; skipping", index + 1);
                continue;
            }

            let n = per_speaker.entry(label.clone()).or_default();
            let out_path = out_dir.join(format!("{}_line_{}.{}", label, n, ext));
            *n += 1;
            let request = SynthesisRequest {
                text,
                voice: self.resolve_voice(speaker, opts.voice_override.as_deref()),
                params: self.resolve_params(speaker, &opts.params),
                out_path,
            };
            let slow = speaker.is_some_and(Speaker::slow_fallback);
            match self
                .synthesize_with_fallback(&request, slow, opts.force_fallback)
                .await
            {
                Some(path) => artifacts.push(LineArtifact {
                    index,
                    speaker: label,
                    path,
                }),
                None => warn!("[TTS] Skipping line {}: no valid audio", index + 1),
            }
        }
        Ok(artifacts)
    }
}
