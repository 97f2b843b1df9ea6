use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use crate::audio::ArtifactValidator;
use crate::error::SynthError;

/// Optional tuning knobs; unset keys fall through to whatever sits underneath.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthParams {
    pub temperature: Option<f32>,
    pub exaggeration: Option<f32>,
    pub cfg_weight: Option<f32>,
    pub speed_factor: Option<f32>,
    pub seed: Option<u64>,
    pub chunk_size: Option<u32>,
    pub language: Option<String>,
}

impl SynthParams {
    /// Returns `self` with every key that `over` sets replaced by `over`'s value.
    pub fn overlay(&self, over: &SynthParams) -> SynthParams {
        SynthParams {
            temperature: over.temperature.or(self.temperature),
            exaggeration: over.exaggeration.or(self.exaggeration),
            cfg_weight: over.cfg_weight.or(self.cfg_weight),
            speed_factor: over.speed_factor.or(self.speed_factor),
            seed: over.seed.or(self.seed),
            chunk_size: over.chunk_size.or(self.chunk_size),
            language: over.language.clone().or_else(|| self.language.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SynthParams::default()
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub params: SynthParams,
    pub out_path: PathBuf,
}

/// A remote synthesis service. Implementations write exactly one file at
/// `request.out_path` on success.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf, SynthError>;
}

/// Basic offline-capable synthesis used whenever the backend cannot deliver.
#[async_trait]
pub trait FallbackSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, out_path: &Path, slow: bool)
    -> Result<PathBuf, SynthError>;
}

/// Result of one synthesis attempt after validation.
#[derive(Debug)]
pub enum SynthOutcome {
    Success(PathBuf),
    Invalid(PathBuf),
    BackendError(SynthError),
}

impl SynthOutcome {
    /// Validates the artifact an attempt produced. Invalid files are removed so
    /// they can never be mistaken for output later.
    pub fn classify(result: Result<PathBuf, SynthError>, validator: &ArtifactValidator) -> Self {
        match result {
            Ok(path) if validator.is_valid(&path) => SynthOutcome::Success(path),
            Ok(path) => {
                if path.exists() {
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!("Could not remove invalid artifact {}: {}", path.display(), e);
                    }
                }
                SynthOutcome::Invalid(path)
            }
            Err(e) => SynthOutcome::BackendError(e),
        }
    }
}

/// Time source for the polling loop, swappable so tests never sleep for real.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
