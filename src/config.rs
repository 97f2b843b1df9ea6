//! Configuration handed to each component at construction.
//!
//! Nothing below the CLI reads the environment; `args.rs` resolves flags and
//! environment variables into these structs.

use std::path::PathBuf;
use std::time::Duration;

use crate::tts::SynthParams;

/// Settings for the speech backend and the persona defaults layered on top of it.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Base URL of the synthesis server; `None` disables the backend entirely.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub default_voice: String,
    pub djcara_voice: String,
    /// Format requested from the server, also used as the per-line file extension.
    pub response_format: String,
    pub split_text: bool,
    pub sample_rate: Option<u32>,
    /// Tuning sent when neither persona nor caller set a value.
    pub defaults: SynthParams,
    /// DJ Cara's own tuning, applied before caller overrides.
    pub djcara: SynthParams,
    pub poll: PollConfig,
    /// Fail single-track rendering instead of falling back to local synthesis.
    pub require_server: bool,
    /// Language passed to the local fallback synthesizer.
    pub fallback_language: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            default_voice: "alloy".to_string(),
            djcara_voice: "DJ_Caralong.mp3".to_string(),
            response_format: "mp3".to_string(),
            split_text: true,
            sample_rate: Some(24_000),
            defaults: SynthParams {
                temperature: Some(0.6),
                exaggeration: Some(0.9),
                cfg_weight: Some(0.3),
                speed_factor: Some(1.0),
                seed: Some(2024),
                chunk_size: None,
                language: None,
            },
            djcara: SynthParams {
                temperature: Some(0.75),
                exaggeration: Some(0.70),
                cfg_weight: Some(0.30),
                speed_factor: Some(1.05),
                seed: Some(42),
                chunk_size: None,
                language: None,
            },
            poll: PollConfig::default(),
            require_server: false,
            fallback_language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls until a new output appears.
    pub timeout: Option<Duration>,
    /// 0 retries downloads forever.
    pub download_retries: u32,
    pub download_backoff: Duration,
    pub verbose: bool,
    pub log_every: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
            download_retries: 0,
            download_backoff: Duration::from_millis(1500),
            verbose: false,
            log_every: Duration::from_secs(5),
        }
    }
}

/// Where intro and outro stingers live and how they are joined.
#[derive(Debug, Clone)]
pub struct IntroOutroConfig {
    pub intro_dir: Option<PathBuf>,
    pub outro_dir: Option<PathBuf>,
    pub intro_outro_dir: Option<PathBuf>,
    pub crossfade_ms: u32,
}

impl Default for IntroOutroConfig {
    fn default() -> Self {
        Self {
            intro_dir: None,
            outro_dir: None,
            intro_outro_dir: None,
            crossfade_ms: 750,
        }
    }
}
