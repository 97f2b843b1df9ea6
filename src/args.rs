use std::path::PathBuf;
use std::time::Duration;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser, Subcommand};

use crate::config::{IntroOutroConfig, PollConfig, TtsConfig};
use crate::persona::Character;
use crate::reddit::Sort;
use crate::tts::SynthParams;

#[derive(Parser, Debug)]
#[clap(name = "voicecast", version, about = "Reddit posts to voiced audio tracks")]
pub struct Args {
    #[clap(flatten)]
    pub tts: TtsArgs,

    /// Debug logging (RUST_LOG still wins)
    #[clap(long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the server's predefined voices
    Voices,
    /// Render a script file (JSON lines or plain text) to audio
    Render(RenderArgs),
    /// Fetch a post, write a script for it and render it
    Story(StoryArgs),
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// JSON array of lines, {"lines": [...]}, {"text": "..."} or plain text
    pub file: PathBuf,

    #[clap(long)]
    pub title: String,

    #[clap(short, long, default_value = "audio_output")]
    pub output_dir: PathBuf,

    /// Combine every line into one track
    #[clap(long)]
    pub single_track: bool,

    /// File label for single-track output
    #[clap(long)]
    pub label: Option<String>,

    /// Speaker for lines without a `Name:` prefix
    #[clap(long)]
    pub default_speaker: Option<String>,

    /// Keep per-line files in .tmp
    #[clap(long)]
    pub keep_parts: bool,

    #[clap(flatten)]
    pub intro_outro: IntroOutroArgs,
}

#[derive(clap::Args, Debug)]
pub struct StoryArgs {
    #[clap(default_value = "AITAH")]
    pub subreddit: String,

    #[clap(long, value_enum, default_value = "top")]
    pub sort: Sort,

    /// hour, day, week, month, year or all (top only)
    #[clap(long, default_value = "day")]
    pub time_filter: String,

    #[clap(long, default_value_t = 25)]
    pub limit: usize,

    #[clap(short, long, value_enum, default_value = "rickmorty")]
    pub character: Character,

    #[clap(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    #[clap(long, default_value = "./config/used_posts.json")]
    pub used_posts: PathBuf,

    #[clap(long)]
    pub keep_parts: bool,

    #[clap(flatten)]
    pub intro_outro: IntroOutroArgs,
}

#[derive(clap::Args, Debug)]
pub struct IntroOutroArgs {
    /// Wrap every track with intro/outro audio
    #[clap(long)]
    pub with_intro_outro: bool,

    #[clap(long, env = "INTRO_DIR")]
    pub intro_dir: Option<PathBuf>,

    #[clap(long, env = "OUTRO_DIR")]
    pub outro_dir: Option<PathBuf>,

    /// One folder holding both, picked by `intro`/`outro` in the file name
    #[clap(long, env = "INTRO_OUTRO_DIR")]
    pub intro_outro_dir: Option<PathBuf>,

    #[clap(long, env = "INTRO_OUTRO_CROSSFADE_MS", default_value_t = 750)]
    pub crossfade_ms: u32,

    /// Speak a short DJ Cara line between intro and track
    #[clap(long)]
    pub with_bridge: bool,
}

impl IntroOutroArgs {
    pub fn to_config(&self) -> IntroOutroConfig {
        IntroOutroConfig {
            intro_dir: self.intro_dir.clone(),
            outro_dir: self.outro_dir.clone(),
            intro_outro_dir: self.intro_outro_dir.clone(),
            crossfade_ms: self.crossfade_ms,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct TtsArgs {
    /// Speech server, e.g. http://localhost:8014
    #[clap(long, global = true, env = "CHATTERBOX_BASE_URL")]
    pub base_url: Option<String>,

    #[clap(long, global = true, env = "CHATTERBOX_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Voice for every line, overriding persona voices
    #[clap(long, global = true)]
    pub tts_voice: Option<String>,

    #[clap(long, global = true)]
    pub tts_temp: Option<f32>,

    #[clap(long, global = true)]
    pub tts_exag: Option<f32>,

    #[clap(long, global = true)]
    pub tts_cfg: Option<f32>,

    #[clap(long, global = true)]
    pub tts_speed: Option<f32>,

    #[clap(long, global = true)]
    pub tts_seed: Option<u64>,

    /// Skip the server and use the fallback voice
    #[clap(long, global = true)]
    pub force_fallback: bool,

    #[clap(long, global = true, env = "TTS_DEFAULT_VOICE", default_value = "alloy")]
    pub default_voice: String,

    #[clap(long, global = true, env = "TTS_DJCARA_VOICE", default_value = "DJ_Caralong.mp3")]
    pub djcara_voice: String,

    /// Format of per-line files [default: wav for a server on port 8014, else mp3]
    #[clap(long, global = true, env = "TTS_RESPONSE_FORMAT")]
    pub response_format: Option<String>,

    #[clap(long, global = true, env = "TTS_TEMP", default_value_t = 0.6, hide = true)]
    pub default_temp: f32,

    #[clap(long, global = true, env = "TTS_EXAG", default_value_t = 0.9, hide = true)]
    pub default_exag: f32,

    #[clap(long, global = true, env = "TTS_CFG_WEIGHT", default_value_t = 0.3, hide = true)]
    pub default_cfg: f32,

    #[clap(long, global = true, env = "TTS_SPEED_FACTOR", default_value_t = 1.0, hide = true)]
    pub default_speed: f32,

    #[clap(long, global = true, env = "TTS_SEED", default_value_t = 2024, hide = true)]
    pub default_seed: u64,

    #[clap(long, global = true, env = "TTS_CHUNK_SIZE", hide = true)]
    pub chunk_size: Option<u32>,

    #[clap(long, global = true, env = "TTS_SPLIT_TEXT", default_value_t = true, action = ArgAction::Set, hide = true)]
    pub split_text: bool,

    #[clap(long, global = true, env = "TTS_SAMPLE_RATE", default_value_t = 24_000, hide = true)]
    pub sample_rate: u32,

    #[clap(long, global = true, env = "TTS_LANGUAGE", hide = true)]
    pub language: Option<String>,

    #[clap(long, global = true, env = "TTS_DJCARA_TEMP", default_value_t = 0.75, hide = true)]
    pub djcara_temp: f32,

    #[clap(long, global = true, env = "TTS_DJCARA_EXAG", default_value_t = 0.70, hide = true)]
    pub djcara_exag: f32,

    #[clap(long, global = true, env = "TTS_DJCARA_CFG", default_value_t = 0.30, hide = true)]
    pub djcara_cfg: f32,

    #[clap(long, global = true, env = "TTS_DJCARA_SPEED", default_value_t = 1.05, hide = true)]
    pub djcara_speed: f32,

    #[clap(long, global = true, env = "TTS_DJCARA_SEED", default_value_t = 42, hide = true)]
    pub djcara_seed: u64,

    #[clap(long, global = true, env = "TTS_DJCARA_CHUNK_SIZE", hide = true)]
    pub djcara_chunk_size: Option<u32>,

    /// 0 retries downloads forever
    #[clap(long, global = true, env = "CHATTERBOX_DOWNLOAD_RETRIES", default_value_t = 0, hide = true)]
    pub download_retries: u32,

    /// Seconds; unset polls until output appears
    #[clap(long, global = true, env = "CHATTERBOX_POLL_TIMEOUT", hide = true)]
    pub poll_timeout: Option<f64>,

    #[clap(long, global = true, env = "CHATTERBOX_POLL_INTERVAL", default_value_t = 1.0, hide = true)]
    pub poll_interval: f64,

    #[clap(long, global = true, env = "CHATTERBOX_VERBOSE_POLL", value_parser = FalseyValueParser::new(), hide = true)]
    pub verbose_poll: bool,

    /// Fail instead of using the fallback voice for single tracks
    #[clap(long, global = true, env = "TTS_REQUIRE_SERVER", value_parser = FalseyValueParser::new())]
    pub require_server: bool,
}

impl TtsArgs {
    pub fn to_config(&self) -> TtsConfig {
        let base = TtsConfig::default();
        let base_url = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| u.trim_end_matches('/').to_string());
        // a Chatterbox server on its usual port writes WAV
        let response_format = match (&self.response_format, &base_url) {
            (Some(fmt), _) => fmt.to_lowercase(),
            (None, Some(url)) if url.contains("8014") => "wav".to_string(),
            (None, _) => "mp3".to_string(),
        };
        TtsConfig {
            base_url,
            api_key: self.api_key.clone().filter(|k| !k.trim().is_empty()),
            default_voice: self.default_voice.clone(),
            djcara_voice: self.djcara_voice.clone(),
            response_format,
            split_text: self.split_text,
            sample_rate: Some(self.sample_rate),
            defaults: SynthParams {
                temperature: Some(self.default_temp),
                exaggeration: Some(self.default_exag),
                cfg_weight: Some(self.default_cfg),
                speed_factor: Some(self.default_speed),
                seed: Some(self.default_seed),
                chunk_size: self.chunk_size,
                language: self.language.clone(),
            },
            djcara: SynthParams {
                temperature: Some(self.djcara_temp),
                exaggeration: Some(self.djcara_exag),
                cfg_weight: Some(self.djcara_cfg),
                speed_factor: Some(self.djcara_speed),
                seed: Some(self.djcara_seed),
                chunk_size: self.djcara_chunk_size,
                language: None,
            },
            poll: PollConfig {
                interval: secs(self.poll_interval).unwrap_or(base.poll.interval),
                timeout: self.poll_timeout.and_then(secs),
                download_retries: self.download_retries,
                verbose: self.verbose_poll,
                ..base.poll
            },
            require_server: self.require_server,
            ..base
        }
    }

    /// Per-request overrides from the `--tts-*` flags.
    pub fn overrides(&self) -> SynthParams {
        SynthParams {
            temperature: self.tts_temp,
            exaggeration: self.tts_exag,
            cfg_weight: self.tts_cfg,
            speed_factor: self.tts_speed,
            seed: self.tts_seed,
            ..Default::default()
        }
    }
}

fn secs(value: f64) -> Option<Duration> {
    (value.is_finite() && value > 0.0).then(|| Duration::from_secs_f64(value))
}
