use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voicecast::args::{Args, Command, IntroOutroArgs, RenderArgs, StoryArgs, TtsArgs};
use voicecast::chatterbox::ChatterboxBackend;
use voicecast::combine::AudioCombiner;
use voicecast::config::TtsConfig;
use voicecast::dialogue::LineAudioGenerator;
use voicecast::gtts::GoogleTts;
use voicecast::intro_outro::{Bridge, IntroOutroAssembler};
use voicecast::reddit::fetch_post;
use voicecast::render::{RenderMode, RenderOptions, TrackRenderer};
use voicecast::script::Script;
use voicecast::tts::SpeechBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let cfg = args.tts.to_config();
    let paths = match &args.command {
        Command::Voices => return list_voices(&cfg).await,
        Command::Render(r) => render(r, &args.tts, &cfg).await?,
        Command::Story(s) => story(s, &args.tts, &cfg).await?,
    };
    for p in paths {
        println!("{}", p.display());
    }
    Ok(())
}

fn build_renderer(cfg: &TtsConfig) -> TrackRenderer {
    let backend = ChatterboxBackend::from_config(cfg).map(|b| Arc::new(b) as Arc<dyn SpeechBackend>);
    let fallback = Arc::new(GoogleTts::new(&cfg.fallback_language));
    let lines = LineAudioGenerator::new(backend, fallback, cfg.clone());
    TrackRenderer::new(lines, AudioCombiner::default())
}

async fn list_voices(cfg: &TtsConfig) -> anyhow::Result<()> {
    let backend = ChatterboxBackend::from_config(cfg)
        .context("no speech server configured; pass --base-url or set CHATTERBOX_BASE_URL")?;
    let voices = backend
        .list_predefined_voices()
        .await
        .context("failed to list predefined voices")?;
    info!("Server has {} predefined voice(s)", voices.len());
    for (i, v) in voices.iter().enumerate() {
        println!(
            "{:02}. display_name={}  filename={}",
            i + 1,
            v.display_name,
            v.filename
        );
    }
    Ok(())
}

fn render_options(tts: &TtsArgs, keep_parts: bool, default_speaker: Option<String>) -> RenderOptions {
    RenderOptions {
        voice_override: tts.tts_voice.clone(),
        params: tts.overrides(),
        default_speaker,
        force_fallback: tts.force_fallback,
        keep_parts,
        date_token: None,
    }
}

async fn render(r: &RenderArgs, tts: &TtsArgs, cfg: &TtsConfig) -> anyhow::Result<Vec<PathBuf>> {
    let contents = tokio::fs::read_to_string(&r.file)
        .await
        .with_context(|| format!("failed to read script {}", r.file.display()))?;
    let script = Script::parse(&contents);
    if script.is_empty() {
        anyhow::bail!("script {} has no lines", r.file.display());
    }

    let renderer = build_renderer(cfg);
    let opts = render_options(tts, r.keep_parts, r.default_speaker.clone());
    let mode = if r.single_track {
        RenderMode::SingleTrack {
            label: r.label.clone(),
        }
    } else {
        RenderMode::MultiTrack
    };
    info!("Rendering {} ({:?})", r.file.display(), mode);
    let paths = renderer
        .render(&script, &r.title, &r.output_dir, &mode, &opts)
        .await?;

    let label = r.label.clone().or_else(|| r.default_speaker.clone());
    wrap_intro_outro(&renderer, paths, &r.intro_outro, &r.title, label, opts).await
}

async fn story(s: &StoryArgs, tts: &TtsArgs, cfg: &TtsConfig) -> anyhow::Result<Vec<PathBuf>> {
    info!("Fetching a story from r/{}", s.subreddit);
    let post = fetch_post(&s.subreddit, s.sort, &s.time_filter, s.limit, &s.used_posts).await?;
    let script = s.character.generate(&post);

    tokio::fs::create_dir_all(&s.output_dir).await?;
    let dialogue_path = s.output_dir.join("dialogues.json");
    let record = serde_json::json!({
        "post": post,
        "character": s.character.key(),
        "script": script.lines(),
    });
    tokio::fs::write(&dialogue_path, serde_json::to_string_pretty(&record)?)
        .await
        .with_context(|| format!("failed to write {}", dialogue_path.display()))?;
    info!("Script saved to {}", dialogue_path.display());

    let renderer = build_renderer(cfg);
    let label = s.character.key().to_string();
    let opts = render_options(tts, s.keep_parts, Some(label.clone()));
    let mode = if s.character.single_speaker() {
        RenderMode::SingleTrack {
            label: Some(label.clone()),
        }
    } else {
        RenderMode::MultiTrack
    };
    let paths = renderer
        .render(&script, &post.title, &s.output_dir, &mode, &opts)
        .await?;

    wrap_intro_outro(&renderer, paths, &s.intro_outro, &post.title, Some(label), opts).await
}

async fn wrap_intro_outro(
    renderer: &TrackRenderer,
    paths: Vec<PathBuf>,
    io: &IntroOutroArgs,
    title: &str,
    label: Option<String>,
    opts: RenderOptions,
) -> anyhow::Result<Vec<PathBuf>> {
    if !io.with_intro_outro {
        return Ok(paths);
    }
    let root = std::env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf());
    let assembler = IntroOutroAssembler::new(io.to_config(), renderer.combiner().clone(), root);
    let bridge = io.with_bridge.then(|| Bridge {
        renderer,
        text: format!(
            "Right, it's DJ Cara. Today's agenda: {}. Hold tight, let's get into it.",
            title.trim()
        ),
        label,
        options: RenderOptions {
            keep_parts: false,
            ..opts
        },
    });
    let wrapped = assembler
        .apply(&paths, bridge.as_ref())
        .await
        .context("failed to add intro/outro")?;
    Ok(wrapped)
}
