//! Wraps finished tracks with intro and outro stingers, and optionally a short
//! spoken bridge between the intro and the main content.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::combine::AudioCombiner;
use crate::config::IntroOutroConfig;
use crate::error::CombineError;
use crate::render::{RenderMode, RenderOptions, TrackRenderer};
use crate::script::Script;

const AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "wav", "ogg", "m4a", "flac"];

/// Sorted audio files directly inside `dir`; a missing directory is empty.
pub fn list_audio_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .collect();
    files.sort();
    files
}

fn has_hint(path: &Path, hint: &str) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().to_lowercase().contains(hint))
}

/// First intro and outro found. Explicit directories win over the shared
/// directory, which wins over `{root}/intro` and `{root}/outro`. When nothing
/// turns up, `{root}/intro_outros` is tried as a shared directory. In a shared
/// directory files named `*intro*` / `*outro*` are preferred.
pub fn pick_intro_outro(cfg: &IntroOutroConfig, root: &Path) -> (Option<PathBuf>, Option<PathBuf>) {
    let mut shared = cfg.intro_outro_dir.clone();
    let mut intro_dir = cfg
        .intro_dir
        .clone()
        .or_else(|| shared.clone())
        .unwrap_or_else(|| root.join("intro"));
    let mut outro_dir = cfg
        .outro_dir
        .clone()
        .or_else(|| shared.clone())
        .unwrap_or_else(|| root.join("outro"));
    let mut intros = list_audio_files(&intro_dir);
    let mut outros = list_audio_files(&outro_dir);

    if intros.is_empty() && outros.is_empty() {
        let guessed = root.join("intro_outros");
        if guessed.is_dir() {
            intro_dir = guessed.clone();
            outro_dir = guessed.clone();
            intros = list_audio_files(&guessed);
            outros = intros.clone();
            shared = Some(guessed);
        }
    }

    let unified = shared
        .as_ref()
        .is_some_and(|s| *s == intro_dir && *s == outro_dir);
    if unified {
        let intro = intros
            .iter()
            .find(|p| has_hint(p, "intro"))
            .or(intros.first())
            .cloned();
        let outro = outros
            .iter()
            .find(|p| has_hint(p, "outro"))
            .or(outros.first())
            .cloned();
        return (intro, outro);
    }
    (intros.first().cloned(), outros.first().cloned())
}

/// `{stem}_with_intro_outro.mp3` next to `main`.
pub fn intro_outro_output(main: &Path) -> PathBuf {
    let stem = main
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string());
    main.with_file_name(format!("{}_with_intro_outro.mp3", stem))
}

/// Joins intro → bridge → main → outro, skipping whichever is absent.
pub async fn combine_with_intro_outro(
    combiner: &AudioCombiner,
    main: &Path,
    intro: Option<&Path>,
    outro: Option<&Path>,
    bridge: Option<&Path>,
    output: &Path,
    crossfade_ms: u32,
) -> Result<PathBuf, CombineError> {
    let parts: Vec<PathBuf> = [intro, bridge, Some(main), outro]
        .into_iter()
        .flatten()
        .map(Path::to_path_buf)
        .collect();
    combiner.combine(&parts, output, crossfade_ms).await
}

/// Spoken transition rendered per track.
pub struct Bridge<'a> {
    pub renderer: &'a TrackRenderer,
    pub text: String,
    /// Persona label; `djcara` when unset.
    pub label: Option<String>,
    pub options: RenderOptions,
}

pub struct IntroOutroAssembler {
    cfg: IntroOutroConfig,
    combiner: AudioCombiner,
    root: PathBuf,
}

impl IntroOutroAssembler {
    /// `root` is where the default `intro`, `outro` and `intro_outros`
    /// directories are looked up.
    pub fn new(cfg: IntroOutroConfig, combiner: AudioCombiner, root: PathBuf) -> Self {
        Self {
            cfg,
            combiner,
            root,
        }
    }

    /// Returns one wrapped file per input, or the inputs untouched when no
    /// intro or outro exists.
    pub async fn apply(
        &self,
        files: &[PathBuf],
        bridge: Option<&Bridge<'_>>,
    ) -> Result<Vec<PathBuf>, CombineError> {
        let (intro, outro) = pick_intro_outro(&self.cfg, &self.root);
        if intro.is_none() && outro.is_none() {
            info!("[Intro/Outro] No intro or outro audio found. Skipping.");
            return Ok(files.to_vec());
        }

        let mut results = Vec::with_capacity(files.len());
        for main in files {
            let bridge_file = match bridge {
                Some(b) => synthesize_bridge(b, main).await,
                None => None,
            };
            let output = intro_outro_output(main);
            let combined = combine_with_intro_outro(
                &self.combiner,
                main,
                intro.as_deref(),
                outro.as_deref(),
                bridge_file.as_deref(),
                &output,
                self.cfg.crossfade_ms,
            )
            .await;
            if let Some(b) = &bridge_file {
                if let Err(e) = tokio::fs::remove_file(b).await {
                    warn!("[Intro/Outro] Could not remove bridge {}: {}", b.display(), e);
                }
            }
            let out = combined?;
            info!("[Intro/Outro] Created: {}", out.display());
            results.push(out);
        }
        Ok(results)
    }
}

async fn synthesize_bridge(bridge: &Bridge<'_>, main: &Path) -> Option<PathBuf> {
    let dir = main.parent().unwrap_or(Path::new("."));
    let label = bridge.label.clone().unwrap_or_else(|| "djcara".to_string());
    let script = Script::Monologue(bridge.text.trim().to_string());
    let mode = RenderMode::SingleTrack { label: Some(label) };
    match bridge
        .renderer
        .render(&script, "bridge", dir, &mode, &bridge.options)
        .await
    {
        Ok(paths) => paths.into_iter().next(),
        Err(e) => {
            warn!("[Intro/Outro] Bridge synthesis failed: {}", e);
            None
        }
    }
}
