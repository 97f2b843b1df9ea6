//! Turns a script into final tracks: one combined track, or one per speaker.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::combine::AudioCombiner;
use crate::dialogue::{LineArtifact, LineAudioGenerator, LineOptions};
use crate::error::RenderError;
use crate::naming::{next_base_name, sanitize_filename, today_token};
use crate::persona::Speaker;
use crate::script::Script;
use crate::tts::{SynthOutcome, SynthParams, SynthesisRequest};

const TMP_DIR: &str = ".tmp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    /// Everything in one track. Without a label the default speaker (or
    /// `dialogue`) names the file.
    SingleTrack { label: Option<String> },
    /// One track per speaker label, in first-seen order.
    MultiTrack,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub voice_override: Option<String>,
    pub params: SynthParams,
    pub default_speaker: Option<String>,
    pub force_fallback: bool,
    /// Leave the per-line files in `.tmp` after combining.
    pub keep_parts: bool,
    /// Date token for file names; today when unset.
    pub date_token: Option<String>,
}

impl RenderOptions {
    fn line_options(&self, force_fallback: bool) -> LineOptions {
        LineOptions {
            voice_override: self.voice_override.clone(),
            force_fallback,
            params: self.params.clone(),
            default_speaker: self.default_speaker.clone(),
        }
    }
}

pub struct TrackRenderer {
    lines: LineAudioGenerator,
    combiner: AudioCombiner,
    track_format: String,
}

impl TrackRenderer {
    pub fn new(lines: LineAudioGenerator, combiner: AudioCombiner) -> Self {
        Self {
            lines,
            combiner,
            track_format: "mp3".to_string(),
        }
    }

    /// Extension of final tracks.
    pub fn with_track_format(mut self, format: &str) -> Self {
        self.track_format = format.trim_start_matches('.').to_lowercase();
        self
    }

    pub fn combiner(&self) -> &AudioCombiner {
        &self.combiner
    }

    pub async fn render(
        &self,
        script: &Script,
        title: &str,
        output_dir: &Path,
        mode: &RenderMode,
        opts: &RenderOptions,
    ) -> Result<Vec<PathBuf>, RenderError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let date = opts.date_token.clone().unwrap_or_else(today_token);
        let safe_title = sanitize_filename(title);

        match mode {
            RenderMode::SingleTrack { label } => {
                let label = label
                    .as_deref()
                    .or(opts.default_speaker.as_deref())
                    .map(sanitize_filename)
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| "dialogue".to_string());
                let path = self
                    .render_single(script, &label, &safe_title, &date, output_dir, opts)
                    .await?;
                Ok(vec![path])
            }
            RenderMode::MultiTrack => {
                self.render_multi(script, &safe_title, &date, output_dir, opts)
                    .await
            }
        }
    }

    async fn render_single(
        &self,
        script: &Script,
        label: &str,
        safe_title: &str,
        date: &str,
        output_dir: &Path,
        opts: &RenderOptions,
    ) -> Result<PathBuf, RenderError> {
        let text = script.joined_text();
        if text.trim().is_empty() {
            return Err(RenderError::NoAudio);
        }
        let base = next_base_name(output_dir, label, safe_title, date)?;
        let final_path = output_dir.join(format!("{}.{}", base, self.track_format));
        let tmp = output_dir.join(TMP_DIR);
        tokio::fs::create_dir_all(&tmp).await?;

        let speaker = Speaker::from_label(label);
        let mut parts = Vec::new();
        let one_shot = if self.lines.has_backend() && !opts.force_fallback {
            let fmt = self.lines.config().response_format.to_lowercase();
            let request = SynthesisRequest {
                text: text.clone(),
                voice: self.lines.resolve_voice(speaker, opts.voice_override.as_deref()),
                params: self.lines.resolve_params(speaker, &opts.params),
                out_path: tmp.join(format!("{}.{}", base, fmt)),
            };
            parts.push(request.out_path.clone());
            match self.lines.synthesize_primary(&request).await {
                SynthOutcome::Success(raw) => Some(self.finish_one_shot(&raw, &final_path).await?),
                SynthOutcome::Invalid(path) => {
                    warn!("[TTS] Single-track output {} was invalid", path.display());
                    None
                }
                SynthOutcome::BackendError(e) => {
                    warn!("[TTS] Single-track backend failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let path = match one_shot {
            Some(path) => path,
            None => {
                if self.lines.config().require_server {
                    return Err(RenderError::ServerRequired(
                        "set CHATTERBOX_BASE_URL=http://localhost:8014 or unset TTS_REQUIRE_SERVER \
                         to allow the fallback voice"
                            .to_string(),
                    ));
                }
                info!("[TTS] Single track via per-line fallback synthesis");
                let line_opts = LineOptions {
                    default_speaker: Some(label.to_string()),
                    ..opts.line_options(true)
                };
                let artifacts = self.lines.generate(&script.lines(), &tmp, &line_opts).await?;
                if artifacts.is_empty() {
                    return Err(RenderError::NoAudio);
                }
                parts.extend(artifacts.into_iter().map(|a| a.path));
                self.combiner.combine(&parts, &final_path, 0).await?
            }
        };

        if !opts.keep_parts {
            remove_parts(&tmp, &parts).await;
        }
        info!("[TTS] Wrote {}", path.display());
        Ok(path)
    }

    /// Moves a one-shot file to its final name, converting when the formats
    /// differ. A failed conversion keeps the raw file under the final stem.
    async fn finish_one_shot(&self, raw: &Path, final_path: &Path) -> Result<PathBuf, RenderError> {
        match self.combiner.combine(&[raw.to_path_buf()], final_path, 0).await {
            Ok(path) => Ok(path),
            Err(e) => {
                let ext = raw.extension().and_then(|e| e.to_str()).unwrap_or("wav");
                let kept = final_path.with_extension(ext);
                warn!(
                    "[TTS] Conversion to {} failed ({}); keeping {}",
                    self.track_format,
                    e,
                    kept.display()
                );
                tokio::fs::copy(raw, &kept).await?;
                Ok(kept)
            }
        }
    }

    async fn render_multi(
        &self,
        script: &Script,
        safe_title: &str,
        date: &str,
        output_dir: &Path,
        opts: &RenderOptions,
    ) -> Result<Vec<PathBuf>, RenderError> {
        let tmp = output_dir.join(TMP_DIR);
        let lines = script.lines();

        let mut artifacts = self
            .lines
            .generate(&lines, &tmp, &opts.line_options(opts.force_fallback))
            .await?;
        if artifacts.is_empty() && !opts.force_fallback {
            warn!("[TTS] No valid line audio produced; forcing fallback for all lines...");
            artifacts = self
                .lines
                .generate(&lines, &tmp, &opts.line_options(true))
                .await?;
        }
        if artifacts.is_empty() {
            return Err(RenderError::NoAudio);
        }

        let mut finals = Vec::new();
        for (label, files) in group_by_speaker(&artifacts) {
            let base = next_base_name(output_dir, &label, safe_title, date)?;
            let out = output_dir.join(format!("{}.{}", base, self.track_format));
            info!("[TTS] Combining {} line(s) for {} -> {}", files.len(), label, out.display());
            finals.push(self.combiner.combine(&files, &out, 0).await?);
        }

        if !opts.keep_parts {
            let parts: Vec<PathBuf> = artifacts.into_iter().map(|a| a.path).collect();
            remove_parts(&tmp, &parts).await;
        }
        Ok(finals)
    }
}

/// Groups artifacts by speaker label. Groups keep first-seen order; files in a
/// group are ordered by line index.
pub fn group_by_speaker(artifacts: &[LineArtifact]) -> Vec<(String, Vec<PathBuf>)> {
    let mut groups: Vec<(String, Vec<&LineArtifact>)> = Vec::new();
    for a in artifacts {
        match groups.iter_mut().find(|(label, _)| *label == a.speaker) {
            Some((_, members)) => members.push(a),
            None => groups.push((a.speaker.clone(), vec![a])),
        }
    }
    groups
        .into_iter()
        .map(|(label, mut members)| {
            members.sort_by_key(|a| a.index);
            (label, members.into_iter().map(|a| a.path.clone()).collect())
        })
        .collect()
}

/// Removes the parts one render created, then `tmp` itself if nothing else
/// is left in it. Parts kept by other renders stay put.
async fn remove_parts(tmp: &Path, parts: &[PathBuf]) {
    for part in parts {
        match tokio::fs::remove_file(part).await {
            Ok(()) => debug!("Removed {}", part.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", part.display(), e),
        }
    }
    match tokio::fs::remove_dir(tmp).await {
        Ok(()) => info!("Removed {}", tmp.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("Keeping {}: {}", tmp.display(), e),
    }
}
