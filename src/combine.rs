use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::audio::{PcmAudio, decode_pcm, write_wav};
use crate::error::CombineError;

/// How inputs are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineStrategy {
    /// In-process decoding when every input decodes, ffmpeg otherwise.
    Auto,
    Library,
    Process,
}

#[derive(Debug, Clone)]
pub struct AudioCombiner {
    strategy: CombineStrategy,
    ffmpeg: String,
}

impl Default for AudioCombiner {
    fn default() -> Self {
        Self {
            strategy: CombineStrategy::Auto,
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl AudioCombiner {
    pub fn new(strategy: CombineStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    /// Program used for encoding and the process path.
    pub fn with_ffmpeg(mut self, program: impl Into<String>) -> Self {
        self.ffmpeg = program.into();
        self
    }

    /// Joins `inputs` in order into `output`. A crossfade only applies on the
    /// library path.
    pub async fn combine(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        crossfade_ms: u32,
    ) -> Result<PathBuf, CombineError> {
        if inputs.is_empty() {
            return Err(CombineError::EmptyInput);
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // A lone input already in the target format is copied as is.
        if let [only] = inputs {
            if same_extension(only, output) {
                if only.as_path() != output {
                    tokio::fs::copy(only, output).await?;
                }
                debug!("Single input {} copied to {}", only.display(), output.display());
                return Ok(output.to_path_buf());
            }
        }

        match self.strategy {
            CombineStrategy::Library => self.combine_library(inputs, output, crossfade_ms).await,
            CombineStrategy::Process => self.combine_process(inputs, output, crossfade_ms).await,
            CombineStrategy::Auto => match decode_all(inputs) {
                Ok(segments) => self.mix_and_export(segments, output, crossfade_ms).await,
                Err(e) => {
                    warn!("In-process decoding unavailable ({}); using ffmpeg concat", e);
                    self.combine_process(inputs, output, crossfade_ms).await
                }
            },
        }
    }

    pub async fn combine_library(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        crossfade_ms: u32,
    ) -> Result<PathBuf, CombineError> {
        let segments = decode_all(inputs)?;
        self.mix_and_export(segments, output, crossfade_ms).await
    }

    async fn mix_and_export(
        &self,
        segments: Vec<PcmAudio>,
        output: &Path,
        crossfade_ms: u32,
    ) -> Result<PathBuf, CombineError> {
        let mixed = mix(segments, crossfade_ms)?;
        info!(
            "Combined audio: {:.2}s at {} Hz x{} -> {}",
            mixed.duration_secs(),
            mixed.sample_rate,
            mixed.channels,
            output.display()
        );
        self.export(&mixed, output).await
    }

    /// WAV outputs are written directly; anything else is encoded by ffmpeg
    /// from an intermediate WAV.
    async fn export(&self, audio: &PcmAudio, output: &Path) -> Result<PathBuf, CombineError> {
        let is_wav = output
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        let staging = sibling(output, "mix.wav");
        write_wav(&staging, audio)?;

        let result = if is_wav {
            tokio::fs::rename(&staging, output)
                .await
                .map_err(CombineError::from)
        } else {
            let args: Vec<OsString> = vec![
                "-hide_banner".into(),
                "-loglevel".into(),
                "error".into(),
                "-y".into(),
                "-i".into(),
                staging.clone().into_os_string(),
                "-b:a".into(),
                "192k".into(),
                output.as_os_str().to_owned(),
            ];
            self.run_ffmpeg(&args, &[]).await
        };
        remove_quietly(&staging).await;
        if result.is_err() {
            remove_quietly(output).await;
        }
        result.map(|_| output.to_path_buf())
    }

    async fn combine_process(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        crossfade_ms: u32,
    ) -> Result<PathBuf, CombineError> {
        if crossfade_ms > 0 {
            warn!("Crossfade needs in-process decoding; joining without it");
        }
        let non_mp3: Vec<String> = inputs
            .iter()
            .filter(|p| !p.extension().is_some_and(|e| e.eq_ignore_ascii_case("mp3")))
            .map(|p| p.display().to_string())
            .collect();

        let list_path = sibling(output, "concat.txt");
        let mut listing = String::new();
        for p in inputs {
            let abs = std::path::absolute(p)?;
            listing.push_str(&format!(
                "file '{}'\n",
                abs.to_string_lossy().replace('\'', r"'\''")
            ));
        }
        tokio::fs::write(&list_path, listing).await?;

        let copy_args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list_path.clone().into_os_string(),
            "-c".into(),
            "copy".into(),
            output.as_os_str().to_owned(),
        ];
        let copied = self.run_ffmpeg(&copy_args, &non_mp3).await;
        remove_quietly(&list_path).await;

        match copied {
            Ok(()) => {
                info!("Concatenated {} file(s) into {}", inputs.len(), output.display());
                Ok(output.to_path_buf())
            }
            Err(e @ CombineError::ToolUnavailable { .. }) => Err(e),
            Err(e) => {
                warn!("ffmpeg concat with copy failed ({}); retrying with re-encode", e);
                let mut args: Vec<OsString> = vec![
                    "-hide_banner".into(),
                    "-loglevel".into(),
                    "error".into(),
                    "-y".into(),
                ];
                for p in inputs {
                    args.push("-i".into());
                    args.push(std::path::absolute(p)?.into_os_string());
                }
                args.push("-filter_complex".into());
                args.push(concat_filter(inputs.len()).into());
                for a in ["-map", "[a]", "-ar", "44100", "-ac", "2", "-b:a", "192k"] {
                    args.push(a.into());
                }
                args.push(output.as_os_str().to_owned());
                if let Err(e) = self.run_ffmpeg(&args, &non_mp3).await {
                    remove_quietly(output).await;
                    return Err(e);
                }
                info!("Re-encoded {} file(s) into {}", inputs.len(), output.display());
                Ok(output.to_path_buf())
            }
        }
    }

    async fn run_ffmpeg(&self, args: &[OsString], non_mp3: &[String]) -> Result<(), CombineError> {
        debug!("{} {:?}", self.ffmpeg, args);
        let status = match Command::new(&self.ffmpeg).args(args).status().await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let detail = if non_mp3.is_empty() {
                    "install ffmpeg and make sure it is on PATH".to_string()
                } else {
                    format!(
                        "non-MP3 inputs ({}) need in-process decoding or ffmpeg; install ffmpeg",
                        non_mp3.join(", ")
                    )
                };
                return Err(CombineError::ToolUnavailable {
                    tool: self.ffmpeg.clone(),
                    detail,
                });
            }
            Err(e) => return Err(CombineError::Io(e)),
        };
        if !status.success() {
            return Err(CombineError::ToolFailed {
                tool: self.ffmpeg.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

fn decode_all(inputs: &[PathBuf]) -> Result<Vec<PcmAudio>, CombineError> {
    inputs.iter().map(|p| decode_pcm(p)).collect()
}

/// Brings every segment to the widest layout present, then appends in order.
fn mix(segments: Vec<PcmAudio>, crossfade_ms: u32) -> Result<PcmAudio, CombineError> {
    let rate = segments.iter().map(|s| s.sample_rate).max().unwrap_or(44_100);
    let channels = segments.iter().map(|s| s.channels).max().unwrap_or(1);
    let mut out = PcmAudio::empty(rate, channels);
    for seg in segments {
        let seg = seg.convert(rate, channels)?;
        out.append(&seg, crossfade_ms);
    }
    Ok(out)
}

fn same_extension(a: &Path, b: &Path) -> bool {
    match (a.extension(), b.extension()) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

/// `[0:a][1:a]...concat=n=N:v=0:a=1[a]`
fn concat_filter(n: usize) -> String {
    let inputs: String = (0..n).map(|i| format!("[{}:a]", i)).collect();
    format!("{}concat=n={}:v=0:a=1[a]", inputs, n)
}

/// Hidden working file next to `output`.
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "combined".to_string());
    output.with_file_name(format!(".{}.{}", stem, suffix))
}

async fn remove_quietly(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!("could not remove {}: {}", path.display(), e);
        }
    }
}
