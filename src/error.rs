use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("no speech backend configured")]
    NotConfigured,
    #[error("nothing to speak")]
    EmptyText,
    #[error("backend rejected request: HTTP {status} {body}")]
    Rejected { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no new output appeared within {waited_secs}s")]
    PollTimeout { waited_secs: u64 },
    #[error("failed to download output after {attempts} attempts: {last}")]
    DownloadFailed { attempts: u32, last: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CombineError {
    #[error("no files to combine")]
    EmptyInput,
    #[error("{tool} is not available: {detail}")]
    ToolUnavailable { tool: String, detail: String },
    #[error("{tool} exited with {status}")]
    ToolFailed { tool: String, status: String },
    #[error("cannot decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("resample error: {0}")]
    Resample(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("TTS failed to produce any valid audio lines")]
    NoAudio,
    #[error("server TTS required but not available: {0}")]
    ServerRequired(String),
    #[error(transparent)]
    Combine(#[from] CombineError),
    #[error(transparent)]
    Synth(#[from] SynthError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
