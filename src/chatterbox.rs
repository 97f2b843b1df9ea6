//! Client for a Chatterbox TTS server.
//!
//! The server answers `POST /tts` slowly and sometimes drops the connection
//! while still producing the file, so the backend snapshots the newest output
//! before submitting and then polls `/api/outputs` until a different file shows
//! up:
//!
//! - `GET  /get_predefined_voices`
//! - `POST /tts`
//! - `GET  /api/outputs?limit=1[&prefix=...]`
//! - `GET  /outputs/<filename>`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TtsConfig;
use crate::error::SynthError;
use crate::tts::{Clock, SpeechBackend, SynthesisRequest, TokioClock};
use crate::utils::write_atomic;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PredefinedVoice {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputItem {
    pub filename: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub modified: Option<serde_json::Value>,
    #[serde(default)]
    pub url: Option<String>,
}

/// JSON body of `POST /tts`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TtsBody {
    pub text: String,
    pub voice_mode: String,
    pub predefined_voice_id: String,
    pub output_format: String,
    pub split_text: bool,
    pub chunk_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exaggeration: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_factor: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Transport(String),
    #[error("HTTP {status} {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

/// The raw HTTP surface, separated from the polling logic.
#[async_trait]
pub trait ChatterboxApi: Send + Sync {
    async fn list_voices(&self) -> Result<Vec<PredefinedVoice>, ApiError>;

    async fn latest_output(&self, prefix: Option<&str>) -> Result<Option<OutputItem>, ApiError>;

    async fn submit(&self, body: &TtsBody) -> Result<(), ApiError>;

    async fn download(&self, item: &OutputItem) -> Result<Vec<u8>, ApiError>;
}

pub struct HttpChatterboxApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpChatterboxApi {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(
            self.client
                .get(format!("{}{}", self.base_url, path))
                .header(ACCEPT, "application/json"),
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }
    Ok(resp)
}

#[async_trait]
impl ChatterboxApi for HttpChatterboxApi {
    async fn list_voices(&self) -> Result<Vec<PredefinedVoice>, ApiError> {
        debug!("GET {}/get_predefined_voices", self.base_url);
        let resp = self
            .get("/get_predefined_voices")
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        let data: serde_json::Value = check_status(resp).await?.json().await?;
        let voices = match data {
            serde_json::Value::Array(items) => items
                .into_iter()
                .filter(|v| v.is_object())
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        };
        Ok(voices)
    }

    async fn latest_output(&self, prefix: Option<&str>) -> Result<Option<OutputItem>, ApiError> {
        let mut req = self.get("/api/outputs").query(&[("limit", "1")]);
        if let Some(p) = prefix {
            req = req.query(&[("prefix", p)]);
        }
        let resp = req.send().await?;
        let items: Vec<OutputItem> = check_status(resp).await?.json().await?;
        Ok(items.into_iter().next())
    }

    async fn submit(&self, body: &TtsBody) -> Result<(), ApiError> {
        let resp = self
            .authorize(
                self.client
                    .post(format!("{}/tts", self.base_url))
                    .header(ACCEPT, "application/json")
                    .json(body),
            )
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn download(&self, item: &OutputItem) -> Result<Vec<u8>, ApiError> {
        let rel = item
            .url
            .clone()
            .unwrap_or_else(|| format!("/outputs/{}", item.filename));
        info!("Downloading: {}{}", self.base_url, rel);
        let resp = self.get(&rel).send().await?;
        let bytes = check_status(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Auto-scaled chunk size: longer texts get bigger chunks.
pub fn auto_chunk_size(text: &str) -> u32 {
    match text.chars().count() {
        n if n > 2400 => 360,
        n if n > 1200 => 240,
        _ => 120,
    }
}

/// Stem of the voice file, used to filter the outputs listing.
pub fn voice_prefix(voice: &str) -> Option<String> {
    Path::new(voice)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
}

pub struct ChatterboxBackend {
    api: Arc<dyn ChatterboxApi>,
    clock: Arc<dyn Clock>,
    cfg: TtsConfig,
}

impl ChatterboxBackend {
    /// HTTP backend for `cfg.base_url`, or `None` when no server is configured.
    pub fn from_config(cfg: &TtsConfig) -> Option<Self> {
        let Some(base_url) = cfg.base_url.as_deref() else {
            info!("No server base URL configured. Set CHATTERBOX_BASE_URL=http://localhost:8014");
            return None;
        };
        let api = HttpChatterboxApi::new(base_url, cfg.api_key.clone());
        Some(Self::with_api(Arc::new(api), Arc::new(TokioClock), cfg.clone()))
    }

    pub fn with_api(api: Arc<dyn ChatterboxApi>, clock: Arc<dyn Clock>, cfg: TtsConfig) -> Self {
        Self { api, clock, cfg }
    }

    pub async fn list_predefined_voices(&self) -> Result<Vec<PredefinedVoice>, SynthError> {
        self.api.list_voices().await.map_err(|e| match e {
            ApiError::Status { status, body } => SynthError::Rejected { status, body },
            ApiError::Transport(msg) => SynthError::Transport(msg),
        })
    }

    pub fn build_body(&self, request: &SynthesisRequest) -> TtsBody {
        let p = self.cfg.defaults.overlay(&request.params);
        TtsBody {
            text: request.text.clone(),
            voice_mode: "predefined".to_string(),
            predefined_voice_id: request.voice.clone(),
            output_format: self.cfg.response_format.to_lowercase(),
            split_text: self.cfg.split_text,
            chunk_size: p.chunk_size.unwrap_or_else(|| auto_chunk_size(&request.text)),
            temperature: p.temperature,
            exaggeration: p.exaggeration,
            cfg_weight: p.cfg_weight,
            speed_factor: p.speed_factor,
            seed: p.seed,
            language: p.language,
            sample_rate: self.cfg.sample_rate,
        }
    }

    /// Newest output, with listing failures treated as "nothing yet".
    async fn latest(&self, prefix: Option<&str>) -> Option<OutputItem> {
        match self.api.latest_output(prefix).await {
            Ok(item) => item,
            Err(e) => {
                warn!("outputs fetch error: {}; continuing to wait...", e);
                None
            }
        }
    }

    async fn wait_for_new_output(
        &self,
        prefix: Option<&str>,
        last_seen: Option<&str>,
    ) -> Result<OutputItem, SynthError> {
        let poll = &self.cfg.poll;
        let start = self.clock.now();
        let mut next_log = Duration::ZERO;
        let shown_prefix = prefix.unwrap_or("");
        let shown_last = last_seen.unwrap_or("none");
        loop {
            self.clock.sleep(poll.interval).await;
            let latest = self.latest(prefix).await;
            if let Some(item) = &latest {
                if Some(item.filename.as_str()) != last_seen {
                    return Ok(item.clone());
                }
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= next_log {
                match (&latest, poll.verbose) {
                    (Some(item), true) => info!(
                        "Poll {}s, waiting for prefix '{}'. latest=({}, {}, {}), last_seen={}",
                        elapsed.as_secs(),
                        shown_prefix,
                        item.filename,
                        item.size_bytes
                            .map(|b| format!("{}KB", b / 1024))
                            .unwrap_or_else(|| "?".to_string()),
                        item.modified
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_default(),
                        shown_last
                    ),
                    _ => match poll.timeout {
                        Some(t) => info!(
                            "Polling outputs (elapsed {}s/{}s), waiting for new file with prefix '{}', last_seen={}",
                            elapsed.as_secs(),
                            t.as_secs(),
                            shown_prefix,
                            shown_last
                        ),
                        None => info!(
                            "Polling outputs (elapsed {}s), waiting for new file with prefix '{}', last_seen={}",
                            elapsed.as_secs(),
                            shown_prefix,
                            shown_last
                        ),
                    },
                }
                next_log = elapsed + poll.log_every;
            }

            if let Some(timeout) = poll.timeout {
                if elapsed >= timeout {
                    warn!(
                        "Reached poll timeout ({}s) without a new file; stopping.",
                        timeout.as_secs()
                    );
                    return Err(SynthError::PollTimeout {
                        waited_secs: elapsed.as_secs(),
                    });
                }
            }
        }
    }

    async fn download_to(&self, item: &OutputItem, out_path: &Path) -> Result<PathBuf, SynthError> {
        let attempts = self.cfg.poll.download_retries;
        let mut i = 0;
        let mut last = String::new();
        while attempts == 0 || i < attempts {
            i += 1;
            match self.api.download(item).await {
                Ok(bytes) => {
                    write_atomic(out_path, &bytes).await?;
                    info!("Saved: {} ({} bytes)", out_path.display(), bytes.len());
                    return Ok(out_path.to_path_buf());
                }
                Err(e) => {
                    if attempts > 0 {
                        warn!("Download attempt {}/{} failed: {}", i, attempts, e);
                    } else {
                        warn!("Download attempt {} failed: {}; retrying...", i, e);
                    }
                    last = e.to_string();
                    if attempts == 0 || i < attempts {
                        self.clock.sleep(self.cfg.poll.download_backoff).await;
                    }
                }
            }
        }
        Err(SynthError::DownloadFailed { attempts, last })
    }
}

#[async_trait]
impl SpeechBackend for ChatterboxBackend {
    fn name(&self) -> &str {
        "Chatterbox"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf, SynthError> {
        let prefix = voice_prefix(&request.voice);
        let before = self.latest(prefix.as_deref()).await;
        let before_name = before.map(|b| b.filename);

        let body = self.build_body(request);
        info!(
            "POST /tts voice={} text_len={}",
            request.voice,
            request.text.chars().count()
        );
        match self.api.submit(&body).await {
            Ok(()) => {}
            Err(ApiError::Status { status, body }) => {
                return Err(SynthError::Rejected { status, body });
            }
            Err(ApiError::Transport(e)) => {
                warn!("POST exception ({}); proceeding to poll for output...", e);
            }
        }

        let item = self
            .wait_for_new_output(prefix.as_deref(), before_name.as_deref())
            .await?;
        self.download_to(&item, &request.out_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::tts::SynthParams;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    struct FakeClock {
        start: Instant,
        offset: Mutex<Duration>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            *self.offset.lock().unwrap() += duration;
        }
    }

    #[derive(Default)]
    struct FakeApi {
        /// Served in order; once drained the last entry repeats.
        listings: Mutex<VecDeque<Result<Option<OutputItem>, ApiError>>>,
        last_listing: Mutex<Option<OutputItem>>,
        submit_result: Mutex<Option<ApiError>>,
        downloads: Mutex<VecDeque<Result<Vec<u8>, ApiError>>>,
        submitted: Mutex<Vec<TtsBody>>,
        listing_calls: Mutex<usize>,
        prefixes: Mutex<Vec<Option<String>>>,
    }

    impl FakeApi {
        fn listing(self, item: Option<&str>) -> Self {
            self.listings.lock().unwrap().push_back(Ok(item.map(output)));
            self
        }

        fn listing_error(self) -> Self {
            self.listings
                .lock()
                .unwrap()
                .push_back(Err(ApiError::Transport("connection reset".into())));
            self
        }

        fn then_download(self, result: Result<Vec<u8>, ApiError>) -> Self {
            self.downloads.lock().unwrap().push_back(result);
            self
        }

        fn submit_fails(self, err: ApiError) -> Self {
            *self.submit_result.lock().unwrap() = Some(err);
            self
        }
    }

    fn output(name: &str) -> OutputItem {
        OutputItem {
            filename: name.to_string(),
            size_bytes: Some(4096),
            modified: None,
            url: None,
        }
    }

    #[async_trait]
    impl ChatterboxApi for FakeApi {
        async fn list_voices(&self) -> Result<Vec<PredefinedVoice>, ApiError> {
            Ok(vec![PredefinedVoice {
                display_name: "Cara".into(),
                filename: "DJ_Caralong.mp3".into(),
            }])
        }

        async fn latest_output(
            &self,
            prefix: Option<&str>,
        ) -> Result<Option<OutputItem>, ApiError> {
            *self.listing_calls.lock().unwrap() += 1;
            self.prefixes
                .lock()
                .unwrap()
                .push(prefix.map(str::to_string));
            match self.listings.lock().unwrap().pop_front() {
                Some(Ok(item)) => {
                    *self.last_listing.lock().unwrap() = item.clone();
                    Ok(item)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last_listing.lock().unwrap().clone()),
            }
        }

        async fn submit(&self, body: &TtsBody) -> Result<(), ApiError> {
            self.submitted.lock().unwrap().push(body.clone());
            match self.submit_result.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn download(&self, _item: &OutputItem) -> Result<Vec<u8>, ApiError> {
            self.downloads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::Transport("no download queued".into())))
        }
    }

    fn backend(api: Arc<FakeApi>, poll: PollConfig) -> ChatterboxBackend {
        let cfg = TtsConfig {
            base_url: Some("http://localhost:8014".into()),
            poll,
            ..Default::default()
        };
        ChatterboxBackend::with_api(api, Arc::new(FakeClock::new()), cfg)
    }

    fn request(dir: &Path, text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            voice: "DJ_Caralong.mp3".to_string(),
            params: SynthParams::default(),
            out_path: dir.join("line.mp3"),
        }
    }

    #[tokio::test]
    async fn downloads_first_new_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let api = Arc::new(
            FakeApi::default()
                .listing(Some("DJ_Caralong_old.wav"))
                .listing(Some("DJ_Caralong_old.wav"))
                .listing_error()
                .listing(Some("DJ_Caralong_new.wav"))
                .then_download(Ok(vec![7u8; 2048])),
        );
        let b = backend(api.clone(), PollConfig::default());

        let path = b.synthesize(&request(dir.path(), "Hello")).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 2048);
        assert_eq!(*api.listing_calls.lock().unwrap(), 4);
        assert!(
            api.prefixes
                .lock()
                .unwrap()
                .iter()
                .all(|p| p.as_deref() == Some("DJ_Caralong"))
        );
    }

    #[tokio::test]
    async fn rejection_fails_without_polling() {
        let dir = tempfile::TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default().listing(None).submit_fails(ApiError::Status {
            status: 400,
            body: "unknown voice".into(),
        }));
        let b = backend(api.clone(), PollConfig::default());

        let err = b.synthesize(&request(dir.path(), "Hello")).await.unwrap_err();
        assert!(matches!(err, SynthError::Rejected { status: 400, .. }));
        assert_eq!(*api.listing_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn transport_error_on_submit_still_polls() {
        let dir = tempfile::TempDir::new().unwrap();
        let api = Arc::new(
            FakeApi::default()
                .listing(None)
                .listing(Some("DJ_Caralong_1.wav"))
                .submit_fails(ApiError::Transport("read timed out".into()))
                .then_download(Ok(vec![1u8; 1500])),
        );
        let b = backend(api, PollConfig::default());

        let path = b.synthesize(&request(dir.path(), "Hello")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn poll_timeout_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default().listing(Some("DJ_Caralong_old.wav")));
        let poll = PollConfig {
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let b = backend(api.clone(), poll);

        let err = b.synthesize(&request(dir.path(), "Hello")).await.unwrap_err();
        assert!(matches!(err, SynthError::PollTimeout { waited_secs: 5 }));
        // one snapshot plus five one-second polls
        assert_eq!(*api.listing_calls.lock().unwrap(), 6);
        assert!(!dir.path().join("line.mp3").exists());
    }

    #[tokio::test]
    async fn download_retries_until_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let api = Arc::new(
            FakeApi::default()
                .listing(None)
                .listing(Some("a.wav"))
                .then_download(Err(ApiError::Transport("reset".into())))
                .then_download(Err(ApiError::Status {
                    status: 503,
                    body: String::new(),
                }))
                .then_download(Ok(vec![9u8; 1100])),
        );
        let poll = PollConfig {
            download_retries: 3,
            ..Default::default()
        };
        let b = backend(api, poll);
        assert!(b.synthesize(&request(dir.path(), "Hi")).await.is_ok());
    }

    #[tokio::test]
    async fn bounded_download_gives_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let api = Arc::new(
            FakeApi::default()
                .listing(None)
                .listing(Some("a.wav"))
                .then_download(Err(ApiError::Transport("reset".into())))
                .then_download(Err(ApiError::Transport("reset again".into()))),
        );
        let poll = PollConfig {
            download_retries: 2,
            ..Default::default()
        };
        let b = backend(api, poll);

        let err = b.synthesize(&request(dir.path(), "Hi")).await.unwrap_err();
        match err {
            SynthError::DownloadFailed { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("reset again"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!dir.path().join("line.mp3").exists());
    }

    #[tokio::test]
    async fn body_carries_defaults_and_auto_chunk() {
        let dir = tempfile::TempDir::new().unwrap();
        let b = backend(Arc::new(FakeApi::default()), PollConfig::default());

        let body = b.build_body(&request(dir.path(), &"a".repeat(1300)));
        assert_eq!(body.chunk_size, 240);
        assert_eq!(body.voice_mode, "predefined");
        assert_eq!(body.predefined_voice_id, "DJ_Caralong.mp3");
        assert_eq!(body.temperature, Some(0.6));
        assert_eq!(body.seed, Some(2024));
        assert!(body.split_text);

        let mut req = request(dir.path(), "short");
        req.params.chunk_size = Some(50);
        req.params.temperature = Some(0.9);
        let body = b.build_body(&req);
        assert_eq!(body.chunk_size, 50);
        assert_eq!(body.temperature, Some(0.9));
        assert_eq!(body.exaggeration, Some(0.9));
    }

    #[test]
    fn chunk_thresholds() {
        assert_eq!(auto_chunk_size(&"x".repeat(1200)), 120);
        assert_eq!(auto_chunk_size(&"x".repeat(1201)), 240);
        assert_eq!(auto_chunk_size(&"x".repeat(2401)), 360);
    }

    #[test]
    fn prefix_is_voice_stem() {
        assert_eq!(voice_prefix("DJ_Caralong.mp3").as_deref(), Some("DJ_Caralong"));
        assert_eq!(voice_prefix("alloy").as_deref(), Some("alloy"));
        assert_eq!(voice_prefix(""), None);
    }

    #[tokio::test]
    async fn lists_voices() {
        let b = backend(Arc::new(FakeApi::default()), PollConfig::default());
        let voices = b.list_predefined_voices().await.unwrap();
        assert_eq!(voices[0].filename, "DJ_Caralong.mp3");
    }
}
