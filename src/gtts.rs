//! Google Translate speech, the fallback voice when the server is unusable.
//!
//! The endpoint accepts at most 100 characters per request, so text is chunked
//! at sentence boundaries and the MP3 responses are concatenated.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use tracing::{debug, info};

use crate::error::SynthError;
use crate::tts::FallbackSynthesizer;
use crate::utils::{chunk_text, write_atomic};

const MAX_CHARS: usize = 100;

pub struct GoogleTts {
    client: reqwest::Client,
    lang: String,
    tld: String,
}

impl GoogleTts {
    pub fn new(lang: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            lang: lang.to_string(),
            tld: "com".to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("https://translate.google.{}/translate_tts", self.tld)
    }

    /// Query pairs for chunk `idx` of `total`.
    pub fn query(&self, chunk: &str, idx: usize, total: usize, slow: bool) -> Vec<(String, String)> {
        vec![
            ("ie".into(), "UTF-8".into()),
            ("q".into(), chunk.to_string()),
            ("tl".into(), self.lang.clone()),
            ("client".into(), "tw-ob".into()),
            ("ttsspeed".into(), if slow { "0.3" } else { "1" }.into()),
            ("total".into(), total.to_string()),
            ("idx".into(), idx.to_string()),
            ("textlen".into(), chunk.chars().count().to_string()),
        ]
    }
}

#[async_trait]
impl FallbackSynthesizer for GoogleTts {
    async fn synthesize(
        &self,
        text: &str,
        out_path: &Path,
        slow: bool,
    ) -> Result<PathBuf, SynthError> {
        let chunks = chunk_text(text, MAX_CHARS);
        if chunks.is_empty() {
            return Err(SynthError::EmptyText);
        }
        info!(
            "Google TTS: {} chunk(s) -> {}{}",
            chunks.len(),
            out_path.display(),
            if slow { " (slow)" } else { "" }
        );

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            debug!("Google TTS chunk {}: {}", idx, chunk);
            let resp = self
                .client
                .get(self.endpoint())
                .header(USER_AGENT, "Mozilla/5.0 voicecast/0.1")
                .query(&self.query(chunk, idx, chunks.len(), slow))
                .send()
                .await
                .map_err(|e| SynthError::Transport(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SynthError::Rejected {
                    status: status.as_u16(),
                    body: body.chars().take(200).collect(),
                });
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| SynthError::Transport(e.to_string()))?;
            audio.extend_from_slice(&bytes);
        }

        write_atomic(out_path, &audio).await?;
        Ok(out_path.to_path_buf())
    }
}
