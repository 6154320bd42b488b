use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::TtsConfig;
use crate::error::AsistenteError;

/// Google's translate TTS endpoint rejects longer queries.
const MAX_CHUNK_CHARS: usize = 100;

const MARKDOWN_MARKERS: [char; 4] = ['*', '_', '`', '~'];

/// Turns reply text into a playable audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<PathBuf, AsistenteError>;
}

/// Remove emphasis markers so they aren't read aloud.
pub fn strip_markdown(text: &str) -> String {
    text.chars().filter(|c| !MARKDOWN_MARKERS.contains(c)).collect()
}

/// Split text on whitespace into chunks of at most `max` characters.
/// A single word longer than `max` is hard-split.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max);
            chunks.push(word.into_iter().collect());
            word = rest;
        }
        if word.is_empty() {
            continue;
        }
        let extra = if current.is_empty() { word.len() } else { word.len() + 1 };
        if current_len + extra > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Google Translate TTS. Writes MP3 to a fixed path, overwritten on each call.
pub struct GoogleTts {
    client: Client,
    base_url: String,
    lang: String,
    output_path: PathBuf,
}

impl GoogleTts {
    pub fn new(config: &TtsConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build tuned TTS client, using defaults: {e}");
                Client::new()
            });

        Self {
            client,
            base_url: config.base_url.clone(),
            lang: config.lang.clone(),
            output_path: config.output_path.clone(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        idx: usize,
        total: usize,
    ) -> Result<Vec<u8>, AsistenteError> {
        let idx = idx.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.lang.as_str()),
                ("q", chunk),
                ("idx", idx.as_str()),
                ("total", total.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AsistenteError::Synthesis(format!("TTS service returned {status}")));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str) -> Result<PathBuf, AsistenteError> {
        let clean = strip_markdown(text);
        let chunks = chunk_text(&clean, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(AsistenteError::Synthesis("nothing to speak".to_string()));
        }

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            audio.extend(self.fetch_chunk(chunk, idx, chunks.len()).await?);
        }

        tokio::fs::write(&self.output_path, &audio).await.map_err(|e| {
            AsistenteError::Synthesis(format!("cannot write {}: {e}", self.output_path.display()))
        })?;
        tracing::debug!(
            bytes = audio.len(),
            path = %self.output_path.display(),
            "tts audio written"
        );
        Ok(self.output_path.clone())
    }
}
