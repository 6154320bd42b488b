use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{RemoteConfig, RemoteFlavor};
use crate::dispatch::{ChatBackend, ChatMessage, SamplingParams};
use crate::error::AsistenteError;

const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Chat adapter for a local LLM HTTP server (Ollama or a flat-body server).
pub struct RemoteChatBackend {
    client: Client,
    url: String,
    model: String,
    flavor: RemoteFlavor,
    timeout: Duration,
}

#[derive(Serialize)]
struct OptionsBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    num_predict: u32,
}

#[derive(Serialize)]
struct FlatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_tokens: u32,
}

/// Either `{message:{content}}` or `{choices:[{message:{content}}]}`.
#[derive(Deserialize)]
struct ChatResponse {
    message: Option<Message>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

impl RemoteChatBackend {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        flavor: RemoteFlavor,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build tuned HTTP client, using defaults: {e}");
                Client::new()
            });

        Self {
            client,
            url: url.into(),
            model: model.into(),
            flavor,
            timeout,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(
            config.url.clone(),
            config.model.clone(),
            config.flavor,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn body(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> serde_json::Result<serde_json::Value> {
        match self.flavor {
            RemoteFlavor::Ollama => serde_json::to_value(OptionsBody {
                model: &self.model,
                messages,
                stream: false,
                options: Options {
                    temperature: sampling.temperature,
                    top_k: sampling.top_k,
                    top_p: sampling.top_p,
                    num_predict: sampling.max_tokens,
                },
            }),
            RemoteFlavor::Flat => serde_json::to_value(FlatBody {
                model: &self.model,
                messages,
                stream: false,
                temperature: sampling.temperature,
                top_k: sampling.top_k,
                top_p: sampling.top_p,
                max_tokens: sampling.max_tokens,
            }),
        }
    }
}

#[async_trait]
impl ChatBackend for RemoteChatBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, AsistenteError> {
        let body = self
            .body(messages, sampling)
            .map_err(|e| AsistenteError::Other(format!("failed to encode request: {e}")))?;

        tracing::debug!(
            url = %self.url,
            model = %self.model,
            messages = messages.len(),
            "remote chat request"
        );

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AsistenteError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    AsistenteError::Request(e)
                }
            })?;

        let status = response.status();

        // Cap error body reads to MAX_RESPONSE_BYTES to prevent memory exhaustion
        if !status.is_success() {
            let error_bytes = response.bytes().await.unwrap_or_default();
            let truncated = &error_bytes[..error_bytes.len().min(MAX_RESPONSE_BYTES)];
            return Err(AsistenteError::Upstream {
                status: status.as_u16(),
                body: String::from_utf8_lossy(truncated).into_owned(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                AsistenteError::Timeout(self.timeout.as_millis() as u64)
            } else {
                AsistenteError::Request(e)
            }
        })?;

        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(AsistenteError::SchemaParse(format!(
                "response too large: {} bytes (max {})",
                bytes.len(),
                MAX_RESPONSE_BYTES
            )));
        }

        parse_reply(&bytes)
    }
}

/// Extract the reply text from either supported response shape.
pub fn parse_reply(bytes: &[u8]) -> Result<String, AsistenteError> {
    let parsed: ChatResponse = serde_json::from_slice(bytes)
        .map_err(|e| AsistenteError::SchemaParse(format!("failed to parse response: {e}")))?;

    parsed
        .message
        .and_then(|m| m.content)
        .or_else(|| {
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
        })
        .ok_or_else(|| AsistenteError::SchemaParse("missing message.content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ollama_shape() {
        let body = br#"{"model":"llama3.2","message":{"role":"assistant","content":"hola"},"done":true}"#;
        let text = parse_reply(body).unwrap();
        assert_eq!(text, "hola");
    }

    #[test]
    fn parses_choices_shape() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        let text = parse_reply(body).unwrap();
        assert_eq!(text, "hi");
    }

    #[test]
    fn rejects_missing_content() {
        let err = parse_reply(br#"{"done":true}"#).unwrap_err();
        assert!(matches!(err, AsistenteError::SchemaParse(_)));
    }

    #[test]
    fn ollama_body_wraps_options() {
        let backend =
            RemoteChatBackend::new("http://x", "m", RemoteFlavor::Ollama, Duration::from_secs(1));
        let body = backend
            .body(&[ChatMessage::user("q")], &SamplingParams::default())
            .unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 50);
        assert_eq!(body["options"]["top_k"], 20);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn flat_body_keeps_params_top_level() {
        let backend =
            RemoteChatBackend::new("http://x", "m", RemoteFlavor::Flat, Duration::from_secs(1));
        let body = backend
            .body(&[ChatMessage::user("q")], &SamplingParams::default())
            .unwrap();
        assert_eq!(body["max_tokens"], 50);
        assert_eq!(body["temperature"], 0.5);
        assert!(body.get("options").is_none());
    }
}
