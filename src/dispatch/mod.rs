pub mod local;
pub mod remote;

#[cfg(feature = "candle")]
pub mod candle;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BackendKind, Config};
use crate::error::AsistenteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One conversation turn, as sent to a backend and as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Upper bounds accepted by [`SamplingParams::validate`].
pub const MAX_TOP_K: u32 = 50;
pub const MAX_TEMPERATURE: f64 = 2.0;
pub const MAX_TOKENS_CEILING: u32 = 200;

/// Generation controls passed uniformly to either backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub top_k: u32,
    pub top_p: f64,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            top_k: 20,
            top_p: 0.7,
            temperature: 0.5,
            max_tokens: 50,
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<(), AsistenteError> {
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(AsistenteError::InvalidParams(format!(
                "top_k must be between 1 and {MAX_TOP_K}, got {}",
                self.top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(AsistenteError::InvalidParams(format!(
                "top_p must be between 0.0 and 1.0, got {}",
                self.top_p
            )));
        }
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(AsistenteError::InvalidParams(format!(
                "temperature must be between 0.0 and {MAX_TEMPERATURE}, got {}",
                self.temperature
            )));
        }
        if !(1..=MAX_TOKENS_CEILING).contains(&self.max_tokens) {
            return Err(AsistenteError::InvalidParams(format!(
                "max_tokens must be between 1 and {MAX_TOKENS_CEILING}, got {}",
                self.max_tokens
            )));
        }
        Ok(())
    }
}

/// A generation technology that turns a message list into one reply.
/// Failures are returned as errors; rendering them is the dispatcher's job.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, AsistenteError>;

    /// Prepare the backend ahead of the first call. Default: nothing to prepare.
    async fn initialize(&self) -> Result<(), AsistenteError> {
        Ok(())
    }

    /// Free any resources held by the backend. Default: nothing to free.
    async fn release(&self) {}
}

/// Build the backend selected by `config.backend`.
pub fn backend_from_config(config: &Config) -> Arc<dyn ChatBackend> {
    match config.backend {
        BackendKind::Remote => Arc::new(remote::RemoteChatBackend::from_config(&config.remote)),
        BackendKind::Local => Arc::new(local::LocalBackend::new(local::default_loader(
            &config.local,
        ))),
    }
}
