use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::context::ContextStore;
use crate::dispatch::{self, ChatBackend, ChatMessage, SamplingParams};
use crate::error::AsistenteError;
use crate::speech::{GoogleTts, SpeechSynthesizer};

/// Reply to a blank prompt (document/API-load-only submissions).
pub const UPLOAD_ACK: &str = "Documento subido correctamente. ¿Qué desea preguntar?";

/// Prefix marking an assistant turn that carries error text.
pub const ERROR_MARKER: &str = "Error: ";

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub sampling: SamplingParams,
    pub tts_enabled: bool,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            sampling: SamplingParams::default(),
            tts_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResult {
    pub turns: Vec<ChatMessage>,
    pub audio_path: Option<PathBuf>,
    /// True when the assistant turn holds error text instead of a reply.
    pub failed: bool,
}

/// Routes one chat turn to the configured backend.
///
/// The backend is fixed at construction. Failures never escape `chat`: they
/// come back as an assistant turn so the caller has a single rendering path.
pub struct Dispatcher {
    backend: Arc<dyn ChatBackend>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            speech: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        tracing::info!("chat backend: {}", config.backend.as_str());
        Self::new(dispatch::backend_from_config(config))
            .with_speech(Arc::new(GoogleTts::new(&config.tts)))
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// System message (when context is loaded) followed by the user message.
    pub fn build_messages(prompt: &str, context: &ContextStore) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = context.system_context() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        messages
    }

    /// Typed variant of [`Dispatcher::chat`] for callers that need the failure kind.
    pub async fn try_chat(
        &self,
        request: &ChatRequest,
        context: &ContextStore,
    ) -> Result<String, AsistenteError> {
        request.sampling.validate()?;
        let messages = Self::build_messages(&request.prompt, context);
        self.backend.generate(&messages, &request.sampling).await
    }

    pub async fn chat(&self, request: &ChatRequest, context: &ContextStore) -> ChatResult {
        if request.prompt.trim().is_empty() {
            return ChatResult {
                turns: vec![ChatMessage::assistant(UPLOAD_ACK)],
                audio_path: None,
                failed: false,
            };
        }

        let user = ChatMessage::user(request.prompt.clone());
        match self.try_chat(request, context).await {
            Ok(reply) => {
                let audio_path = if request.tts_enabled {
                    self.speak(&reply).await
                } else {
                    None
                };
                ChatResult {
                    turns: vec![user, ChatMessage::assistant(reply)],
                    audio_path,
                    failed: false,
                }
            }
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), "chat turn failed: {e}");
                ChatResult {
                    turns: vec![
                        user,
                        ChatMessage::assistant(format!("{ERROR_MARKER}{}", e.user_message())),
                    ],
                    audio_path: None,
                    failed: true,
                }
            }
        }
    }

    /// Load backend resources ahead of the first turn (the local model, if any).
    pub async fn initialize(&self) -> Result<(), AsistenteError> {
        self.backend.initialize().await
    }

    /// Free backend resources (the loaded local model, if any).
    pub async fn release(&self) {
        self.backend.release().await;
    }

    async fn speak(&self, reply: &str) -> Option<PathBuf> {
        let speech = self.speech.as_ref()?;
        match speech.synthesize(reply).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("tts failed, delivering text only: {e}");
                None
            }
        }
    }
}
