use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::LocalConfig;
use crate::dispatch::{ChatBackend, ChatMessage, SamplingParams};
use crate::error::AsistenteError;

/// A loaded model + tokenizer, ready to generate. Runs on the blocking pool.
pub trait TextGenerator: Send {
    /// Returns the text of the newest generated assistant message.
    fn generate(
        &mut self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, AsistenteError>;
}

/// Loads a [`TextGenerator`]. Expected to be slow (seconds to minutes).
pub trait ModelLoader: Send + Sync {
    fn describe(&self) -> String;

    fn load(&self) -> Result<Box<dyn TextGenerator>, AsistenteError>;
}

type Handle = Arc<parking_lot::Mutex<Box<dyn TextGenerator>>>;

/// In-process inference backend with an explicit load/release lifecycle.
///
/// The slot is either fully loaded or empty: a failed load never stores
/// anything. Load and release are serialized by the slot mutex, so two
/// concurrent `initialize` calls load the model once.
pub struct LocalBackend {
    loader: Arc<dyn ModelLoader>,
    slot: Mutex<Option<Handle>>,
}

impl LocalBackend {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slot: Mutex::new(None),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Load the model if it isn't loaded yet. No-op when already loaded.
    pub async fn initialize(&self) -> Result<(), AsistenteError> {
        self.handle().await.map(|_| ())
    }

    /// Drop the model, tokenizer, and pipeline. Safe to call when nothing is loaded.
    pub async fn release(&self) {
        let mut slot = self.slot.lock().await;
        match slot.take() {
            Some(handle) => {
                let in_flight = Arc::strong_count(&handle) - 1;
                drop(handle);
                if in_flight > 0 {
                    tracing::info!(
                        "local model released; memory reclaimed after {in_flight} in-flight generation(s) finish"
                    );
                } else {
                    tracing::info!("local model released; model and accelerator memory reclaimed");
                }
            }
            None => tracing::debug!("local model release requested but nothing is loaded"),
        }
    }

    async fn handle(&self) -> Result<Handle, AsistenteError> {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        tracing::info!("loading local model: {}", self.loader.describe());
        let loader = self.loader.clone();
        let generator = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| AsistenteError::ModelLoad(format!("load task failed: {e}")))?
            .inspect_err(|e| tracing::error!("local model load failed: {e}"))?;

        let handle: Handle = Arc::new(parking_lot::Mutex::new(generator));
        *slot = Some(handle.clone());
        tracing::info!("local model loaded");
        Ok(handle)
    }
}

#[async_trait]
impl ChatBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, AsistenteError> {
        let handle = self.handle().await?;
        let messages = messages.to_vec();
        let sampling = *sampling;

        tokio::task::spawn_blocking(move || handle.lock().generate(&messages, &sampling))
            .await
            .map_err(|e| AsistenteError::Generation(format!("generation task failed: {e}")))?
    }

    async fn initialize(&self) -> Result<(), AsistenteError> {
        LocalBackend::initialize(self).await
    }

    async fn release(&self) {
        LocalBackend::release(self).await;
    }
}

/// Loader used when the crate is built without an inference engine.
pub struct UnavailableLoader;

impl ModelLoader for UnavailableLoader {
    fn describe(&self) -> String {
        "unavailable".to_string()
    }

    fn load(&self) -> Result<Box<dyn TextGenerator>, AsistenteError> {
        Err(AsistenteError::ModelLoad(
            "local inference not compiled in (rebuild with --features candle)".to_string(),
        ))
    }
}

#[cfg(feature = "candle")]
pub fn default_loader(config: &LocalConfig) -> Arc<dyn ModelLoader> {
    Arc::new(crate::dispatch::candle::CandleLoader::new(config.clone()))
}

#[cfg(not(feature = "candle"))]
pub fn default_loader(config: &LocalConfig) -> Arc<dyn ModelLoader> {
    tracing::warn!(
        "local backend selected for {} but built without the candle feature",
        config.model_repo
    );
    Arc::new(UnavailableLoader)
}
