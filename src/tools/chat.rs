use schemars::JsonSchema;
use serde::Deserialize;

use crate::chat::ChatRequest;
use crate::dispatch::SamplingParams;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ChatToolRequest {
    /// Question for the assistant. Loaded document and API data are added as context automatically.
    /// An empty prompt just acknowledges a previous upload.
    pub prompt: String,
    /// Top-K sampling (>= 1). Low values give more direct answers.
    pub top_k: Option<u32>,
    /// Top-P nucleus sampling, between 0.0 and 1.0.
    pub top_p: Option<f64>,
    /// Sampling temperature (>= 0). High = more creative, low = more precise.
    pub temperature: Option<f64>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Also synthesize the reply as speech and return the audio file path.
    pub tts: Option<bool>,
}

impl ChatToolRequest {
    /// Fill unset sampling fields from `defaults`.
    pub fn into_chat_request(self, defaults: &SamplingParams) -> ChatRequest {
        ChatRequest {
            prompt: self.prompt,
            sampling: SamplingParams {
                top_k: self.top_k.unwrap_or(defaults.top_k),
                top_p: self.top_p.unwrap_or(defaults.top_p),
                temperature: self.temperature.unwrap_or(defaults.temperature),
                max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            },
            tts_enabled: self.tts.unwrap_or(false),
        }
    }
}
