use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dispatch::SamplingParams;
use crate::error::AsistenteError;

/// Config file read when `ASISTENTE_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "asistente.toml";

pub const DEFAULT_REMOTE_URL: &str = "http://localhost:11434/api/chat";
pub const DEFAULT_REMOTE_MODEL: &str = "llama3.2";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which backend the dispatcher uses for the lifetime of the process.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Remote,
    Local,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "remote" | "http" | "ollama" => Some(Self::Remote),
            "local" | "inprocess" | "in-process" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Request body layout expected by the remote chat server.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteFlavor {
    /// Sampling parameters wrapped in an `options` object, `num_predict` for max tokens.
    #[default]
    Ollama,
    /// Sampling parameters at the top level, `max_tokens` for max tokens.
    Flat,
}

impl RemoteFlavor {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "flat" | "openai" => Some(Self::Flat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub model: String,
    pub flavor: RemoteFlavor,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REMOTE_URL.to_string(),
            model: DEFAULT_REMOTE_MODEL.to_string(),
            flavor: RemoteFlavor::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Hugging Face repo holding the GGUF weights.
    pub model_repo: String,
    pub model_file: String,
    /// Repo holding `tokenizer.json` (GGUF repos usually don't ship one).
    pub tokenizer_repo: String,
    pub hf_token: Option<String>,
    pub seed: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            model_repo: "bartowski/Llama-3.2-3B-Instruct-GGUF".to_string(),
            model_file: "Llama-3.2-3B-Instruct-Q4_K_M.gguf".to_string(),
            tokenizer_repo: "meta-llama/Llama-3.2-3B-Instruct".to_string(),
            hf_token: None,
            seed: 299_792_458,
        }
    }
}

impl std::fmt::Debug for LocalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConfig")
            .field("model_repo", &self.model_repo)
            .field("model_file", &self.model_file)
            .field("tokenizer_repo", &self.tokenizer_repo)
            .field("hf_token", &self.hf_token.as_ref().map(|_| "[REDACTED]"))
            .field("seed", &self.seed)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub output_path: PathBuf,
    pub lang: String,
    pub base_url: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("response.mp3"),
            lang: "es".to_string(),
            base_url: "https://translate.google.com/translate_tts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    pub sampling: SamplingParams,
    pub tts: TtsConfig,
}

impl Config {
    /// Defaults, then the TOML file (if any), then environment overrides.
    pub fn load() -> Result<Self, AsistenteError> {
        let path = env::var("ASISTENTE_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            });

        let mut config = match path {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.sampling.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AsistenteError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AsistenteError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        tracing::info!("config: loaded {}", path.display());
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AsistenteError> {
        toml::from_str(raw).map_err(|e| AsistenteError::Config(e.to_string()))
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("ASISTENTE_BACKEND") {
            match BackendKind::parse(&v) {
                Some(kind) => self.backend = kind,
                None => tracing::warn!(
                    "ASISTENTE_BACKEND={v} not recognized, keeping {}",
                    self.backend.as_str()
                ),
            }
        }
        if let Ok(v) = env::var("ASISTENTE_REMOTE_URL") {
            self.remote.url = v;
        }
        if let Ok(v) = env::var("ASISTENTE_REMOTE_MODEL") {
            self.remote.model = v;
        }
        if let Ok(v) = env::var("ASISTENTE_REMOTE_FLAVOR") {
            match RemoteFlavor::parse(&v) {
                Some(flavor) => self.remote.flavor = flavor,
                None => tracing::warn!("ASISTENTE_REMOTE_FLAVOR={v} not recognized"),
            }
        }
        if let Ok(v) = env::var("ASISTENTE_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => self.remote.timeout_secs = secs,
                _ => tracing::warn!("ASISTENTE_TIMEOUT_SECS={v} is not a positive integer"),
            }
        }
        if let Ok(v) = env::var("ASISTENTE_TTS_OUTPUT") {
            self.tts.output_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("ASISTENTE_TTS_LANG") {
            self.tts.lang = v;
        }
        if let Ok(v) = env::var("ASISTENTE_LOCAL_REPO") {
            self.local.model_repo = v;
        }
        if let Ok(v) = env::var("ASISTENTE_LOCAL_FILE") {
            self.local.model_file = v;
        }
        if let Ok(v) = env::var("ASISTENTE_TOKENIZER_REPO") {
            self.local.tokenizer_repo = v;
        }
        if let Ok(v) = env::var("HF_TOKEN")
            && !v.trim().is_empty()
        {
            self.local.hf_token = Some(v);
        }
    }
}
