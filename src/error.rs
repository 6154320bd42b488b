use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsistenteError {
    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("document error: {0}")]
    Document(String),

    #[error("data fetch error: {0}")]
    DataFetch(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl AsistenteError {
    /// Returns true for transient errors that may succeed on retry.
    /// Nothing retries today; callers use this to word the error turn.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            // 5xx = server error (retryable), 4xx = client error (not retryable)
            Self::Upstream { status, .. } => *status >= 500,
            Self::Request(_) => true,
            _ => false,
        }
    }

    /// Text shown in the assistant turn when a chat call fails.
    /// The dispatcher prefixes it with `Error: `.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::Upstream { status, body } => format!("{status}, {body}"),
            Self::Request(e) => {
                if e.is_connect() {
                    format!("could not connect to chat server: {e}")
                } else {
                    format!("request to chat server failed: {e}")
                }
            }
            Self::SchemaParse(msg) => format!("failed to parse chat response: {msg}"),
            Self::InvalidParams(msg) => msg.clone(),
            Self::ModelLoad(msg) => format!("model could not be loaded: {msg}"),
            Self::Generation(msg) => format!("error generating response: {msg}"),
            Self::Synthesis(msg) => format!("speech synthesis failed: {msg}"),
            Self::Document(msg) => format!("document could not be loaded: {msg}"),
            Self::DataFetch(msg) => msg.clone(),
            Self::Config(msg) => format!("configuration error: {msg}"),
            Self::Other(msg) => msg.clone(),
        }
    }
}
