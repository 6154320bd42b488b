use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::chat::Dispatcher;
use crate::config::Config;
use crate::context::ContextStore;
use crate::data::{self, DataFetcher};
use crate::dispatch::{ChatMessage, SamplingParams};
use crate::response::{ToolMetadata, ToolResponse};
use crate::tools::chat::ChatToolRequest;
use crate::tools::data::{LoadApiRequest, LoadDocumentRequest};

#[derive(Clone)]
pub struct AsistenteServer {
    dispatcher: Arc<Dispatcher>,
    context: Arc<ContextStore>,
    fetcher: Arc<DataFetcher>,
    sampling_defaults: SamplingParams,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AsistenteServer {
    pub fn new(config: Config) -> Self {
        let dispatcher = Arc::new(Dispatcher::from_config(&config));
        Self::with_dispatcher(dispatcher, config.sampling)
    }

    pub fn with_dispatcher(dispatcher: Arc<Dispatcher>, sampling_defaults: SamplingParams) -> Self {
        Self {
            dispatcher,
            context: Arc::new(ContextStore::new()),
            fetcher: Arc::new(DataFetcher::new()),
            sampling_defaults,
            tool_router: Self::tool_router(),
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn context(&self) -> Arc<ContextStore> {
        self.context.clone()
    }

    fn metadata(&self, tool_name: &str, start: Instant) -> ToolMetadata {
        ToolMetadata {
            tool_name: tool_name.to_string(),
            backend: self.dispatcher.backend_name().to_string(),
            duration_seconds: start.elapsed().as_secs_f64(),
        }
    }

    #[tool(
        name = "chat",
        description = "Ask the energy-market assistant a question. Loaded document and API data are used as context. Errors come back as an assistant turn with status \"error\"."
    )]
    async fn chat(
        &self,
        Parameters(req): Parameters<ChatToolRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let request = req.into_chat_request(&self.sampling_defaults);
        let result = self.dispatcher.chat(&request, &self.context).await;
        let response = ToolResponse::from_chat(result, self.metadata("chat", start));
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "load_document",
        description = "Load a .docx or plain-text document as chat context. Replaces any previously loaded document."
    )]
    async fn load_document(
        &self,
        Parameters(req): Parameters<LoadDocumentRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.path.trim().is_empty() {
            return Err(McpError::invalid_params("path must not be empty", None));
        }
        let start = Instant::now();
        let turns = data::load_document(&PathBuf::from(req.path), &self.context).await;
        let ok = turns_ok(&turns, data::DOCUMENT_ACK);
        let response = ToolResponse::from_turns(turns, ok, self.metadata("load_document", start));
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "load_api",
        description = "Fetch a tabular dataset (records with Fecha, CodigoVariable, Valor) as chat context. Replaces any previously loaded dataset."
    )]
    async fn load_api(
        &self,
        Parameters(req): Parameters<LoadApiRequest>,
    ) -> Result<CallToolResult, McpError> {
        let url = req.url.trim();
        if url.is_empty() {
            return Err(McpError::invalid_params("url must not be empty", None));
        }
        let start = Instant::now();
        let turns = self.fetcher.fetch(url, &self.context).await;
        let ok = turns_ok(&turns, data::API_ACK);
        let response = ToolResponse::from_turns(turns, ok, self.metadata("load_api", start));
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "context",
        description = "Show how much document and API context is currently loaded.",
        annotations(read_only_hint = true)
    )]
    async fn context_info(&self) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let document = self.context.document_context();
        let api = self.context.api_context();
        let summary = format!(
            "document: {} chars\napi: {} chars",
            document.chars().count(),
            api.chars().count()
        );
        let response = ToolResponse::from_turns(
            vec![ChatMessage::assistant(summary)],
            true,
            self.metadata("context", start),
        );
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "release_model",
        description = "Free the locally loaded model and its memory. It is reloaded on the next chat. No-op for the remote backend."
    )]
    async fn release_model(&self) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        self.dispatcher.release().await;
        let response = ToolResponse::from_turns(
            vec![ChatMessage::assistant("Recursos del modelo liberados.")],
            true,
            self.metadata("release_model", start),
        );
        Ok(response.into_call_tool_result())
    }
}

fn turns_ok(turns: &[ChatMessage], ack: &str) -> bool {
    turns.first().is_some_and(|t| t.content == ack)
}

#[tool_handler]
impl ServerHandler for AsistenteServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "asistente".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Asistente: wholesale energy market chat assistant.\n\n\
                 Workflow:\n\
                 1. Optionally call `load_document` with a .docx or text file and/or `load_api` with a dataset URL.\n\
                 2. Call `chat` with a prompt. Context from step 1 is included automatically.\n\
                    - Set `tts: true` to also receive an `audio_path` with the spoken reply.\n\
                 3. Call `release_model` to free the local model when done."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
