use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::chat::ChatResult;
use crate::dispatch::ChatMessage;

/// JSON payload returned by every tool.
/// Failures are reported in `status`, never as a transport-level tool error.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub status: &'static str,
    pub turns: Vec<ChatMessage>,
    pub audio_path: Option<String>,
    pub metadata: ToolMetadata,
}

#[derive(Debug, Serialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    pub backend: String,
    #[serde(serialize_with = "serialize_finite_f64")]
    pub duration_seconds: f64,
}

/// Serialize f64, clamping non-finite values (NaN, Inf) to 0.0.
fn serialize_finite_f64<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(if v.is_finite() { *v } else { 0.0 })
}

impl ToolResponse {
    pub fn from_chat(result: ChatResult, metadata: ToolMetadata) -> Self {
        Self {
            status: if result.failed { "error" } else { "success" },
            turns: result.turns,
            audio_path: result.audio_path.map(|p| p.display().to_string()),
            metadata,
        }
    }

    pub fn from_turns(turns: Vec<ChatMessage>, ok: bool, metadata: ToolMetadata) -> Self {
        Self {
            status: if ok { "success" } else { "error" },
            turns,
            audio_path: None,
            metadata,
        }
    }

    pub fn into_call_tool_result(self) -> CallToolResult {
        match serde_json::to_string(&self) {
            Ok(json) => CallToolResult::success(vec![Content::text(json)]),
            Err(e) => {
                let escaped = e.to_string().replace('\\', "\\\\").replace('"', "\\\"");
                CallToolResult::success(vec![Content::text(format!(
                    r#"{{"status":"error","turns":[{{"role":"assistant","content":"Error: serialization failed: {escaped}"}}],"audio_path":null,"metadata":{{}}}}"#
                ))])
            }
        }
    }
}
