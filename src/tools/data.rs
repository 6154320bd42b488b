use schemars::JsonSchema;
use serde::Deserialize;

/// Load a `.docx` or plain-text document as the active document context.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoadDocumentRequest {
    /// Path to a UTF-8 text file. Replaces any previously loaded document.
    pub path: String,
}

/// Fetch a tabular dataset as the active API context.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoadApiRequest {
    /// Dataset URL returning `{result: {records, name, metadata}}`. Replaces any previous dataset.
    pub url: String,
}
