use parking_lot::RwLock;

/// Separator between document text and API text in the system message.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Holds at most one loaded document's text and one fetched dataset's text.
///
/// Each setter replaces the previous value wholesale. There is no merge and no
/// history. Concurrent writers race and the last one wins.
#[derive(Debug, Default)]
pub struct ContextStore {
    document_text: RwLock<String>,
    api_text: RwLock<String>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_document_context(&self, text: impl Into<String>) {
        *self.document_text.write() = text.into();
    }

    pub fn set_api_context(&self, text: impl Into<String>) {
        *self.api_text.write() = text.into();
    }

    pub fn document_context(&self) -> String {
        self.document_text.read().clone()
    }

    pub fn api_context(&self) -> String {
        self.api_text.read().clone()
    }

    /// Combined system context, or None when neither source is loaded.
    pub fn system_context(&self) -> Option<String> {
        let document = self.document_text.read();
        let api = self.api_text.read();
        match (document.is_empty(), api.is_empty()) {
            (true, true) => None,
            (false, true) => Some(document.clone()),
            (true, false) => Some(api.clone()),
            (false, false) => Some(format!("{document}{CONTEXT_SEPARATOR}{api}")),
        }
    }
}
