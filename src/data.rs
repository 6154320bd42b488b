use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Client;
use serde::Deserialize;

use crate::context::ContextStore;
use crate::dispatch::ChatMessage;
use crate::error::AsistenteError;

pub const DOCUMENT_ACK: &str = "📄 Documento cargado exitosamente. ¿Qué desea preguntar?";
pub const API_ACK: &str = "📄 API cargada exitosamente. ¿Qué desea preguntar?";
pub const NO_RECORDS: &str = "❌ Error: No se encontraron registros en la API.";

/// Leading bytes of a zip archive, which is what a `.docx` file is.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

const DOCX_BODY: &str = "word/document.xml";

/// Read a `.docx` or plain-text document and make it the active document context.
pub async fn load_document(path: &Path, context: &ContextStore) -> Vec<ChatMessage> {
    match read_document(path).await {
        Ok(text) => {
            tracing::info!(path = %path.display(), bytes = text.len(), "document loaded");
            context.set_document_context(text);
            vec![ChatMessage::assistant(DOCUMENT_ACK)]
        }
        Err(e) => {
            tracing::warn!("document load failed: {e}");
            vec![ChatMessage::assistant(format!("❌ Error: {}", e.user_message()))]
        }
    }
}

pub async fn read_document(path: &Path) -> Result<String, AsistenteError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| AsistenteError::Document(format!("{}: {e}", path.display())))?;
    let text = if raw.starts_with(ZIP_MAGIC) {
        docx_text(&raw).map_err(|e| match e {
            AsistenteError::Document(msg) => {
                AsistenteError::Document(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?
    } else {
        String::from_utf8(raw).map_err(|_| {
            AsistenteError::Document(format!("{} is not a UTF-8 text document", path.display()))
        })?
    };
    Ok(text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string())
}

/// Paragraph text of a `.docx` body, one paragraph per line.
pub fn docx_text(bytes: &[u8]) -> Result<String, AsistenteError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(doc_err)?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| AsistenteError::Document(format!("{DOCX_BODY}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| AsistenteError::Document(format!("{DOCX_BODY}: {e}")))?;

    let mut reader = Reader::from_str(&xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event().map_err(doc_err)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&t.unescape().map_err(doc_err)?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs.join("\n"))
}

fn doc_err(e: impl std::fmt::Display) -> AsistenteError {
    AsistenteError::Document(e.to_string())
}

#[derive(Debug, Deserialize)]
struct ApiPayload {
    result: Option<ApiResult>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    records: Option<Vec<Record>>,
    name: Option<String>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    #[serde(rename = "Fecha")]
    pub date: String,
    #[serde(rename = "CodigoVariable")]
    pub code: String,
    #[serde(rename = "Valor", default)]
    pub value: serde_json::Value,
}

/// A fetched dataset: its name, description and long-format records.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub description: String,
    pub records: Vec<Record>,
}

/// Fetches tabular datasets and turns them into API context text.
pub struct DataFetcher {
    client: Client,
}

impl Default for DataFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build tuned data client, using defaults: {e}");
                Client::new()
            });
        Self { client }
    }

    /// Fetch `url` and, on success, replace the API context with the rendered dataset.
    /// The context is left untouched on failure.
    pub async fn fetch(&self, url: &str, context: &ContextStore) -> Vec<ChatMessage> {
        match self.fetch_dataset(url).await {
            Ok(dataset) => {
                let text = format_api_text(&dataset, url);
                tracing::info!(url, records = dataset.records.len(), "api dataset loaded");
                context.set_api_context(text);
                vec![ChatMessage::assistant(API_ACK)]
            }
            Err(e) => {
                tracing::warn!(url, "api fetch failed: {e}");
                vec![ChatMessage::assistant(e.user_message())]
            }
        }
    }

    pub async fn fetch_dataset(&self, url: &str) -> Result<Dataset, AsistenteError> {
        let response = self.client.get(url).send().await.map_err(connect_err)?;
        let status = response.status();
        tracing::debug!(url, status = status.as_u16(), "api response");
        if status != reqwest::StatusCode::OK {
            return Err(AsistenteError::DataFetch(format!(
                "❌ Error en la API: {}",
                status.as_u16()
            )));
        }

        let payload: ApiPayload = response.json().await.map_err(connect_err)?;
        let result = payload
            .result
            .ok_or_else(|| AsistenteError::DataFetch(NO_RECORDS.to_string()))?;
        let records = result
            .records
            .filter(|r| !r.is_empty())
            .ok_or_else(|| AsistenteError::DataFetch(NO_RECORDS.to_string()))?;

        Ok(Dataset {
            name: result.name.unwrap_or_else(|| "Sin nombre".to_string()),
            description: result
                .metadata
                .and_then(|m| m.description)
                .unwrap_or_else(|| "Sin descripción".to_string()),
            records,
        })
    }
}

fn connect_err(e: reqwest::Error) -> AsistenteError {
    AsistenteError::DataFetch(format!("❌ Error al conectar con la API: {e}"))
}

pub fn format_api_text(dataset: &Dataset, url: &str) -> String {
    format!(
        "🔹 **{}**\n📄 {}\n\n🌐 **Información cargada desde la API:** {url}\n\n📊 **Conjuntos de dato del API:**\n```\n{}\n```",
        dataset.name,
        dataset.description,
        pivot_table(&dataset.records)
    )
}

/// Sort key for a date: parsed dates order chronologically, unparseable ones after.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum DateKey {
    Parsed(NaiveDate),
    Raw(String),
}

impl DateKey {
    fn parse(raw: &str) -> Self {
        raw.get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(Self::Parsed)
            .unwrap_or_else(|| Self::Raw(raw.to_string()))
    }

    fn label(&self) -> String {
        match self {
            Self::Parsed(d) => d.format("%d-%m-%Y").to_string(),
            Self::Raw(s) => s.clone(),
        }
    }
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NaN".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pivot long records into a wide table: one row per date, one column per
/// variable code. Rendered right-aligned with two-space gaps. A repeated
/// (date, code) pair keeps the last value; missing cells print `NaN`.
pub fn pivot_table(records: &[Record]) -> String {
    let codes: BTreeSet<&str> = records.iter().map(|r| r.code.as_str()).collect();
    let mut rows: BTreeMap<DateKey, BTreeMap<&str, String>> = BTreeMap::new();
    for r in records {
        rows.entry(DateKey::parse(&r.date))
            .or_default()
            .insert(r.code.as_str(), cell(&r.value));
    }

    let mut table: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
    let mut header = vec!["Fecha".to_string()];
    header.extend(codes.iter().map(|c| c.to_string()));
    table.push(header);
    for (date, values) in &rows {
        let mut line = vec![date.label()];
        line.extend(
            codes
                .iter()
                .map(|c| values.get(c).cloned().unwrap_or_else(|| "NaN".to_string())),
        );
        table.push(line);
    }

    let columns = table[0].len();
    let widths: Vec<usize> = (0..columns)
        .map(|i| table.iter().map(|row| row[i].chars().count()).max().unwrap_or(0))
        .collect();

    table
        .iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .map(|(value, &width)| format!("{value:>width$}"))
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
