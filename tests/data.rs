//! Document and dataset loaders feeding the context store.

use std::io::Write;

use asistente::context::ContextStore;
use asistente::data::{self, API_ACK, DOCUMENT_ACK, DataFetcher, NO_RECORDS};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;

async fn mock_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn serve_once(
    listener: TcpListener,
    status: &'static str,
    body: &'static str,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
    })
}

const DATASET: &str = r#"{
    "success": true,
    "result": {
        "name": "Precio de escasez",
        "metadata": {"description": "Precio de escasez diario"},
        "records": [
            {"Fecha": "2025-03-02", "CodigoVariable": "PE", "Valor": 770.55},
            {"Fecha": "2025-03-01", "CodigoVariable": "PE", "Valor": 768.1},
            {"Fecha": "2025-03-01", "CodigoVariable": "PME", "Valor": 812}
        ]
    }
}"#;

#[tokio::test]
async fn document_load_replaces_previous() {
    let context = ContextStore::new();

    let mut first = tempfile::NamedTempFile::new().unwrap();
    writeln!(first, "Primer documento\r\nlinea dos  ").unwrap();
    let turns = data::load_document(first.path(), &context).await;
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].content, DOCUMENT_ACK);
    assert_eq!(context.document_context(), "Primer documento\nlinea dos");

    let mut second = tempfile::NamedTempFile::new().unwrap();
    write!(second, "Segundo").unwrap();
    data::load_document(second.path(), &context).await;
    assert_eq!(context.document_context(), "Segundo");
}

#[tokio::test]
async fn missing_document_keeps_context() {
    let context = ContextStore::new();
    context.set_document_context("anterior");

    let dir = tempfile::tempdir().unwrap();
    let turns = data::load_document(&dir.path().join("nope.txt"), &context).await;
    assert!(turns[0].content.starts_with("❌ Error:"));
    assert_eq!(context.document_context(), "anterior");
}

#[tokio::test]
async fn binary_document_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0xff, 0xfe, 0x00, 0x9f]).unwrap();
    let err = data::read_document(file.path()).await.unwrap_err();
    assert!(err.to_string().contains("UTF-8"));
}

const DOCX_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Reglamento</w:t></w:r><w:r><w:t xml:space="preserve"> de mercado</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>Precio &amp; demanda</w:t></w:r></w:p>
<w:sectPr/></w:body></w:document>"#;

/// Write a zip archive with the given entries to a `.docx` temp file.
fn docx_file(entries: &[(&str, &str)]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, body) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    let bytes = zip.finish().unwrap().into_inner();
    file.write_all(&bytes).unwrap();
    file
}

#[tokio::test]
async fn docx_paragraphs_become_lines() {
    let context = ContextStore::new();
    let file = docx_file(&[
        ("[Content_Types].xml", "<Types/>"),
        ("word/document.xml", DOCX_BODY),
    ]);

    let turns = data::load_document(file.path(), &context).await;
    assert_eq!(turns[0].content, DOCUMENT_ACK);
    assert_eq!(context.document_context(), "Reglamento de mercado\n\nPrecio & demanda");
}

#[tokio::test]
async fn docx_without_body_keeps_context() {
    let context = ContextStore::new();
    context.set_document_context("anterior");
    let file = docx_file(&[("word/styles.xml", "<w:styles/>")]);

    let err = data::read_document(file.path()).await.unwrap_err();
    assert!(err.to_string().contains("word/document.xml"));

    let turns = data::load_document(file.path(), &context).await;
    assert!(turns[0].content.starts_with("❌ Error:"));
    assert_eq!(context.document_context(), "anterior");
}

#[tokio::test]
async fn dataset_fetch_sets_api_context() {
    let (listener, port) = mock_listener().await;
    let server = serve_once(listener, "200 OK", DATASET);
    let url = format!("http://127.0.0.1:{port}/api/PublicData?datasetid=ae3f23");

    let context = ContextStore::new();
    let turns = DataFetcher::new().fetch(&url, &context).await;
    assert_eq!(turns[0].content, API_ACK);

    let text = context.api_context();
    assert!(text.starts_with("🔹 **Precio de escasez**\n📄 Precio de escasez diario\n\n"));
    assert!(text.contains(&format!("🌐 **Información cargada desde la API:** {url}")));
    assert!(text.contains("01-03-2025   768.1  812"));
    assert!(text.contains("02-03-2025  770.55  NaN"));
    assert!(text.ends_with("\n```"));
    server.await.unwrap();
}

#[tokio::test]
async fn dataset_without_name_uses_defaults() {
    let (listener, port) = mock_listener().await;
    let server = serve_once(
        listener,
        "200 OK",
        r#"{"result":{"records":[{"Fecha":"2025-01-01","CodigoVariable":"X","Valor":1}]}}"#,
    );

    let dataset = DataFetcher::new()
        .fetch_dataset(&format!("http://127.0.0.1:{port}/"))
        .await
        .unwrap();
    assert_eq!(dataset.name, "Sin nombre");
    assert_eq!(dataset.description, "Sin descripción");
    assert_eq!(dataset.records.len(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn non_200_reports_status_and_keeps_context() {
    let (listener, port) = mock_listener().await;
    let server = serve_once(listener, "404 Not Found", "{}");

    let context = ContextStore::new();
    context.set_api_context("previo");
    let turns = DataFetcher::new()
        .fetch(&format!("http://127.0.0.1:{port}/"), &context)
        .await;
    assert_eq!(turns[0].content, "❌ Error en la API: 404");
    assert_eq!(context.api_context(), "previo");
    server.await.unwrap();
}

#[tokio::test]
async fn empty_records_report_no_records() {
    let (listener, port) = mock_listener().await;
    let server = serve_once(listener, "200 OK", r#"{"result":{"records":[]}}"#);

    let context = ContextStore::new();
    let turns = DataFetcher::new()
        .fetch(&format!("http://127.0.0.1:{port}/"), &context)
        .await;
    assert_eq!(turns[0].content, NO_RECORDS);
    assert_eq!(context.api_context(), "");
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_api_reports_connection_error() {
    let (listener, port) = mock_listener().await;
    drop(listener);

    let context = ContextStore::new();
    let turns = DataFetcher::new()
        .fetch(&format!("http://127.0.0.1:{port}/"), &context)
        .await;
    assert!(turns[0].content.starts_with("❌ Error al conectar con la API:"));
    assert_eq!(context.api_context(), "");
}
