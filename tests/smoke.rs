use std::path::PathBuf;

use asistente::chat::ChatResult;
use asistente::dispatch::{ChatMessage, SamplingParams};
use asistente::response::{ToolMetadata, ToolResponse};
use asistente::tools::chat::ChatToolRequest;

fn metadata() -> ToolMetadata {
    ToolMetadata {
        tool_name: "chat".to_string(),
        backend: "remote".to_string(),
        duration_seconds: 1.5,
    }
}

#[test]
fn chat_response_serializes_turns_and_audio() {
    let result = ChatResult {
        turns: vec![ChatMessage::user("hola"), ChatMessage::assistant("buenas")],
        audio_path: Some(PathBuf::from("response.mp3")),
        failed: false,
    };
    let json = serde_json::to_string(&ToolResponse::from_chat(result, metadata())).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed["status"], "success");
    assert_eq!(parsed["turns"][0]["role"], "user");
    assert_eq!(parsed["turns"][1]["role"], "assistant");
    assert_eq!(parsed["turns"][1]["content"], "buenas");
    assert_eq!(parsed["audio_path"], "response.mp3");
    assert_eq!(parsed["metadata"]["backend"], "remote");
    assert!(parsed["metadata"]["duration_seconds"].is_f64());
}

#[test]
fn failed_chat_reports_error_status() {
    let result = ChatResult {
        turns: vec![ChatMessage::user("q"), ChatMessage::assistant("Error: 500, boom")],
        audio_path: None,
        failed: true,
    };
    let json = serde_json::to_string(&ToolResponse::from_chat(result, metadata())).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed["status"], "error");
    assert!(parsed["audio_path"].is_null());
}

#[test]
fn non_finite_duration_is_clamped() {
    let mut meta = metadata();
    meta.duration_seconds = f64::NAN;
    let response = ToolResponse::from_turns(vec![ChatMessage::assistant("ok")], true, meta);
    let parsed: serde_json::Value = serde_json::to_value(&response).unwrap();
    assert_eq!(parsed["metadata"]["duration_seconds"], 0.0);
}

#[test]
fn tool_request_fills_sampling_defaults() {
    let req: ChatToolRequest =
        serde_json::from_str(r#"{"prompt": "hola", "temperature": 1.2, "tts": true}"#).unwrap();
    let chat = req.into_chat_request(&SamplingParams::default());

    assert_eq!(chat.prompt, "hola");
    assert!(chat.tts_enabled);
    assert_eq!(chat.sampling.temperature, 1.2);
    assert_eq!(chat.sampling.top_k, 20);
    assert_eq!(chat.sampling.top_p, 0.7);
    assert_eq!(chat.sampling.max_tokens, 50);
}
