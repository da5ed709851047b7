//! End-to-end HTTP tests: the real router, file extractor and local
//! fetcher, with stub embedding and completion providers.

use anyhow::Result;
use async_trait::async_trait;
use paperlens::artifacts::ArtifactStore;
use paperlens::completion::Completer;
use paperlens::config::Config;
use paperlens::embedding::Embedder;
use paperlens::error::EmbedError;
use paperlens::extract::FileExtractor;
use paperlens::fetch::LocalFetcher;
use paperlens::server::{build_router, AppState};
use paperlens::session::SessionManager;
use paperlens_core::embedding::EmbedMode;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, texts: &[String], _mode: EmbedMode) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                vec![
                    if t.contains("widget") { 1.0 } else { 0.1 },
                    if t.contains("method") { 1.0 } else { 0.1 },
                ]
            })
            .collect())
    }
}

/// Returns a fixed outline for mind-map prompts and echoes the rest.
struct ScriptedCompleter;

#[async_trait]
impl Completer for ScriptedCompleter {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if prompt.contains("bullet outline") {
            Ok("- Paper\n  - Widgets\n  - Methods\n    - Sampling".to_string())
        } else {
            Ok(format!("answered: {}", prompt.len()))
        }
    }
}

struct TestServer {
    _tmp: TempDir,
    base: String,
    paper: String,
    client: reqwest::Client,
}

async fn start_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let paper = tmp.path().join("paper.md");
    std::fs::write(
        &paper,
        "Abstract\nWidgets improve throughput.\n\n2 Methods\nWe sample a method carefully.",
    )
    .unwrap();

    let mut config = Config::minimal();
    config.artifacts.dir = tmp.path().join("artifacts");

    let session = Arc::new(SessionManager::new(
        Arc::new(ArtifactStore::open(&config.artifacts.dir).unwrap()),
        Arc::new(LocalFetcher),
        Arc::new(FileExtractor::new(config.chunking.max_tokens)),
        Arc::new(KeywordEmbedder),
    ));
    let state = Arc::new(AppState {
        session,
        completer: Arc::new(ScriptedCompleter),
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        paper: paper.to_str().unwrap().to_string(),
        _tmp: tmp,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }

    async fn load_paper(&self) {
        let (status, body) = self
            .post("/update-pdf", json!({ "link": self.paper }))
            .await;
        assert_eq!(status, 200, "load failed: {}", body);
    }
}

#[tokio::test]
async fn test_health_and_empty_session() {
    let server = start_server().await;

    let health: Value = server.get("/health").await.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["pdf_loaded"], false);

    let pdf = server.get("/pdf").await;
    assert_eq!(pdf.status().as_u16(), 202);
    let body: Value = pdf.json().await.unwrap();
    assert_eq!(body["status"], "loading");

    let (status, body) = server.post("/query", json!({ "text": "widgets" })).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_update_pdf_validation_and_failures() {
    let server = start_server().await;

    let (status, body) = server.post("/update-pdf", json!({ "link": "  " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server
        .post("/update-pdf", json!({ "link": "/no/such/paper.pdf" }))
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "fetch_failed");

    let document: Value = server.get("/document").await.json().await.unwrap();
    assert_eq!(document["ready"], false);
}

#[tokio::test]
async fn test_load_query_and_ask() {
    let server = start_server().await;
    server.load_paper().await;

    let document: Value = server.get("/document").await.json().await.unwrap();
    assert_eq!(document["ready"], true);
    assert_eq!(document["chunk_count"], 2);

    let pdf = server.get("/pdf").await;
    assert_eq!(pdf.status().as_u16(), 200);
    assert!(pdf.text().await.unwrap().contains("Widgets improve throughput"));

    let (status, hit) = server.post("/query", json!({ "text": "method" })).await;
    assert_eq!(status, 200);
    assert_eq!(hit["chunk"]["topic"], "2 Methods");

    let (status, body) = server
        .post("/ask", json!({ "question": "what about widgets?" }))
        .await;
    assert_eq!(status, 200);
    assert!(body["answer"].as_str().unwrap().starts_with("answered:"));
    assert_eq!(body["source"]["chunk"]["topic"], "Abstract");

    let (status, _) = server.post("/ask", json!({ "question": "" })).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_process_selection_with_and_without_document() {
    let server = start_server().await;

    let (status, body) = server
        .post("/process-selection", json!({ "text": "throughput" }))
        .await;
    assert_eq!(status, 200);
    assert!(body["analysis"].as_str().is_some());

    let (status, _) = server.post("/process-selection", json!({})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_outline_endpoint_never_fails() {
    let server = start_server().await;

    let (status, body) = server
        .post(
            "/outline",
            json!({ "text": "- A\n  - B\n    - C\n  - D", "summary": "" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["graph"]["nodes"].as_array().unwrap().len(), 4);
    assert_eq!(body["mindMap"]["title"], "A");
    assert_eq!(body["mindMap"]["children"].as_array().unwrap().len(), 2);

    let (status, body) = server
        .post(
            "/outline",
            json!({ "text": "no bullets here", "summary": "Widgets improve throughput. See details." }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["mindMap"]["title"], "Widgets improve throughput");
}

#[tokio::test]
async fn test_generate_mindmap() {
    let server = start_server().await;

    let resp = server
        .client
        .post(format!("{}/generate-mindmap", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);

    server.load_paper().await;
    let resp = server
        .client
        .post(format!("{}/generate-mindmap", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["mindMap"]["title"], "Paper");
    assert_eq!(body["graph"]["edges"].as_array().unwrap().len(), 3);
}
