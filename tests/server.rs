//! HTTP tests driving the axum router in-process with `tower::ServiceExt`.

#![cfg(feature = "server")]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use texrelay::pipeline::plan::Invocation;
use texrelay::server::{create_router, AppState};
use texrelay::{
    AssetDir, GenerationError, ProcessOutput, ProcessRunner, RelayConfig, TextGenerator,
    UnconfiguredGenerator,
};
use tower::ServiceExt;

// ── Test doubles ─────────────────────────────────────────────────────────────

struct StubGenerator {
    reply: Result<String, GenerationError>,
    prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(err: GenerationError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(err),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl TextGenerator for StubGenerator {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, GenerationError>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self.reply.clone();
        async move { reply }.boxed()
    }
}

/// Writes a PDF on the first pass unless told to fail with a log.
struct FakeLatex {
    fail_with_log: Option<&'static str>,
}

impl ProcessRunner for FakeLatex {
    fn run<'a>(
        &'a self,
        _invocation: &'a Invocation,
        cwd: &'a Path,
        _limit: Duration,
    ) -> BoxFuture<'a, io::Result<ProcessOutput>> {
        async move {
            match self.fail_with_log {
                Some(log) => {
                    std::fs::write(cwd.join("preview.log"), log)?;
                    Ok(ProcessOutput {
                        exit_code: Some(1),
                        ..Default::default()
                    })
                }
                None => {
                    std::fs::write(cwd.join("preview.pdf"), b"%PDF-1.4 fake")?;
                    Ok(ProcessOutput {
                        exit_code: Some(0),
                        ..Default::default()
                    })
                }
            }
        }
        .boxed()
    }
}

struct Harness {
    _assets: TempDir,
    _workspaces: TempDir,
    router: axum::Router,
}

fn harness(generator: Arc<dyn TextGenerator>, runner: FakeLatex) -> Harness {
    let assets = TempDir::new().unwrap();
    let workspaces = TempDir::new().unwrap();
    let config = RelayConfig::builder()
        .assets_dir(assets.path())
        .workspace_root(workspaces.path())
        .build()
        .unwrap();
    let state = AppState::new(config, generator)
        .with_assets(Arc::new(AssetDir::new(assets.path())))
        .with_runner(Arc::new(runner));
    Harness {
        _assets: assets,
        _workspaces: workspaces,
        router: create_router(Arc::new(state), 1024 * 1024),
    }
}

fn ok_latex() -> FakeLatex {
    FakeLatex {
        fail_with_log: None,
    }
}

async fn post_json(router: &axum::Router, uri: &str, body: Value) -> (StatusCode, Vec<u8>, Option<String>) {
    post_raw(router, uri, body.to_string()).await
}

async fn post_raw(router: &axum::Router, uri: &str, body: String) -> (StatusCode, Vec<u8>, Option<String>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec(), content_type)
}

fn as_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

// ── Health ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let h = harness(StubGenerator::replying("x"), ok_latex());
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(as_json(&body)["status"], "ok");
}

// ── Compile ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn latex_to_pdf_returns_pdf() {
    let h = harness(StubGenerator::replying("x"), ok_latex());
    let (status, body, content_type) = post_json(
        &h.router,
        "/api/latex-to-pdf",
        json!({ "latex": "\\documentclass{article}\\begin{document}Hi\\end{document}" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/pdf"));
    assert_eq!(body, b"%PDF-1.4 fake");
}

#[tokio::test]
async fn latex_to_pdf_missing_field_is_400() {
    let h = harness(StubGenerator::replying("x"), ok_latex());
    let (status, body, _) = post_json(&h.router, "/api/latex-to-pdf", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v = as_json(&body);
    assert_eq!(v["success"], false);
    assert!(v["error"].as_str().unwrap().contains("latex"));
}

#[tokio::test]
async fn latex_to_pdf_failure_is_500_with_log() {
    let h = harness(
        StubGenerator::replying("x"),
        FakeLatex {
            fail_with_log: Some("! LaTeX Error: File `nope.sty' not found."),
        },
    );
    let (status, body, _) = post_json(
        &h.router,
        "/api/latex-to-pdf",
        json!({ "latex": "\\documentclass{article}\\usepackage{nope}\\begin{document}\\end{document}" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let v = as_json(&body);
    assert_eq!(v["success"], false);
    assert!(v["error"].as_str().unwrap().starts_with("LaTeX compilation failed"));
    assert!(v["log"].as_str().unwrap().contains("nope.sty"));
}

#[tokio::test]
async fn malformed_json_is_400() {
    let h = harness(StubGenerator::replying("x"), ok_latex());
    let (status, body, _) = post_raw(&h.router, "/api/latex-to-pdf", "{not json".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(as_json(&body)["success"], false);
}

// ── Generation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn generate_paper_returns_cleaned_latex() {
    let generator = StubGenerator::replying("```latex\n\\documentclass{svjour3}\n\\begin{document}\n\\end{document}\n```");
    let h = harness(generator.clone(), ok_latex());
    let (status, body, _) = post_json(
        &h.router,
        "/api/generate-paper",
        json!({ "topic": "Graph sparsification", "length": 6 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v = as_json(&body);
    assert_eq!(v["success"], true);
    assert!(v["paper"].as_str().unwrap().starts_with("\\documentclass{IEEEtran}\n"));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn generate_paper_without_topic_skips_the_llm() {
    let generator = StubGenerator::replying("unused");
    let h = harness(generator.clone(), ok_latex());
    let (status, _, _) = post_json(&h.router, "/api/generate-paper", json!({ "domain": "CS" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn summarize_and_review() {
    let h = harness(StubGenerator::replying("fine work"), ok_latex());
    let (status, body, _) =
        post_json(&h.router, "/api/summarize", json!({ "arxivId": "1706.03762" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["summary"], "fine work");

    let (status, body, _) = post_json(&h.router, "/api/review", json!({ "text": "A paper." })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["review"], "fine work");

    let (status, _, _) = post_json(&h.router, "/api/review", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn analyze_rejects_unknown_type() {
    let generator = StubGenerator::replying("novel enough");
    let h = harness(generator.clone(), ok_latex());
    let (status, body, _) = post_json(
        &h.router,
        "/api/analyze",
        json!({ "inputText": "Some work", "type": "vibes" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(as_json(&body)["error"].as_str().unwrap().contains("vibes"));

    let (status, body, _) = post_json(
        &h.router,
        "/api/analyze",
        json!({ "inputText": "Some work", "type": "novelty" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["analysis"], "novel enough");
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn chatbot_replies() {
    let h = harness(StubGenerator::replying("Use \\cite."), ok_latex());
    let (status, body, _) =
        post_json(&h.router, "/api/chatbot", json!({ "message": "How do I cite?" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["reply"], "Use \\cite.");

    let (status, _, _) = post_json(&h.router, "/api/chatbot", json!({ "message": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upstream_failure_is_500_with_trace() {
    let h = harness(
        StubGenerator::failing(GenerationError::Failed {
            attempts: 3,
            detail: "503 Service Unavailable".into(),
        }),
        ok_latex(),
    );
    let (status, body, _) = post_json(&h.router, "/api/chatbot", json!({ "message": "hi" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let v = as_json(&body);
    assert!(v["error"].as_str().unwrap().contains("503"));
    assert!(v["trace"].is_string());
}

#[tokio::test]
async fn unconfigured_generator_still_compiles() {
    let h = harness(Arc::new(UnconfiguredGenerator::new("started with --no-llm")), ok_latex());
    let (status, body, _) = post_json(&h.router, "/api/chatbot", json!({ "message": "hi" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(as_json(&body)["error"].as_str().unwrap().contains("--no-llm"));

    let (status, _, _) = post_json(
        &h.router,
        "/api/latex-to-pdf",
        json!({ "latex": "\\documentclass{article}\\begin{document}x\\end{document}" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
