//! Router assembly: HTTP endpoints, body limit, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  extract::DefaultBodyLimit,
  routing::{get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - POST-only generation endpoints under `/api/...` (other methods get 405)
/// - `/api/health` for liveness
/// - a body limit sized for base64 image uploads
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
  let max_body = state.config.models.max_body_bytes;

  Router::new()
    .route("/api/health", get(http::http_health))
    .route("/api/generate", post(http::http_post_generate))
    .route("/api/remix", post(http::http_post_remix))
    .route("/api/mcq", post(http::http_post_mcq))
    .route("/api/image", post(http::http_post_image))
    .with_state(state)
    .layer(DefaultBodyLimit::max(max_body))
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
  };
  use secrecy::SecretString;
  use async_trait::async_trait;
  use serde_json::{json, Value};
  use std::sync::atomic::{AtomicBool, Ordering};
  use tokio::sync::Notify;
  use tower::ServiceExt;

  use crate::completion::tests::ScriptedBackend;
  use crate::completion::{CompletionBackend, CompletionRequest, CompletionResult};
  use crate::config::ServiceConfig;
  use crate::error::ProviderError;
  use crate::wiki::WikiClient;

  fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.retry.delay_ms = 1;
    config
  }

  fn router_for(backend: Arc<dyn CompletionBackend>, config: ServiceConfig, wiki_url: &str) -> Router {
    let wiki = WikiClient::new(wiki_url, Duration::from_secs(5)).expect("wiki client");
    let state = AppState::new(config, backend, wiki, Some(SecretString::new("sk-default".into())));
    build_router(Arc::new(state))
  }

  fn app_with(script: Vec<CompletionResult>, wiki_url: &str) -> (Router, Arc<ScriptedBackend>) {
    let backend = ScriptedBackend::new(script);
    (router_for(backend.clone(), test_config(), wiki_url), backend)
  }

  fn app(script: Vec<CompletionResult>) -> (Router, Arc<ScriptedBackend>) {
    app_with(script, "http://127.0.0.1:9")
  }

  async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
      .method("POST")
      .uri(uri)
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .expect("request");
    let res = app.oneshot(req).await.expect("response");
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
  }

  fn record(code: &str) -> String {
    json!({
      "code": code,
      "summary": "Pendulums swing.",
      "conceptName": "Pendulum",
      "keyPrinciples": ["Gravity", "Inertia"],
      "interactivityNotes": "Drag the bob.",
      "learningObjectives": ["Explain period"],
    })
    .to_string()
  }

  #[tokio::test]
  async fn generate_returns_code_under_format_key() {
    let (app, backend) = app(vec![Ok(format!("Sure!\n{}", record("function setup() {}")))]);
    let (status, body) = post(app, "/api/generate", json!({"source": "concept", "input": "pendulum", "format": "p5js"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["codeOutputs"]["p5js"], "function setup() {}");
    assert_eq!(body["concept"]["name"], "Pendulum");
    assert_eq!(body["concept"]["principles"][1], "Inertia");
    assert_eq!(body["learningObjectives"][0], "Explain period");

    let prompts = backend.prompts.lock().expect("lock");
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].model, ServiceConfig::default().models.generate_model);
  }

  #[tokio::test]
  async fn non_post_is_method_not_allowed() {
    let (app, _) = app(vec![]);
    let req = Request::builder().method("GET").uri("/api/generate").body(Body::empty()).expect("request");
    let res = app.oneshot(req).await.expect("response");
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
  }

  #[tokio::test]
  async fn missing_input_is_bad_request_without_provider_call() {
    let (app, backend) = app(vec![]);
    let (status, body) = post(app, "/api/generate", json!({"source": "concept", "format": "d3js"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(backend.call_count(), 0);
  }

  #[tokio::test]
  async fn unknown_format_is_bad_request() {
    let (app, backend) = app(vec![]);
    let (status, _) = post(app, "/api/generate", json!({"source": "concept", "input": "x", "format": "svgjs"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(backend.call_count(), 0);
  }

  #[tokio::test]
  async fn rejected_key_maps_to_unauthorized() {
    let (app, backend) = app(vec![Err(ProviderError::from_status(401, json!({"error": {"type": "authentication_error"}})))]);
    let (status, body) = post(app, "/api/generate", json!({"source": "concept", "input": "x", "apiKeyFormate": "sk-bad"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let msg = body["error"].as_str().unwrap_or_default();
    assert!(msg.contains("valid key"));
    assert!(msg.contains("401"));
    assert_eq!(backend.call_count(), 1);
  }

  #[tokio::test]
  async fn low_credit_maps_to_payment_required() {
    let low = json!({"error": {"message": "Your credit balance is too low to access the API"}});
    let (app, _) = app(vec![Err(ProviderError::from_status(400, low))]);
    let (status, body) = post(app, "/api/generate", json!({"source": "concept", "input": "x"})).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    let msg = body["error"].as_str().unwrap_or_default();
    assert!(msg.contains("out of credits"));
    assert!(msg.contains("400"));
  }

  #[tokio::test]
  async fn unparseable_output_is_bad_gateway_with_sample() {
    let (app, _) = app(vec![Ok("I cannot help with that.".into())]);
    let (status, body) = post(app, "/api/generate", json!({"source": "concept", "input": "x"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["details"], "I cannot help with that.");
  }

  #[tokio::test]
  async fn persistent_overload_is_service_unavailable() {
    let overloaded = || -> CompletionResult { Err(ProviderError::from_status(529, json!({"error": {"type": "overloaded_error"}}))) };
    let (app, backend) = app(vec![overloaded(), overloaded(), overloaded(), overloaded()]);
    let (status, _) = post(app, "/api/generate", json!({"source": "concept", "input": "x"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(backend.call_count(), 4);
  }

  #[tokio::test]
  async fn wikipedia_source_uses_intro_as_content() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
      .mock("GET", "/w/api.php")
      .match_query(mockito::Matcher::Any)
      .with_status(200)
      .with_body(json!({"query": {"pages": {"7": {"title": "Pendulum", "extract": "A pendulum is a weight suspended from a pivot."}}}}).to_string())
      .create_async()
      .await;

    let (app, backend) = app_with(vec![Ok(record("graph TD; A-->B"))], &server.url());
    let (status, body) = post(
      app,
      "/api/generate",
      json!({"source": "wikipedia", "input": "https://en.wikipedia.org/wiki/Pendulum", "format": "mermaidjs"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["codeOutputs"]["mermaidjs"], "graph TD; A-->B");

    let prompts = backend.prompts.lock().expect("lock");
    let sent = serde_json::to_string(&prompts[0].content).expect("content");
    assert!(sent.contains("weight suspended from a pivot"));
    assert!(sent.contains("Mermaid.js"));
  }

  #[tokio::test]
  async fn remix_surfaces_fixes_and_debug_info() {
    let out = json!({"code": "fixed()", "summary": "s", "fixes": ["Added draw()"], "debugInfo": "check console"}).to_string();
    let (app, backend) = app(vec![Ok(out)]);
    let (status, body) = post(
      app,
      "/api/remix",
      json!({"source": "concept", "input": "waves", "format": "threejs", "existingCode": "broken(", "remixVersion": "2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["codeOutputs"]["threejs"], "fixed()");
    assert_eq!(body["fixes"][0], "Added draw()");
    assert_eq!(body["debugInfo"], "check console");

    let prompts = backend.prompts.lock().expect("lock");
    let sent = serde_json::to_string(&prompts[0].content).expect("content");
    assert!(sent.contains("layout isn't quite right"));
    assert!(sent.contains("broken("));
  }

  #[tokio::test]
  async fn mcq_returns_validated_questions() {
    let out = json!({"questions": [
      {"question": "What sets the period?", "options": ["Length", "Mass", "Color", "Age"], "correctAnswer": 0, "explanation": "T depends on L."}
    ]})
    .to_string();
    let (app, _) = app(vec![Ok(format!("```json\n{out}\n```"))]);
    let (status, body) = post(app, "/api/mcq", json!({"summary": "Pendulums swing."})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["mcq"]["questions"][0]["correctAnswer"], 0);
    assert_eq!(body["mcq"]["questions"][0]["options"][3], "Age");
  }

  #[tokio::test]
  async fn image_route_sends_image_block() {
    // 1x1 PNG header is enough for type sniffing.
    let png = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
    let out = json!({"prompt_name": "Ohm's law", "prompt": "V = IR", "wikipedia_link": "https://en.wikipedia.org/wiki/Ohm%27s_law", "summary": "s", "code": "draw()"}).to_string();
    let (app, backend) = app(vec![Ok(out)]);
    let (status, body) = post(app, "/api/image", json!({"file": png, "formate": "p5js"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt_name"], "Ohm's law");
    assert_eq!(body["code"], "draw()");

    let prompts = backend.prompts.lock().expect("lock");
    let blocks = serde_json::to_value(&prompts[0].content).expect("content");
    assert_eq!(blocks[1]["type"], "image");
    assert_eq!(blocks[1]["source"]["media_type"], "image/png");
  }

  #[tokio::test]
  async fn health_is_ok() {
    let (app, _) = app(vec![]);
    let req = Request::builder().uri("/api/health").body(Body::empty()).expect("request");
    let res = app.oneshot(req).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn oversized_body_is_payload_too_large() {
    let backend = ScriptedBackend::new(vec![]);
    let mut config = test_config();
    config.models.max_body_bytes = 64;
    let app = router_for(backend.clone(), config, "http://127.0.0.1:9");
    let (status, body) = post(app, "/api/image", json!({"file": "A".repeat(256)})).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
    assert_eq!(backend.call_count(), 0);
  }

  /// Sets its flag when dropped.
  struct DropFlag(Arc<AtomicBool>);

  impl Drop for DropFlag {
    fn drop(&mut self) {
      self.0.store(true, Ordering::SeqCst);
    }
  }

  /// Backend whose call never completes; reports when it starts and when its future is dropped.
  struct StalledBackend {
    started: Notify,
    dropped: Arc<AtomicBool>,
  }

  #[async_trait]
  impl CompletionBackend for StalledBackend {
    async fn send(&self, _request: &CompletionRequest) -> CompletionResult {
      let _flag = DropFlag(self.dropped.clone());
      self.started.notify_one();
      std::future::pending().await
    }
  }

  #[tokio::test]
  async fn client_disconnect_abandons_inflight_call() {
    let backend = Arc::new(StalledBackend { started: Notify::new(), dropped: Arc::new(AtomicBool::new(false)) });
    let app = router_for(backend.clone(), test_config(), "http://127.0.0.1:9");
    let req = Request::builder()
      .method("POST")
      .uri("/api/generate")
      .header("content-type", "application/json")
      .body(Body::from(json!({"source": "concept", "input": "x"}).to_string()))
      .expect("request");

    let handle = tokio::spawn(app.oneshot(req));
    backend.started.notified().await;
    assert!(!backend.dropped.load(Ordering::SeqCst));

    handle.abort();
    let err = handle.await.expect_err("aborted");
    assert!(err.is_cancelled());
    assert!(backend.dropped.load(Ordering::SeqCst));
  }
}
