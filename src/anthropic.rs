//! Minimal Anthropic Messages API client.
//!
//! One call = one POST to `/v1/messages`; retry lives in `completion`.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::completion::{CompletionBackend, CompletionRequest, CompletionResult, ContentBlock};
use crate::error::ProviderError;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicClient {
  pub client: reqwest::Client,
  pub base_url: String,
}

impl AnthropicClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let base_url = base_url.into().trim_end_matches('/').to_string();
    Ok(Self { client, base_url })
  }
}

#[async_trait]
impl CompletionBackend for AnthropicClient {
  #[instrument(level = "info", skip(self, request), fields(model = %request.model, max_tokens = request.max_tokens))]
  async fn send(&self, request: &CompletionRequest) -> CompletionResult {
    let url = format!("{}/v1/messages", self.base_url);
    let body = MessagesRequest {
      model: &request.model,
      max_tokens: request.max_tokens,
      temperature: request.temperature,
      messages: vec![MessageReq { role: "user", content: &request.content }],
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "microsim-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-api-key", request.api_key.expose_secret())
      .header("anthropic-version", ANTHROPIC_VERSION)
      .json(&body).send().await
      .map_err(|e| ProviderError::from_transport(e.to_string(), e.is_connect() || e.is_timeout() || e.is_request()))?;

    let status = res.status();
    if !status.is_success() {
      let text = res.text().await.unwrap_or_default();
      let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
      let err = ProviderError::from_status(status.as_u16(), body);
      warn!(target: "provider", status = status.as_u16(), elapsed = ?start.elapsed(), error = %err, "Provider returned an error status");
      return Err(err);
    }

    let body: MessagesResponse = res.json().await
      .map_err(|e| ProviderError::from_transport(e.to_string(), e.is_body() || e.is_timeout()))?;
    if let Some(usage) = &body.usage {
      info!(target: "provider", input_tokens = ?usage.input_tokens, output_tokens = ?usage.output_tokens, "Anthropic usage");
    }

    let text = body.content.into_iter()
      .find(|b| b.kind == "text")
      .and_then(|b| b.text)
      .ok_or_else(|| ProviderError::Malformed("response contained no text block".into()))?;

    info!(target: "provider", elapsed = ?start.elapsed(), text_len = text.len(), stop_reason = ?body.stop_reason, "Provider response received");
    Ok(text)
  }
}

// --- Messages DTOs ---

#[derive(Serialize)]
struct MessagesRequest<'a> {
  model: &'a str,
  max_tokens: u32,
  temperature: f32,
  messages: Vec<MessageReq<'a>>,
}
#[derive(Serialize)]
struct MessageReq<'a> { role: &'static str, content: &'a [ContentBlock] }

#[derive(Deserialize)]
struct MessagesResponse {
  #[serde(default)] content: Vec<ContentResp>,
  #[serde(default)] stop_reason: Option<String>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ContentResp {
  #[serde(rename = "type")] kind: String,
  #[serde(default)] text: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] input_tokens: Option<u32>,
  #[serde(default)] output_tokens: Option<u32>,
}
