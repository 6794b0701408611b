//! One logical completion request with bounded retry.
//!
//! `RetryingCompletionClient` wraps a `CompletionBackend` (the provider
//! transport) and retries only on overload (HTTP 529) and network failures,
//! with a fixed delay between attempts. Attempts are strictly sequential and
//! the delay is an async sleep, so other requests keep being served.
//! A `CancellationToken` aborts the in-flight call and any pending retry.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::VisualizationRecord;
use crate::error::{CompletionError, ProviderError};
use crate::normalize::normalize;

/// Raw text of a completion, or the provider failure.
pub type CompletionResult = Result<String, ProviderError>;

/// One block of user message content.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
  Text { text: String },
  Image { source: ImageSource },
}

#[derive(Clone, Debug, Serialize)]
pub struct ImageSource {
  #[serde(rename = "type")]
  pub kind: &'static str,
  pub media_type: String,
  pub data: String,
}

impl ContentBlock {
  pub fn base64_image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
    ContentBlock::Image {
      source: ImageSource { kind: "base64", media_type: media_type.into(), data: data.into() },
    }
  }
}

/// Per-call request; never persisted, the key is never logged.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
  pub content: Vec<ContentBlock>,
  pub model: String,
  pub max_tokens: u32,
  pub temperature: f32,
  pub api_key: SecretString,
}

impl CompletionRequest {
  /// Single text-block prompt.
  pub fn text(
    prompt: impl Into<String>,
    model: impl Into<String>,
    max_tokens: u32,
    temperature: f32,
    api_key: SecretString,
  ) -> Self {
    Self {
      content: vec![ContentBlock::Text { text: prompt.into() }],
      model: model.into(),
      max_tokens,
      temperature,
      api_key,
    }
  }

  pub fn prompt_len(&self) -> usize {
    self
      .content
      .iter()
      .map(|b| match b {
        ContentBlock::Text { text } => text.len(),
        ContentBlock::Image { source } => source.data.len(),
      })
      .sum()
  }
}

/// Transport seam: one attempt against the provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
  async fn send(&self, request: &CompletionRequest) -> CompletionResult;
}

/// Fixed-delay retry policy. `max_retries` excludes the first attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_retries: usize,
  pub delay: Duration,
}

impl RetryPolicy {
  pub fn new(max_retries: usize, delay_ms: u64) -> Self {
    Self { max_retries, delay: Duration::from_millis(delay_ms) }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    RetryPolicy::new(3, 2000)
  }
}

#[derive(Clone)]
pub struct RetryingCompletionClient {
  backend: Arc<dyn CompletionBackend>,
  policy: RetryPolicy,
}

impl RetryingCompletionClient {
  pub fn new(backend: Arc<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
    Self { backend, policy }
  }

  pub fn policy(&self) -> RetryPolicy {
    self.policy
  }

  /// Raw completion text with retry on transient failures.
  #[instrument(level = "info", skip(self, request, cancel), fields(model = %request.model, prompt_len = request.prompt_len()))]
  pub async fn complete_raw(
    &self,
    request: &CompletionRequest,
    cancel: &CancellationToken,
  ) -> CompletionResult {
    let mut retries = 0usize;
    loop {
      let attempt = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        r = self.backend.send(request) => r,
      };

      let err = match attempt {
        Ok(text) => {
          info!(target: "provider", retries, text_len = text.len(), "Completion received");
          return Ok(text);
        }
        Err(e) => e,
      };

      if !err.is_retryable() || retries >= self.policy.max_retries {
        warn!(target: "provider", retries, status = ?err.http_status(), error = %err, "Completion failed");
        return Err(err);
      }

      retries += 1;
      let delay_ms = self.policy.delay.as_millis() as u64;
      warn!(
        target: "provider",
        error = %err,
        delay_ms,
        attempt = retries,
        max_retries = self.policy.max_retries,
        "Transient provider failure; retrying"
      );
      tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        _ = tokio::time::sleep(self.policy.delay) => {}
      }
    }
  }

  /// Completion normalized into a visualization record.
  pub async fn complete(
    &self,
    request: &CompletionRequest,
    cancel: &CancellationToken,
  ) -> Result<VisualizationRecord, CompletionError> {
    let raw = self.complete_raw(request, cancel).await?;
    Ok(normalize(&raw)?)
  }
}
