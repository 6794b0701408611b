//! Error taxonomy: provider failures (retryable vs terminal), completion
//! errors, and the route-level `ApiError` that maps everything to HTTP.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::Value;
use thiserror::Error;

use crate::domain::ParseFailure;
use crate::protocol::ErrorOut;

/// Failure of one call to the LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("provider rejected the API key (HTTP 401)")]
  Auth { body: Value },

  #[error("provider reports insufficient credits or quota (HTTP {status})")]
  Quota { status: u16, body: Value },

  #[error("provider overloaded (HTTP 529)")]
  Overloaded { body: Value },

  #[error("provider returned HTTP {status}: {body}")]
  Status { status: u16, body: Value },

  #[error("network error: {0}")]
  Network(String),

  #[error("malformed provider response: {0}")]
  Malformed(String),

  #[error("request cancelled")]
  Cancelled,
}

const QUOTA_MARKERS: [&str; 4] = ["credit", "quota", "billing", "balance"];

impl ProviderError {
  /// Classify a non-2xx response.
  pub fn from_status(status: u16, body: Value) -> Self {
    match status {
      401 => ProviderError::Auth { body },
      529 => ProviderError::Overloaded { body },
      400 | 402 | 403 if mentions_quota(&body) => ProviderError::Quota { status, body },
      _ => ProviderError::Status { status, body },
    }
  }

  /// Classify a transport-level failure by its message.
  pub fn from_transport(message: impl Into<String>, is_transport: bool) -> Self {
    let message = message.into();
    let lower = message.to_lowercase();
    if is_transport || lower.contains("fetch") || lower.contains("network") {
      ProviderError::Network(message)
    } else {
      ProviderError::Malformed(message)
    }
  }

  /// Only overload and network failures are worth another attempt.
  pub fn is_retryable(&self) -> bool {
    matches!(self, ProviderError::Overloaded { .. } | ProviderError::Network(_))
  }

  pub fn http_status(&self) -> Option<u16> {
    match self {
      ProviderError::Auth { .. } => Some(401),
      ProviderError::Quota { status, .. } | ProviderError::Status { status, .. } => Some(*status),
      ProviderError::Overloaded { .. } => Some(529),
      _ => None,
    }
  }

  /// Provider-supplied error body, when there was one.
  pub fn body(&self) -> Option<&Value> {
    match self {
      ProviderError::Auth { body }
      | ProviderError::Overloaded { body }
      | ProviderError::Quota { body, .. }
      | ProviderError::Status { body, .. } => Some(body),
      _ => None,
    }
  }
}

fn mentions_quota(body: &Value) -> bool {
  let text = body.to_string().to_lowercase();
  QUOTA_MARKERS.iter().any(|m| text.contains(m))
}

/// Outcome of a completion that should have yielded a record.
#[derive(Debug, Error)]
pub enum CompletionError {
  #[error(transparent)]
  Provider(#[from] ProviderError),

  #[error(transparent)]
  Parse(#[from] ParseFailure),
}

/// Route-level error; every variant has its own remediation message.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  Validation(String),

  #[error("Invalid API key (HTTP 401): please provide a valid key")]
  InvalidKey,

  /// `status` is the provider's own status code, kept in the message for clients
  /// that branch on it.
  #[error("Your API account is out of credits (HTTP {status}): please top up or use another key")]
  OutOfCredits { status: u16 },

  #[error("Request body is too large: {0}")]
  PayloadTooLarge(String),

  #[error("The model's output could not be understood")]
  Unparseable(ParseFailure),

  #[error("Content lookup failed: {0}")]
  Upstream(String),

  #[error("Error from LLM provider: {0}")]
  Provider(ProviderError),
}

impl From<ProviderError> for ApiError {
  fn from(e: ProviderError) -> Self {
    match e {
      ProviderError::Auth { .. } => ApiError::InvalidKey,
      ProviderError::Quota { status, .. } => ApiError::OutOfCredits { status },
      other => ApiError::Provider(other),
    }
  }
}

impl From<CompletionError> for ApiError {
  fn from(e: CompletionError) -> Self {
    match e {
      CompletionError::Provider(p) => p.into(),
      CompletionError::Parse(f) => ApiError::Unparseable(f),
    }
  }
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Validation(_) => StatusCode::BAD_REQUEST,
      ApiError::InvalidKey => StatusCode::UNAUTHORIZED,
      ApiError::OutOfCredits { .. } => StatusCode::PAYMENT_REQUIRED,
      ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
      ApiError::Unparseable(_) | ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
      ApiError::Provider(ProviderError::Overloaded { .. }) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn details(&self) -> Option<String> {
    match self {
      ApiError::Unparseable(f) => Some(f.raw_response_sample.clone()),
      ApiError::Provider(p) => p.body().map(|b| b.to_string()),
      _ => None,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> axum::response::Response {
    let body = ErrorOut { success: false, error: self.to_string(), details: self.details() };
    (self.status(), Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn status_classification() {
    assert!(matches!(ProviderError::from_status(401, json!({})), ProviderError::Auth { .. }));
    assert!(matches!(ProviderError::from_status(529, json!({})), ProviderError::Overloaded { .. }));
    let low_credit = json!({"error": {"type": "invalid_request_error", "message": "Your credit balance is too low"}});
    assert!(matches!(ProviderError::from_status(400, low_credit), ProviderError::Quota { status: 400, .. }));
    let bad = json!({"error": {"message": "max_tokens: too large"}});
    assert!(matches!(ProviderError::from_status(400, bad), ProviderError::Status { status: 400, .. }));
  }

  #[test]
  fn only_overload_and_network_retry() {
    assert!(ProviderError::from_status(529, json!({})).is_retryable());
    assert!(ProviderError::Network("connection reset".into()).is_retryable());
    assert!(!ProviderError::from_status(401, json!({})).is_retryable());
    assert!(!ProviderError::from_status(500, json!({})).is_retryable());
    assert!(!ProviderError::Cancelled.is_retryable());
  }

  #[test]
  fn transport_messages_are_classified() {
    assert!(matches!(ProviderError::from_transport("failed to fetch", false), ProviderError::Network(_)));
    assert!(matches!(ProviderError::from_transport("Network unreachable", false), ProviderError::Network(_)));
    assert!(matches!(ProviderError::from_transport("expected value at line 1", false), ProviderError::Malformed(_)));
  }

  #[test]
  fn api_error_statuses_distinguish_remediation() {
    assert_eq!(ApiError::from(ProviderError::from_status(401, json!({}))).status(), StatusCode::UNAUTHORIZED);
    let quota = ApiError::from(ProviderError::Quota { status: 400, body: json!({}) });
    assert_eq!(quota.status(), StatusCode::PAYMENT_REQUIRED);
    // Clients branch on the upstream code inside the message.
    assert!(quota.to_string().contains("400"));
    assert!(ApiError::InvalidKey.to_string().contains("401"));
    let parse = CompletionError::Parse(ParseFailure::new("x", "raw"));
    assert_eq!(ApiError::from(parse).status(), StatusCode::BAD_GATEWAY);
  }
}
