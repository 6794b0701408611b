//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler owns a cancellation token for its request: when axum drops the
//! handler future (client went away), the guard fires and any in-flight
//! provider call or pending retry is abandoned.

use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

/// Token for one request plus the guard that cancels it on drop.
fn request_scope() -> (CancellationToken, DropGuard) {
  let token = CancellationToken::new();
  let guard = token.clone().drop_guard();
  (token, guard)
}

/// Malformed bodies (bad JSON, unknown format names, wrong types) are 400s;
/// bodies over the configured limit keep their 413.
fn body_or_400<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
  match payload {
    Ok(Json(body)) => Ok(body),
    Err(rej) => {
      warn!(target: "microsim_backend", status = %rej.status(), reason = %rej.body_text(), "Rejected request body");
      if rej.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Err(ApiError::PayloadTooLarge(rej.body_text()))
      } else {
        Err(ApiError::Validation(rej.body_text()))
      }
    }
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip_all)]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<GenerateIn>, JsonRejection>,
) -> Result<Json<GenerateOut>, ApiError> {
  let body = body_or_400(payload)?;
  let (cancel, _guard) = request_scope();
  let out = generate_visualization(&state, body, &cancel).await?;
  info!(target: "microsim_backend", code_len = out.code_outputs.values().map(String::len).sum::<usize>(), "HTTP generate served");
  Ok(Json(out))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_remix(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<RemixIn>, JsonRejection>,
) -> Result<Json<RemixOut>, ApiError> {
  let body = body_or_400(payload)?;
  let (cancel, _guard) = request_scope();
  let out = remix_visualization(&state, body, &cancel).await?;
  info!(target: "microsim_backend", fixes = out.fixes.len(), "HTTP remix served");
  Ok(Json(out))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_mcq(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<McqIn>, JsonRejection>,
) -> Result<Json<McqOut>, ApiError> {
  let body = body_or_400(payload)?;
  let (cancel, _guard) = request_scope();
  let mcq = generate_mcq(&state, body, &cancel).await?;
  info!(target: "microsim_backend", questions = mcq.questions.len(), "HTTP mcq served");
  Ok(Json(McqOut { success: true, mcq }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_image(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<ImageIn>, JsonRejection>,
) -> Result<Json<ImageOut>, ApiError> {
  let body = body_or_400(payload)?;
  let (cancel, _guard) = request_scope();
  let out = image_to_code(&state, body, &cancel).await?;
  info!(target: "microsim_backend", prompt_name = %out.prompt_name, "HTTP image served");
  Ok(Json(out))
}
