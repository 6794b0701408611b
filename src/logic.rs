//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Generating a visualization from a concept or a Wikipedia link
//!   - Remixing (repairing / re-laying-out / adding controls to) existing code
//!   - Generating MCQs from a summary
//!   - Turning a flashcard image into code
//!
//! Every path builds a prompt, makes one retrying completion call, and
//! normalizes the raw text. Errors come back as `ApiError`.

use std::time::Instant;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::completion::{CompletionRequest, ContentBlock};
use crate::domain::{InputSource, McqSet, RemixVersion, VisualizationFormat};
use crate::error::ApiError;
use crate::image::prepare_image;
use crate::normalize::{normalize_mcq, unescape_double_escaped_code};
use crate::protocol::{GenerateIn, GenerateOut, ImageIn, ImageOut, McqIn, RemixIn, RemixOut};
use crate::state::AppState;
use crate::util::fill_template;

/// Caller-supplied key wins; otherwise the process default.
pub fn resolve_api_key(state: &AppState, supplied: Option<String>) -> Result<SecretString, ApiError> {
  match supplied.filter(|k| !k.trim().is_empty()) {
    Some(k) => Ok(SecretString::new(k)),
    None => state
      .default_api_key
      .clone()
      .ok_or_else(|| ApiError::Validation("API key is required".into())),
  }
}

fn required(field: Option<String>) -> Option<String> {
  field.filter(|s| !s.trim().is_empty())
}

/// Text the prompt is built from: the Wikipedia intro for link sources, the raw input otherwise.
async fn topic_content(state: &AppState, source: InputSource, input: &str, lookup: bool) -> Result<String, ApiError> {
  if !lookup {
    return Ok(input.to_string());
  }
  match state.wiki.fetch_intro(input).await {
    Ok(page) => {
      info!(target: "wiki", title = %page.title, source = source.as_str(), "Using Wikipedia intro as topic content");
      Ok(page.extract)
    }
    Err(e) => {
      error!(target: "wiki", error = %e, "Wikipedia lookup failed");
      Err(ApiError::Upstream(e.to_string()))
    }
  }
}

#[instrument(level = "info", skip(state, body, cancel), fields(format = %body.format))]
pub async fn generate_visualization(
  state: &AppState,
  body: GenerateIn,
  cancel: &CancellationToken,
) -> Result<GenerateOut, ApiError> {
  let (Some(source), Some(input)) = (body.source, required(body.input)) else {
    return Err(ApiError::Validation("Missing required parameters: source and input".into()));
  };
  let api_key = resolve_api_key(state, body.api_key_formate)?;
  let format = body.format;

  let request_id = Uuid::new_v4();
  info!(target: "microsim_backend", %request_id, source = source.as_str(), %format, "Generate request started");

  let content = topic_content(state, source, &input, source == InputSource::Wikipedia).await?;
  let prompt = fill_template(
    &state.config.prompts.visualization_template,
    &[
      ("source", source.as_str()),
      ("content", &content),
      ("format", format.label()),
      ("guidelines", format.guidelines()),
    ],
  );

  let models = &state.config.models;
  let req = CompletionRequest::text(prompt, &models.generate_model, models.max_tokens, models.temperature, api_key);
  let start = Instant::now();
  let result = state.completion.complete(&req, cancel).await;
  info!(target: "microsim_backend", %request_id, elapsed = ?start.elapsed(), ok = result.is_ok(), "Generate request completed");

  let mut rec = result?;
  rec.code = unescape_double_escaped_code(&rec.code);
  Ok(GenerateOut::from_record(format, rec))
}

fn remix_preamble(state: &AppState, version: RemixVersion, format: VisualizationFormat) -> String {
  let p = &state.config.prompts;
  let tpl = match version {
    RemixVersion::Fix => &p.remix_fix_preamble,
    RemixVersion::Layout => &p.remix_layout_preamble,
    RemixVersion::Interactive => &p.remix_interactive_preamble,
  };
  fill_template(tpl, &[("format", format.label())])
}

#[instrument(level = "info", skip(state, body, cancel), fields(format = %body.format, version = ?body.remix_version))]
pub async fn remix_visualization(
  state: &AppState,
  body: RemixIn,
  cancel: &CancellationToken,
) -> Result<RemixOut, ApiError> {
  let (Some(source), Some(input), Some(existing_code)) =
    (body.source, required(body.input), required(body.existing_code))
  else {
    return Err(ApiError::Validation("Missing required parameters: input and existingCode and source".into()));
  };
  let api_key = resolve_api_key(state, body.api_key_formate)?;
  let format = body.format;

  let request_id = Uuid::new_v4();
  info!(target: "microsim_backend", %request_id, %format, code_len = existing_code.len(), "Remix request started");

  let lookup = matches!(source, InputSource::Wikipedia | InputSource::Image);
  let content = topic_content(state, source, &input, lookup).await?;
  let prompt = fill_template(
    &state.config.prompts.remix_template,
    &[
      ("preamble", &remix_preamble(state, body.remix_version, format)),
      ("content", &content),
      ("existing_code", &existing_code),
      ("format", format.label()),
      ("guidelines", format.guidelines()),
    ],
  );

  let models = &state.config.models;
  let req = CompletionRequest::text(prompt, &models.remix_model, models.max_tokens, models.temperature, api_key);
  let start = Instant::now();
  let result = state.completion.complete(&req, cancel).await;
  info!(target: "microsim_backend", %request_id, elapsed = ?start.elapsed(), ok = result.is_ok(), "Remix request completed");

  let rec = result?;
  let fixes = rec.extra_list("fixes");
  let debug_info = rec.extra_str("debugInfo");
  Ok(RemixOut { base: GenerateOut::from_record(format, rec), fixes, debug_info })
}

#[instrument(level = "info", skip(state, body, cancel))]
pub async fn generate_mcq(state: &AppState, body: McqIn, cancel: &CancellationToken) -> Result<McqSet, ApiError> {
  let summary = required(body.summary)
    .ok_or_else(|| ApiError::Validation("Missing required parameter: summary".into()))?;
  let api_key = resolve_api_key(state, body.api_key_formate)?;

  let request_id = Uuid::new_v4();
  info!(target: "microsim_backend", %request_id, summary_len = summary.len(), "MCQ request started");

  let prompt = fill_template(&state.config.prompts.mcq_template, &[("summary", &summary)]);
  let models = &state.config.models;
  let req = CompletionRequest::text(prompt, &models.mcq_model, models.max_tokens, models.mcq_temperature, api_key);
  let start = Instant::now();
  let raw = state.completion.complete_raw(&req, cancel).await;
  info!(target: "microsim_backend", %request_id, elapsed = ?start.elapsed(), ok = raw.is_ok(), "MCQ request completed");

  normalize_mcq(&raw?).map_err(ApiError::Unparseable)
}

#[instrument(level = "info", skip(state, body, cancel), fields(format = %body.formate))]
pub async fn image_to_code(state: &AppState, body: ImageIn, cancel: &CancellationToken) -> Result<ImageOut, ApiError> {
  let file = required(body.file).ok_or_else(|| ApiError::Validation("No file found".into()))?;
  let image = prepare_image(&file).map_err(|e| {
    warn!(target: "microsim_backend", error = %e, "Rejected image upload");
    ApiError::Validation(e.to_string())
  })?;
  let api_key = resolve_api_key(state, body.api_key_formate)?;
  let format = body.formate;

  let request_id = Uuid::new_v4();
  info!(target: "microsim_backend", %request_id, %format, media_type = image.media_type, image_b64_len = image.data.len(), "Image request started");

  let prompt = fill_template(
    &state.config.prompts.image_template,
    &[("format", format.label()), ("guidelines", format.guidelines())],
  );
  let models = &state.config.models;
  let req = CompletionRequest {
    content: vec![
      ContentBlock::Text { text: prompt },
      ContentBlock::base64_image(image.media_type, image.data),
    ],
    model: models.image_model.clone(),
    max_tokens: models.max_tokens,
    temperature: models.temperature,
    api_key,
  };
  let start = Instant::now();
  let result = state.completion.complete(&req, cancel).await;
  info!(target: "microsim_backend", %request_id, elapsed = ?start.elapsed(), ok = result.is_ok(), "Image request completed");

  let rec = result?;
  Ok(ImageOut {
    success: true,
    format,
    prompt_name: rec.extra_str("prompt_name").unwrap_or_default(),
    prompt: rec.extra_str("prompt").unwrap_or_default(),
    wikipedia_link: rec.extra_str("wikipedia_link").unwrap_or_default(),
    summary: rec.summary,
    code: rec.code,
  })
}
