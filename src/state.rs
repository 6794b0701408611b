//! Application state shared by all handlers.
//!
//! Holds only immutable inputs: configuration, the default API key, the
//! retrying completion client, and the Wikipedia client. Nothing here is
//! mutated per request.

use std::{sync::Arc, time::Duration};

use secrecy::SecretString;
use tracing::{info, instrument, warn};

use crate::anthropic::AnthropicClient;
use crate::completion::{CompletionBackend, RetryingCompletionClient};
use crate::config::{load_config_from_env, ServiceConfig};
use crate::wiki::WikiClient;

#[derive(Clone)]
pub struct AppState {
  pub config: ServiceConfig,
  pub completion: RetryingCompletionClient,
  pub wiki: WikiClient,
  pub default_api_key: Option<SecretString>,
}

impl AppState {
  pub fn new(
    config: ServiceConfig,
    backend: Arc<dyn CompletionBackend>,
    wiki: WikiClient,
    default_api_key: Option<SecretString>,
  ) -> Self {
    let completion = RetryingCompletionClient::new(backend, config.retry.policy());
    Self { config, completion, wiki, default_api_key }
  }

  /// Build state from env: load config, build the provider and wiki clients.
  #[instrument(level = "info", skip_all)]
  pub fn from_env() -> Result<Self, reqwest::Error> {
    let config = load_config_from_env().unwrap_or_default();
    let timeout = Duration::from_secs(config.models.timeout_secs);

    let base_url = std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| "https://api.anthropic.com".into());
    let wiki_url = std::env::var("WIKIPEDIA_BASE_URL").unwrap_or_else(|_| "https://en.wikipedia.org".into());
    let backend = AnthropicClient::new(&base_url, timeout)?;
    let wiki = WikiClient::new(&wiki_url, Duration::from_secs(20))?;

    let default_api_key = std::env::var("ANTHROPIC_API_KEY")
      .ok()
      .filter(|k| !k.trim().is_empty())
      .map(SecretString::new);
    if default_api_key.is_some() {
      info!(target: "microsim_backend", %base_url, "Default Anthropic key configured.");
    } else {
      warn!(target: "microsim_backend", %base_url, "ANTHROPIC_API_KEY not set; callers must supply their own key.");
    }
    let state = Self::new(config, Arc::new(backend), wiki, default_api_key);
    let policy = state.completion.policy();
    let retry_delay_ms = policy.delay.as_millis() as u64;
    info!(
      target: "microsim_backend",
      generate_model = %state.config.models.generate_model,
      mcq_model = %state.config.models.mcq_model,
      max_retries = policy.max_retries,
      retry_delay_ms,
      "Provider settings"
    );

    Ok(state)
  }
}
