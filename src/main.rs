//! MicroSim · Visualization Generation Backend
//!
//! - Axum HTTP API turning concepts, Wikipedia links and flashcard images
//!   into runnable p5.js / Three.js / D3.js / Mermaid.js code
//! - Anthropic Messages API with bounded retry on overload and network errors
//! - Tolerant normalization of model output into structured records
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   ANTHROPIC_API_KEY   : default key when a request does not bring its own
//!   ANTHROPIC_BASE_URL  : default "https://api.anthropic.com"
//!   WIKIPEDIA_BASE_URL  : default "https://en.wikipedia.org"
//!   MICROSIM_CONFIG_PATH: path to TOML config (models, retry policy, prompts)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod error;
mod normalize;
mod completion;
mod anthropic;
mod wiki;
mod image;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (config, provider client, Wikipedia client).
  let state = Arc::new(AppState::from_env()?);

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "microsim_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "microsim_backend", "HTTP server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "microsim_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "microsim_backend", "Shutdown signal received");
}
