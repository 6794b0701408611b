//! Tracing setup.
//!
//! - LOG_LEVEL (falling back to RUST_LOG) holds the filter directives, e.g.
//!   "debug" or "info,normalize=debug,provider=debug,tower_http=info".
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Event targets used across the crate:
//!   microsim_backend : request lifecycle (request id, elapsed, outcome)
//!   provider         : provider attempts, retries, token usage
//!   normalize        : which normalization stage recovered the output
//!   wiki             : Wikipedia lookups
//! Tower HTTP TraceLayer adds per-request spans on top of these.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,microsim_backend=debug,provider=info,wiki=info,tower_http=info,axum=info";

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env("LOG_LEVEL")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

pub fn init_tracing() {
  let builder = tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_target(true)
    .with_file(true)
    .with_line_number(true);

  // JSON and pretty builders have different types, so init in each arm.
  match std::env::var("LOG_FORMAT").as_deref() {
    Ok("json") => builder.json().init(),
    _ => builder.init(),
  }
}
