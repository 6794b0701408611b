//! Wikipedia intro lookup for `source = wikipedia` requests.
//!
//! Unauthenticated GET against the public MediaWiki API, keyed by the page
//! title taken from the trailing path segment of the submitted URL.

use std::time::Duration;

use reqwest::header::USER_AGENT;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, instrument};

use crate::util::title_from_url;

#[derive(Debug, Error)]
pub enum WikiError {
  #[error("could not find a page title in '{0}'")]
  NoTitle(String),

  #[error("Wikipedia request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("Wikipedia API error: HTTP {0}")]
  Status(u16),

  #[error("no Wikipedia page found for '{0}'")]
  NotFound(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WikiPage {
  pub title: String,
  pub extract: String,
}

#[derive(Clone)]
pub struct WikiClient {
  client: reqwest::Client,
  base_url: String,
}

impl WikiClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let base_url = base_url.into().trim_end_matches('/').to_string();
    Ok(Self { client, base_url })
  }

  /// Fetch the plain-text intro of the page named by `url` (a link or a bare title).
  #[instrument(level = "info", skip(self), fields(base_url = %self.base_url))]
  pub async fn fetch_intro(&self, url: &str) -> Result<WikiPage, WikiError> {
    let segment = title_from_url(url).ok_or_else(|| WikiError::NoTitle(url.to_string()))?;
    // Copied links carry a percent-encoded segment; bare titles may not decode.
    let title = urlencoding::decode(&segment)
      .map(|t| t.into_owned())
      .unwrap_or(segment)
      .replace(' ', "_");

    let res = self.client.get(format!("{}/w/api.php", self.base_url))
      .query(&[
        ("action", "query"),
        ("prop", "extracts"),
        ("exintro", ""),
        ("explaintext", ""),
        ("titles", title.as_str()),
        ("format", "json"),
      ])
      .header(USER_AGENT, "microsim-backend/0.1")
      .send().await?;
    if !res.status().is_success() {
      return Err(WikiError::Status(res.status().as_u16()));
    }

    let body: QueryResponse = res.json().await?;
    let page = body.query.pages.into_values()
      .find(|p| p.missing.is_none() && p.extract.as_deref().is_some_and(|e| !e.trim().is_empty()))
      .ok_or_else(|| WikiError::NotFound(title.clone()))?;

    let extract = page.extract.unwrap_or_default();
    info!(target: "wiki", title = %page.title, extract_len = extract.len(), "Fetched Wikipedia intro");
    Ok(WikiPage { title: page.title, extract })
  }
}

#[derive(Deserialize)]
struct QueryResponse { query: Query }
#[derive(Deserialize)]
struct Query { #[serde(default)] pages: HashMap<String, Page> }
#[derive(Deserialize)]
struct Page {
  #[serde(default)] title: String,
  #[serde(default)] extract: Option<String>,
  #[serde(default)] missing: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use mockito::Matcher;
  use serde_json::json;

  #[tokio::test]
  async fn fetches_intro_by_trailing_segment() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", "/w/api.php")
      .match_query(Matcher::AllOf(vec![
        Matcher::UrlEncoded("titles".into(), "Simple_harmonic_motion".into()),
        Matcher::UrlEncoded("prop".into(), "extracts".into()),
      ]))
      .with_status(200)
      .with_body(json!({
        "query": {"pages": {"42": {"pageid": 42, "title": "Simple harmonic motion", "extract": "Periodic motion..."}}}
      }).to_string())
      .create_async().await;

    let client = WikiClient::new(server.url(), Duration::from_secs(5)).expect("client");
    let page = client.fetch_intro("https://en.wikipedia.org/wiki/Simple_harmonic_motion").await.expect("page");
    assert_eq!(page, WikiPage { title: "Simple harmonic motion".into(), extract: "Periodic motion...".into() });
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn missing_page_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _m = server.mock("GET", "/w/api.php")
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body(r#"{"query": {"pages": {"-1": {"title": "Nope", "missing": ""}}}}"#)
      .create_async().await;

    let client = WikiClient::new(server.url(), Duration::from_secs(5)).expect("client");
    let err = client.fetch_intro("https://en.wikipedia.org/wiki/Nope").await.expect_err("missing");
    assert!(matches!(err, WikiError::NotFound(t) if t == "Nope"));
  }

  #[tokio::test]
  async fn upstream_status_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let _m = server.mock("GET", "/w/api.php").match_query(Matcher::Any).with_status(503).create_async().await;

    let client = WikiClient::new(server.url(), Duration::from_secs(5)).expect("client");
    let err = client.fetch_intro("Pendulum").await.expect_err("503");
    assert!(matches!(err, WikiError::Status(503)));
  }

  #[tokio::test]
  async fn titles_are_decoded_and_query_encoded() {
    let mut server = mockito::Server::new_async().await;
    let body = json!({"query": {"pages": {"1": {"title": "T", "extract": "text"}}}}).to_string();
    let bare = server.mock("GET", "/w/api.php")
      .match_query(Matcher::AllOf(vec![
        Matcher::UrlEncoded("titles".into(), "Rock_&_roll".into()),
        Matcher::UrlEncoded("format".into(), "json".into()),
      ]))
      .with_status(200)
      .with_body(body.clone())
      .create_async().await;
    let linked = server.mock("GET", "/w/api.php")
      .match_query(Matcher::UrlEncoded("titles".into(), "Ohm's_law".into()))
      .with_status(200)
      .with_body(body)
      .create_async().await;

    let client = WikiClient::new(server.url(), Duration::from_secs(5)).expect("client");
    client.fetch_intro("Rock & roll").await.expect("bare title");
    client.fetch_intro("https://en.wikipedia.org/wiki/Ohm%27s_law").await.expect("encoded link");
    bare.assert_async().await;
    linked.assert_async().await;
  }
}
