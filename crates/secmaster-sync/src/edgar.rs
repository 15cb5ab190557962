//! Async HTTP client for SEC EDGAR.
//!
//! Fetches the listing feed (`company_tickers.json`) and, per entity, the
//! `submissions` and `companyfacts` documents. Every request carries the
//! configured `User-Agent`, is paced to stay under SEC's rate limit, and is
//! retried on transient failures. A 404 means the document does not exist.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secmaster_core::{
  document::{CompanyFacts, DocumentSource, EntityDocuments, Submissions},
  entity::EntityId,
  snapshot::{RawListing, Snapshot},
};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

use crate::retry::{RetryConfig, Transient, is_retryable_status, retry_async};

pub const TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
pub const DATA_BASE_URL: &str = "https://data.sec.gov";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("failed to build HTTP client: {0}")]
  Client(#[source] reqwest::Error),

  #[error("GET {url} failed: {source}")]
  Http {
    url:    String,
    #[source]
    source: reqwest::Error,
  },

  #[error("GET {url} returned {status}")]
  Status { url: String, status: StatusCode },

  #[error("failed to decode {url}: {source}")]
  Decode {
    url:    String,
    #[source]
    source: serde_json::Error,
  },
}

impl Transient for FetchError {
  fn is_transient(&self) -> bool {
    match self {
      FetchError::Http { source, .. } => {
        source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
      }
      FetchError::Status { status, .. } => is_retryable_status(status.as_u16()),
      FetchError::Client(_) | FetchError::Decode { .. } => false,
    }
  }
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Connection settings for EDGAR.
#[derive(Debug, Clone)]
pub struct EdgarConfig {
  pub user_agent:    String,
  /// Minimum gap between the start of two requests.
  pub request_delay: Duration,
  pub timeout:       Duration,
  pub retry:         RetryConfig,
  pub tickers_url:   String,
  pub data_base_url: String,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Paced, retrying EDGAR client.
///
/// Requests are serialised through an internal gate so the configured delay
/// holds even when the client is shared.
pub struct EdgarClient {
  client: Client,
  config: EdgarConfig,
  gate:   Mutex<Option<Instant>>,
}

impl EdgarClient {
  pub fn new(config: EdgarConfig) -> Result<Self, FetchError> {
    let client = Client::builder()
      .user_agent(config.user_agent.clone())
      .timeout(config.timeout)
      .build()
      .map_err(FetchError::Client)?;
    Ok(Self { client, config, gate: Mutex::new(None) })
  }

  pub fn submissions_url(&self, id: EntityId) -> String {
    format!(
      "{}/submissions/CIK{}.json",
      self.config.data_base_url.trim_end_matches('/'),
      id.padded()
    )
  }

  pub fn companyfacts_url(&self, id: EntityId) -> String {
    format!(
      "{}/api/xbrl/companyfacts/CIK{}.json",
      self.config.data_base_url.trim_end_matches('/'),
      id.padded()
    )
  }

  /// Fetch the listing feed and build this cycle's snapshot, stamped with
  /// the time the feed was read.
  pub async fn fetch_listings(&self) -> Result<Snapshot, FetchError> {
    let url = self.config.tickers_url.clone();
    let body = self
      .get_text(&url)
      .await?
      .ok_or_else(|| FetchError::Status { url: url.clone(), status: StatusCode::NOT_FOUND })?;
    parse_listings(&body, Utc::now()).map_err(|source| FetchError::Decode { url, source })
  }

  async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, FetchError> {
    let Some(body) = self.get_text(url).await? else {
      return Ok(None);
    };
    serde_json::from_str(&body)
      .map(Some)
      .map_err(|source| FetchError::Decode { url: url.to_owned(), source })
  }

  /// `Ok(None)` on 404.
  async fn get_text(&self, url: &str) -> Result<Option<String>, FetchError> {
    retry_async(&self.config.retry, url, || self.get_once(url)).await
  }

  async fn get_once(&self, url: &str) -> Result<Option<String>, FetchError> {
    self.pace().await;

    let http = |source| FetchError::Http { url: url.to_owned(), source };
    let resp = self.client.get(url).send().await.map_err(http)?;

    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
      debug!(url, "not found");
      return Ok(None);
    }
    if !status.is_success() {
      return Err(FetchError::Status { url: url.to_owned(), status });
    }
    resp.text().await.map(Some).map_err(http)
  }

  async fn pace(&self) {
    let mut last = self.gate.lock().await;
    if let Some(prev) = *last {
      let ready = prev + self.config.request_delay;
      if ready > Instant::now() {
        tokio::time::sleep_until(ready).await;
      }
    }
    *last = Some(Instant::now());
  }
}

impl DocumentSource for EdgarClient {
  type Error = FetchError;

  async fn documents(&self, id: EntityId) -> Result<EntityDocuments, FetchError> {
    let submissions: Option<Submissions> = self.get_json(&self.submissions_url(id)).await?;
    let facts = self.get_json(&self.companyfacts_url(id)).await;
    Ok(bundle(id, submissions, facts))
  }
}

/// Submissions are required. A failed `companyfacts` fetch drops only the
/// revenue figure; filings, industry and location still come from
/// submissions.
fn bundle(
  id: EntityId,
  submissions: Option<Submissions>,
  facts: Result<Option<CompanyFacts>, FetchError>,
) -> EntityDocuments {
  let facts = facts.unwrap_or_else(|err| {
    warn!(cik = %id, error = %err, "companyfacts unavailable; continuing without revenue");
    None
  });
  EntityDocuments { facts, submissions }
}

// ─── Listing feed ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TickerRow {
  cik_str: u64,
  #[serde(default)]
  ticker:  Option<String>,
  #[serde(default)]
  title:   Option<String>,
}

/// Parse `company_tickers.json` (`{"0": {...}, "1": {...}}`) into a snapshot.
///
/// Rows are taken in numeric key order; when a CIK appears more than once
/// (multiple share classes) the first row wins. Missing tickers or titles
/// are kept so the reconciler can report them as malformed.
pub fn parse_listings(body: &str, observed_at: DateTime<Utc>) -> serde_json::Result<Snapshot> {
  let rows: HashMap<String, TickerRow> = serde_json::from_str(body)?;

  let mut ordered: Vec<(u64, TickerRow)> = rows
    .into_iter()
    .map(|(key, row)| (key.parse().unwrap_or(u64::MAX), row))
    .collect();
  ordered.sort_by_key(|(key, _)| *key);

  let mut snapshot = Snapshot::new(observed_at);
  let mut duplicates = 0usize;
  for (_, row) in ordered {
    let inserted = snapshot.insert(RawListing {
      entity_id:    EntityId(row.cik_str),
      ticker:       row.ticker,
      display_name: row.title,
    });
    if !inserted {
      duplicates += 1;
    }
  }

  debug!(listings = snapshot.len(), duplicates, "parsed listing feed");
  Ok(snapshot)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> EdgarClient {
    EdgarClient::new(EdgarConfig {
      user_agent:    "secmaster test@example.com".into(),
      request_delay: Duration::ZERO,
      timeout:       Duration::from_secs(1),
      retry:         RetryConfig::default(),
      tickers_url:   TICKERS_URL.into(),
      data_base_url: format!("{DATA_BASE_URL}/"),
    })
    .unwrap()
  }

  #[test]
  fn failed_facts_fetch_keeps_submissions() {
    let submissions: Submissions =
      serde_json::from_str(r#"{"sicDescription": "Retail-Variety Stores"}"#).unwrap();
    let decode = serde_json::from_str::<CompanyFacts>("not json").unwrap_err();
    let err = FetchError::Decode { url: "companyfacts".into(), source: decode };

    let docs = bundle(EntityId(104169), Some(submissions), Err(err));
    assert!(docs.facts.is_none());
    assert_eq!(
      docs.submissions.unwrap().sic_description.as_deref(),
      Some("Retail-Variety Stores")
    );
  }

  #[test]
  fn missing_facts_document_is_not_an_error() {
    let docs = bundle(EntityId(1), None, Ok(None));
    assert!(docs.facts.is_none() && docs.submissions.is_none());
  }

  #[test]
  fn document_urls_use_padded_cik() {
    let c = client();
    assert_eq!(
      c.submissions_url(EntityId(320193)),
      "https://data.sec.gov/submissions/CIK0000320193.json"
    );
    assert_eq!(
      c.companyfacts_url(EntityId(320193)),
      "https://data.sec.gov/api/xbrl/companyfacts/CIK0000320193.json"
    );
  }

  #[test]
  fn listing_feed_keeps_first_row_per_cik_in_numeric_key_order() {
    let body = r#"{
      "10": {"cik_str": 1067983, "ticker": "BRK-A", "title": "BERKSHIRE HATHAWAY INC"},
      "2":  {"cik_str": 1067983, "ticker": "BRK-B", "title": "BERKSHIRE HATHAWAY INC"},
      "0":  {"cik_str": 320193,  "ticker": "AAPL",  "title": "Apple Inc."},
      "1":  {"cik_str": 789019,  "ticker": "MSFT",  "title": "MICROSOFT CORP"}
    }"#;

    let snap = parse_listings(body, Utc::now()).unwrap();
    assert_eq!(snap.len(), 3);
    assert_eq!(snap.get(EntityId(1067983)).unwrap().ticker.as_deref(), Some("BRK-B"));
  }

  #[test]
  fn listing_feed_keeps_rows_without_ticker() {
    let body = r#"{"0": {"cik_str": 42, "ticker": null, "title": "Shell Co"}}"#;
    let snap = parse_listings(body, Utc::now()).unwrap();
    let raw = snap.get(EntityId(42)).unwrap();
    assert!(raw.ticker.is_none());
    assert!(raw.validate().is_err());
  }

  #[test]
  fn server_errors_and_throttling_are_transient() {
    let status = |code: u16| FetchError::Status {
      url:    "https://data.sec.gov/x".into(),
      status: StatusCode::from_u16(code).unwrap(),
    };
    assert!(status(503).is_transient());
    assert!(status(429).is_transient());
    assert!(!status(403).is_transient());
  }
}
