//! Runtime configuration for the `secmaster` binary.
//!
//! Read from an optional TOML file layered with `SECMASTER_*` environment
//! variables. Every key has a default, so an empty config is valid apart
//! from the User-Agent, which SEC requires to carry a contact address.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use secmaster_core::{
  extract::Waterfall,
  labels::{RebrandLabel, RebrandLabels},
};
use serde::Deserialize;

use crate::{
  edgar::{DATA_BASE_URL, EdgarConfig, TICKERS_URL},
  retry::RetryConfig,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub store_path:        PathBuf,
  pub user_agent:        String,
  pub request_delay_ms:  u64,
  pub timeout_secs:      u64,
  pub retry:             RetryConfig,
  pub csv_output:        PathBuf,
  /// `namespace:Tag` entries in priority order. Empty means the built-in
  /// revenue waterfall.
  pub revenue_waterfall: Vec<String>,
  pub rebrands:          Vec<RebrandLabel>,
  pub host:              String,
  pub port:              u16,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      store_path:        PathBuf::from("secmaster.db"),
      user_agent:        String::new(),
      request_delay_ms:  120,
      timeout_secs:      10,
      retry:             RetryConfig::default(),
      csv_output:        PathBuf::from("tickers_preview.csv"),
      revenue_waterfall: Vec::new(),
      rebrands:          Vec::new(),
      host:              "127.0.0.1".to_string(),
      port:              8080,
    }
  }
}

impl SyncConfig {
  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn csv_output(&self) -> PathBuf { expand_tilde(&self.csv_output) }

  pub fn waterfall(&self) -> secmaster_core::Result<Waterfall> {
    if self.revenue_waterfall.is_empty() {
      Ok(Waterfall::revenue())
    } else {
      Waterfall::parse(&self.revenue_waterfall)
    }
  }

  pub fn rebrand_labels(&self) -> RebrandLabels { RebrandLabels::new(self.rebrands.clone()) }

  pub fn edgar(&self) -> EdgarConfig {
    EdgarConfig {
      user_agent:    self.user_agent.clone(),
      request_delay: Duration::from_millis(self.request_delay_ms),
      timeout:       Duration::from_secs(self.timeout_secs),
      retry:         self.retry.clone(),
      tickers_url:   TICKERS_URL.to_string(),
      data_base_url: DATA_BASE_URL.to_string(),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
