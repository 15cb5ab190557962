//! Presentation labels for scenarios.
//!
//! Some ticker changes are well-known corporate rebrands that reports prefer
//! to call out by name. That is purely cosmetic: the state machine always
//! emits [`Scenario::TickerChange`], and this mapping only changes how the
//! event is rendered.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::Scenario;

/// One configured `(old ticker, new ticker) -> label` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebrandLabel {
  pub from:  String,
  pub to:    String,
  pub label: String,
}

/// Lookup table of rebrand labels keyed by exact ticker pair.
#[derive(Debug, Clone, Default)]
pub struct RebrandLabels {
  by_pair: HashMap<(String, String), String>,
}

impl RebrandLabels {
  pub fn new(entries: impl IntoIterator<Item = RebrandLabel>) -> Self {
    let by_pair = entries
      .into_iter()
      .map(|e| ((e.from.to_uppercase(), e.to.to_uppercase()), e.label))
      .collect();
    Self { by_pair }
  }

  pub fn is_empty(&self) -> bool { self.by_pair.is_empty() }

  /// The label to display for `scenario`: the configured rebrand label for a
  /// matching ticker change, otherwise the canonical upper-case label.
  pub fn label<'a>(&'a self, scenario: &Scenario) -> &'a str {
    if let Scenario::TickerChange { old, new } = scenario
      && let Some(label) = self.by_pair.get(&(old.to_uppercase(), new.to_uppercase()))
    {
      return label;
    }
    scenario.label()
  }
}
