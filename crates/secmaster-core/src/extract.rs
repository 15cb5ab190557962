//! Derived-fact extraction waterfalls.
//!
//! Each extractor picks exactly one value (or explicit absence) from a
//! semi-structured document. Candidates are tried in priority order and the
//! first one that yields a value wins; results are never merged across
//! candidates.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  document::{CompanyFacts, EntityDocuments, Filing, Observation, Submissions},
  entity::EntityId,
};

/// Preferred reporting currency when a concept is reported in several units.
pub const CANONICAL_UNIT: &str = "USD";

// ─── Concepts and waterfalls ─────────────────────────────────────────────────

/// An XBRL `(namespace, tag)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Concept {
  pub namespace: String,
  pub tag:       String,
}

impl Concept {
  pub fn new(namespace: impl Into<String>, tag: impl Into<String>) -> Self {
    Self { namespace: namespace.into(), tag: tag.into() }
  }
}

impl fmt::Display for Concept {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.namespace, self.tag)
  }
}

impl FromStr for Concept {
  type Err = Error;

  /// Parses `namespace:tag`, e.g. `us-gaap:Revenues`.
  fn from_str(s: &str) -> Result<Self> {
    match s.trim().split_once(':') {
      Some((ns, tag)) if !ns.is_empty() && !tag.is_empty() => Ok(Self::new(ns, tag)),
      _ => Err(Error::InvalidConcept(s.to_owned())),
    }
  }
}

/// An ordered priority list of concepts, most authoritative first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waterfall(pub Vec<Concept>);

impl Waterfall {
  /// The default revenue waterfall: ASC 606 revenue, then legacy net sales,
  /// then generic revenues, then bank interest income, then IFRS revenue for
  /// foreign filers.
  pub fn revenue() -> Self {
    Self(vec![
      Concept::new("us-gaap", "RevenueFromContractWithCustomerExcludingAssessedTax"),
      Concept::new("us-gaap", "SalesRevenueNet"),
      Concept::new("us-gaap", "Revenues"),
      Concept::new("us-gaap", "SalesRevenueGoodsNet"),
      Concept::new("us-gaap", "InterestAndDividendIncomeOperating"),
      Concept::new("us-gaap", "InterestIncomeNet"),
      Concept::new("ifrs-full", "RevenueFromContractsWithCustomers"),
    ])
  }

  /// Build a waterfall from `namespace:tag` strings, e.g. from configuration.
  pub fn parse<I, S>(entries: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    entries
      .into_iter()
      .map(|e| e.as_ref().parse())
      .collect::<Result<Vec<_>>>()
      .map(Self)
  }

  pub fn concepts(&self) -> &[Concept] { &self.0 }
}

impl Default for Waterfall {
  fn default() -> Self { Self::revenue() }
}

/// The single value chosen by [`select`], with enough provenance to explain
/// where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedValue {
  pub value:         f64,
  pub unit:          String,
  pub period_end:    NaiveDate,
  pub fiscal_period: Option<String>,
  pub concept:       Concept,
}

// ─── Value selection ─────────────────────────────────────────────────────────

/// Walk `waterfall` over `document` and return the first usable value.
///
/// Within a concept: prefer [`CANONICAL_UNIT`], else the first unit the document
/// lists; restrict to annual (`fp == "FY"`) observations when any exist; take
/// the latest period end. `None` means no candidate produced a value, which is
/// distinct from a reported zero.
pub fn select(document: &CompanyFacts, waterfall: &Waterfall) -> Option<SelectedValue> {
  waterfall
    .concepts()
    .iter()
    .find_map(|concept| select_concept(document, concept))
}

fn select_concept(document: &CompanyFacts, concept: &Concept) -> Option<SelectedValue> {
  let facts = document.concept(&concept.namespace, &concept.tag)?;

  let (unit, points) = facts
    .units
    .get(CANONICAL_UNIT)
    .or_else(|| facts.units.first())?;

  let annual: Vec<&Observation> = points.iter().filter(|p| p.is_annual()).collect();
  let pool: Vec<&Observation> =
    if annual.is_empty() { points.iter().collect() } else { annual };

  // `max_by_key` keeps the last of equal keys, so later entries win ties.
  let latest = pool.into_iter().max_by_key(|p| (p.end, p.filed))?;

  Some(SelectedValue {
    value:         latest.val,
    unit:          unit.to_owned(),
    period_end:    latest.end,
    fiscal_period: latest.fp.clone(),
    concept:       concept.clone(),
  })
}

// ─── Filing selection ────────────────────────────────────────────────────────

/// Document-type classes for periodic reports.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FormClass {
  /// 10-K and its foreign-filer equivalents, including amendments.
  Annual,
  /// 10-Q and 6-K interim reports, including amendments.
  Quarterly,
}

impl FormClass {
  pub fn forms(self) -> &'static [&'static str] {
    match self {
      Self::Annual => &["10-K", "10-K/A", "10-KT", "20-F", "20-F/A", "40-F", "40-F/A"],
      Self::Quarterly => &["10-Q", "10-Q/A", "6-K", "6-K/A"],
    }
  }

  pub fn matches(self, form: &str) -> bool { self.forms().contains(&form.trim()) }
}

/// A resolved pointer to one filing document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRef {
  pub form:             String,
  pub report_date:      Option<NaiveDate>,
  pub filing_date:      Option<NaiveDate>,
  pub accession_number: String,
  pub primary_document: String,
  pub url:              String,
}

impl FilingRef {
  fn from_filing(entity_id: EntityId, filing: &Filing) -> Self {
    Self {
      form:             filing.form.clone(),
      report_date:      filing.report_date,
      filing_date:      filing.filing_date,
      accession_number: filing.accession_number.clone(),
      primary_document: filing.primary_document.clone(),
      url:              archive_url(entity_id, filing),
    }
  }
}

/// `https://www.sec.gov/Archives/edgar/data/{cik}/{accession}/{document}`,
/// with the accession number's dashes removed and the CIK unpadded.
pub fn archive_url(entity_id: EntityId, filing: &Filing) -> String {
  format!(
    "https://www.sec.gov/Archives/edgar/data/{}/{}/{}",
    entity_id.0,
    filing.accession_number.replace('-', ""),
    filing.primary_document,
  )
}

/// The latest filing of each periodic class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicFilings {
  pub annual:    Option<FilingRef>,
  pub quarterly: Option<FilingRef>,
}

/// Pick the most recent annual and quarterly filing independently.
///
/// Filings are ordered by report date descending; a missing report date falls
/// back to the filing date, and entries with neither sort last. The sort is
/// stable, so EDGAR's own newest-first order breaks ties.
pub fn latest_filings(entity_id: EntityId, filings: &[Filing]) -> PeriodicFilings {
  let mut ordered: Vec<&Filing> = filings.iter().collect();
  ordered.sort_by(|a, b| {
    let ka = a.report_date.or(a.filing_date);
    let kb = b.report_date.or(b.filing_date);
    kb.cmp(&ka)
  });

  let mut found = PeriodicFilings::default();
  for filing in ordered {
    if found.annual.is_none() && FormClass::Annual.matches(&filing.form) {
      found.annual = Some(FilingRef::from_filing(entity_id, filing));
    } else if found.quarterly.is_none() && FormClass::Quarterly.matches(&filing.form) {
      found.quarterly = Some(FilingRef::from_filing(entity_id, filing));
    }
    if found.annual.is_some() && found.quarterly.is_some() {
      break;
    }
  }
  found
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// SIC industry description, if reported.
pub fn industry(submissions: &Submissions) -> Option<String> {
  non_blank(submissions.sic_description.as_deref())
}

/// `"City, ST"` from the business address; either half may be missing.
pub fn location(submissions: &Submissions) -> Option<String> {
  let business = submissions.addresses.business.as_ref()?;
  let parts: Vec<String> = [business.city.as_deref(), business.state_or_country.as_deref()]
    .into_iter()
    .filter_map(non_blank)
    .collect();
  if parts.is_empty() { None } else { Some(parts.join(", ")) }
}

fn non_blank(s: Option<&str>) -> Option<String> {
  s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

// ─── Derived facts ───────────────────────────────────────────────────────────

/// Per-entity facts recomputed every cycle. Not versioned; each refresh
/// replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFacts {
  pub revenue:          Option<SelectedValue>,
  pub annual_report:    Option<FilingRef>,
  pub quarterly_report: Option<FilingRef>,
  pub industry:         Option<String>,
  pub location:         Option<String>,
  pub refreshed_at:     DateTime<Utc>,
}

impl DerivedFacts {
  /// Run every extractor over whatever documents were fetched.
  pub fn extract(
    entity_id: EntityId,
    documents: &EntityDocuments,
    waterfall: &Waterfall,
    refreshed_at: DateTime<Utc>,
  ) -> Self {
    let revenue = documents.facts.as_ref().and_then(|f| select(f, waterfall));
    let (filings, industry, location) = match &documents.submissions {
      Some(subs) => (
        latest_filings(entity_id, &subs.filings.recent.rows()),
        industry(subs),
        location(subs),
      ),
      None => (PeriodicFilings::default(), None, None),
    };

    Self {
      revenue,
      annual_report: filings.annual,
      quarterly_report: filings.quarterly,
      industry,
      location,
      refreshed_at,
    }
  }
}
