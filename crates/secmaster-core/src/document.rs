//! Parsed EDGAR documents consumed by the extractor.
//!
//! These mirror the shapes of the SEC `companyfacts` and `submissions` JSON
//! endpoints closely enough to deserialise them directly; fields the
//! extractor does not read are ignored. The core never fetches them itself.

use std::{
  collections::{BTreeMap, HashMap},
  convert::Infallible,
  fmt,
  future::Future,
};

use chrono::NaiveDate;
use serde::{
  Deserialize, Deserializer, Serialize, Serializer,
  de::{MapAccess, Visitor},
  ser::SerializeMap,
};

use crate::entity::EntityId;

// ─── Company facts ───────────────────────────────────────────────────────────

/// The XBRL `companyfacts` document for one issuer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyFacts {
  #[serde(default, rename = "entityName")]
  pub entity_name: Option<String>,
  /// `namespace -> tag -> concept`, e.g. `us-gaap -> Revenues -> {...}`.
  /// Absent entirely for issuers that never filed XBRL.
  #[serde(default)]
  pub facts:       Option<BTreeMap<String, BTreeMap<String, ConceptFacts>>>,
}

impl CompanyFacts {
  pub fn concept(&self, namespace: &str, tag: &str) -> Option<&ConceptFacts> {
    self.facts.as_ref()?.get(namespace)?.get(tag)
  }
}

/// All reported observations for a single `(namespace, tag)` concept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptFacts {
  #[serde(default)]
  pub label: Option<String>,
  /// `unit -> observations`, e.g. `USD -> [...]`.
  #[serde(default)]
  pub units: Units,
}

/// Observation series keyed by unit, in the order the document lists them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Units(pub Vec<(String, Vec<Observation>)>);

impl Units {
  pub fn get(&self, unit: &str) -> Option<(&str, &[Observation])> {
    self
      .0
      .iter()
      .find(|(u, _)| u == unit)
      .map(|(u, points)| (u.as_str(), points.as_slice()))
  }

  /// The first unit listed in the document.
  pub fn first(&self) -> Option<(&str, &[Observation])> {
    self.0.first().map(|(u, points)| (u.as_str(), points.as_slice()))
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl Serialize for Units {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.0.len()))?;
    for (unit, points) in &self.0 {
      map.serialize_entry(unit, points)?;
    }
    map.end()
  }
}

impl<'de> Deserialize<'de> for Units {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct UnitsVisitor;

    impl<'de> Visitor<'de> for UnitsVisitor {
      type Value = Units;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of unit to observations")
      }

      fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Units, A::Error> {
        let mut series = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((unit, points)) = access.next_entry::<String, Vec<Observation>>()? {
          series.push((unit, points));
        }
        Ok(Units(series))
      }
    }

    deserializer.deserialize_map(UnitsVisitor)
  }
}

/// One dated, unit-tagged data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
  /// End of the reporting period.
  pub end:   NaiveDate,
  pub val:   f64,
  #[serde(default)]
  pub start: Option<NaiveDate>,
  /// Fiscal period marker: `FY`, `Q1`..`Q4`.
  #[serde(default)]
  pub fp:    Option<String>,
  #[serde(default)]
  pub fy:    Option<i32>,
  #[serde(default)]
  pub form:  Option<String>,
  #[serde(default)]
  pub filed: Option<NaiveDate>,
  #[serde(default)]
  pub accn:  Option<String>,
}

impl Observation {
  pub fn is_annual(&self) -> bool { self.fp.as_deref() == Some("FY") }
}

// ─── Submissions ─────────────────────────────────────────────────────────────

/// The `submissions` document: issuer profile plus recent filing history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submissions {
  #[serde(default)]
  pub name:            Option<String>,
  #[serde(default)]
  pub sic_description: Option<String>,
  #[serde(default)]
  pub addresses:       Addresses,
  #[serde(default)]
  pub filings:         FilingsIndex,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Addresses {
  #[serde(default)]
  pub business: Option<Address>,
  #[serde(default)]
  pub mailing:  Option<Address>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
  #[serde(default)]
  pub city:             Option<String>,
  #[serde(default, alias = "stateProvince")]
  pub state_or_country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilingsIndex {
  #[serde(default)]
  pub recent: RecentFilings,
}

/// EDGAR's columnar filing table: parallel arrays, one index per filing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFilings {
  #[serde(default)]
  pub accession_number: Vec<String>,
  #[serde(default, deserialize_with = "blank_dates")]
  pub filing_date:      Vec<Option<NaiveDate>>,
  #[serde(default, deserialize_with = "blank_dates")]
  pub report_date:      Vec<Option<NaiveDate>>,
  #[serde(default)]
  pub form:             Vec<String>,
  #[serde(default)]
  pub primary_document: Vec<String>,
}

impl RecentFilings {
  /// Zip the parallel arrays into rows. Rows are cut at the shortest of the
  /// required columns; missing dates become `None`.
  pub fn rows(&self) -> Vec<Filing> {
    let len = self
      .form
      .len()
      .min(self.accession_number.len())
      .min(self.primary_document.len());

    (0..len)
      .map(|i| Filing {
        form:             self.form[i].clone(),
        report_date:      self.report_date.get(i).copied().flatten(),
        filing_date:      self.filing_date.get(i).copied().flatten(),
        accession_number: self.accession_number[i].clone(),
        primary_document: self.primary_document[i].clone(),
      })
      .collect()
  }
}

/// One filing in an issuer's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filing {
  pub form:             String,
  pub report_date:      Option<NaiveDate>,
  pub filing_date:      Option<NaiveDate>,
  pub accession_number: String,
  pub primary_document: String,
}

/// EDGAR emits `""` for filings without a report date.
fn blank_dates<'de, D>(deserializer: D) -> Result<Vec<Option<NaiveDate>>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Vec<Option<String>> = Vec::deserialize(deserializer)?;
  Ok(
    raw
      .into_iter()
      .map(|s| s.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
      .collect(),
  )
}

// ─── Bundle ──────────────────────────────────────────────────────────────────

/// Everything fetched for one entity in one cycle. Either document may be
/// missing (e.g. a 404 from EDGAR).
#[derive(Debug, Clone, Default)]
pub struct EntityDocuments {
  pub facts:       Option<CompanyFacts>,
  pub submissions: Option<Submissions>,
}

/// Supplies per-entity documents to the reconciler. Implemented by the EDGAR
/// client; an in-memory map works for tests and offline imports.
pub trait DocumentSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch whatever documents exist for `id`. A document that does not exist
  /// upstream is `None`, not an error.
  fn documents(
    &self,
    id: EntityId,
  ) -> impl Future<Output = Result<EntityDocuments, Self::Error>> + Send + '_;
}

impl DocumentSource for HashMap<EntityId, EntityDocuments> {
  type Error = Infallible;

  async fn documents(&self, id: EntityId) -> Result<EntityDocuments, Infallible> {
    Ok(self.get(&id).cloned().unwrap_or_default())
  }
}
