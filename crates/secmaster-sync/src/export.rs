//! CSV report of the current state.
//!
//! One row per entity, joined with its derived facts, ordered by revenue
//! descending. Entities without a revenue figure sort last, in CIK order.

use std::{cmp::Ordering, io, path::Path};

use secmaster_core::{
  entity::EntityState,
  extract::FilingRef,
  labels::RebrandLabels,
  projection::EntityView,
};
use serde::Serialize;

/// A single CSV row. Field order is column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
  #[serde(rename = "Ticker")]
  pub ticker:             String,
  #[serde(rename = "CIK")]
  pub cik:                String,
  #[serde(rename = "Company")]
  pub company:            String,
  #[serde(rename = "Status")]
  pub status:             &'static str,
  #[serde(rename = "Scenario")]
  pub scenario:           String,
  #[serde(rename = "Since")]
  pub since:              String,
  #[serde(rename = "Location")]
  pub location:           Option<String>,
  #[serde(rename = "Industry")]
  pub industry:           Option<String>,
  /// Whole units of the reported currency.
  #[serde(rename = "Revenue")]
  pub revenue:            Option<String>,
  #[serde(rename = "Revenue_Period_End")]
  pub revenue_period_end: Option<String>,
  #[serde(rename = "10K_Date")]
  pub annual_date:        Option<String>,
  #[serde(rename = "10K_Link")]
  pub annual_link:        Option<String>,
  #[serde(rename = "10Q_Date")]
  pub quarterly_date:     Option<String>,
  #[serde(rename = "10Q_Link")]
  pub quarterly_link:     Option<String>,
}

impl ReportRow {
  pub fn from_view(view: &EntityView, labels: &RebrandLabels) -> Self {
    let derived = view.derived.as_ref();
    let revenue = derived.and_then(|d| d.revenue.as_ref());
    let annual = derived.and_then(|d| d.annual_report.as_ref());
    let quarterly = derived.and_then(|d| d.quarterly_report.as_ref());

    Self {
      ticker:             view.ticker.clone(),
      cik:                view.entity_id.padded(),
      company:            view.display_name.clone(),
      status:             status(view.state),
      scenario:           labels.label(&view.last_scenario).to_owned(),
      since:              view.since.format("%Y-%m-%d").to_string(),
      location:           derived.and_then(|d| d.location.clone()),
      industry:           derived.and_then(|d| d.industry.clone()),
      revenue:            revenue.map(|r| format!("{:.0}", r.value)),
      revenue_period_end: revenue.map(|r| r.period_end.to_string()),
      annual_date:        annual.and_then(filing_date),
      annual_link:        annual.map(|f| f.url.clone()),
      quarterly_date:     quarterly.and_then(filing_date),
      quarterly_link:     quarterly.map(|f| f.url.clone()),
    }
  }
}

fn status(state: EntityState) -> &'static str {
  match state {
    EntityState::Active => "ACTIVE",
    EntityState::Inactive => "INACTIVE",
    EntityState::Unseen => "UNSEEN",
  }
}

/// The report date of a filing, else its filing date.
fn filing_date(filing: &FilingRef) -> Option<String> {
  filing.report_date.or(filing.filing_date).map(|d| d.to_string())
}

/// Revenue descending; entities without revenue last. The sort is stable, so
/// ties keep the incoming (CIK) order.
fn by_revenue(a: &&EntityView, b: &&EntityView) -> Ordering {
  match (a.revenue(), b.revenue()) {
    (Some(x), Some(y)) => y.total_cmp(&x),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}

/// Build report rows from current views.
pub fn rows(views: &[EntityView], labels: &RebrandLabels) -> Vec<ReportRow> {
  let mut ordered: Vec<&EntityView> = views.iter().collect();
  ordered.sort_by(by_revenue);
  ordered.into_iter().map(|v| ReportRow::from_view(v, labels)).collect()
}

pub fn write_csv<W: io::Write>(rows: &[ReportRow], writer: W) -> csv::Result<()> {
  let mut wtr = csv::Writer::from_writer(writer);
  for row in rows {
    wtr.serialize(row)?;
  }
  wtr.flush()?;
  Ok(())
}

pub fn write_csv_file(rows: &[ReportRow], path: &Path) -> csv::Result<()> {
  let mut wtr = csv::Writer::from_path(path)?;
  for row in rows {
    wtr.serialize(row)?;
  }
  wtr.flush()?;
  Ok(())
}
