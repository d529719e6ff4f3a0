//! District-level outbreak risk scoring.
//!
//! Recent cases are aggregated per district and either scored by a trained
//! model or, without one, normalized against the busiest district.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::export::csv_field;
use crate::models::CaseReport;
use crate::temporal::onset_in_window;

/// Days of onset counted into `cases_7d`.
pub const SCORE_WINDOW_DAYS: u32 = 7;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model expects {expected} features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },

    #[error("Population table line {line}: {reason}")]
    Population { line: usize, reason: String },
}

/// A binary classifier giving the probability that a district is high risk.
pub trait RiskModel {
    fn predict_proba(&self, features: &[f64]) -> Result<f64, RiskError>;
}

/// Logistic regression over the district features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRiskModel {
    pub intercept: f64,
    pub weights: Vec<f64>,
}

impl LinearRiskModel {
    pub fn from_json_file(path: &Path) -> Result<Self, RiskError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl RiskModel for LinearRiskModel {
    fn predict_proba(&self, features: &[f64]) -> Result<f64, RiskError> {
        if features.len() != self.weights.len() {
            return Err(RiskError::FeatureMismatch {
                expected: self.weights.len(),
                got: features.len(),
            });
        }
        let z = self.intercept
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

/// District name to head count.
pub type PopulationTable = BTreeMap<String, u64>;

/// Read a `district,population` CSV with a header row. Column order is
/// taken from the header; other columns are ignored.
pub fn load_population_csv<R: BufRead>(reader: R) -> Result<PopulationTable, RiskError> {
    let mut lines = reader.lines().enumerate();
    let header = match lines.next() {
        Some((_, line)) => line?,
        None => return Ok(PopulationTable::new()),
    };
    let columns: Vec<String> = header
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_ascii_lowercase())
        .collect();
    let find = |name: &str| {
        columns.iter().position(|c| c == name).ok_or_else(|| RiskError::Population {
            line: 1,
            reason: format!("missing column {name:?}"),
        })
    };
    let district_col = find("district")?;
    let population_col = find("population")?;

    let mut table = PopulationTable::new();
    for (index, line) in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(|f| f.trim().trim_matches('"')).collect();
        let field = |col: usize| fields.get(col).copied().unwrap_or_default();
        let district = field(district_col);
        let population = field(population_col);
        if district.is_empty() || population.is_empty() {
            continue;
        }
        let population: u64 = population
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p >= 0.0)
            .map(|p| p.round() as u64)
            .ok_or_else(|| RiskError::Population {
                line: index + 1,
                reason: format!("invalid population {population:?}"),
            })?;
        table.insert(district.to_string(), population);
    }
    Ok(table)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictAggregate {
    pub district: String,
    pub cases_7d: usize,
    pub population: Option<u64>,
    pub per_1000: f64,
}

impl DistrictAggregate {
    /// Model input; population is present only when a table was supplied.
    pub fn features(&self, with_population: bool) -> Vec<f64> {
        let mut features = vec![self.cases_7d as f64];
        if with_population {
            features.push(self.population.unwrap_or(0) as f64);
        }
        features.push(self.per_1000);
        features
    }
}

/// Cases with onset in the last week, per district, sorted by district.
pub fn aggregate_recent(
    cases: &[CaseReport],
    populations: Option<&PopulationTable>,
    now: NaiveDateTime,
) -> Vec<DistrictAggregate> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for case in cases {
        let (Some(district), Some(onset)) = (case.location.district.as_deref(), case.onset_date) else {
            continue;
        };
        if onset_in_window(onset, now, SCORE_WINDOW_DAYS) {
            *counts.entry(district).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .map(|(district, cases_7d)| {
            let population = populations
                .and_then(|t| t.get(district))
                .copied()
                .filter(|p| *p > 0);
            let per_1000 = match population {
                Some(p) => cases_7d as f64 / (p as f64 / 1000.0),
                None => cases_7d as f64,
            };
            DistrictAggregate {
                district: district.to_string(),
                cases_7d,
                population,
                per_1000,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskScore {
    pub district: String,
    pub date: NaiveDate,
    pub score: f64,
}

/// Score every district with recent cases. Without a model the score is
/// `per_1000` relative to the highest district.
pub fn score_districts(
    cases: &[CaseReport],
    populations: Option<&PopulationTable>,
    model: Option<&dyn RiskModel>,
    now: NaiveDateTime,
) -> Result<Vec<RiskScore>, RiskError> {
    let aggregates = aggregate_recent(cases, populations, now);
    let date = now.date();

    let scores: Vec<f64> = match model {
        Some(model) => aggregates
            .iter()
            .map(|a| model.predict_proba(&a.features(populations.is_some())))
            .collect::<Result<_, _>>()?,
        None => {
            let max = aggregates.iter().map(|a| a.per_1000).fold(0.0, f64::max);
            let divisor = if max > 0.0 { max } else { 1.0 };
            aggregates.iter().map(|a| a.per_1000 / divisor).collect()
        }
    };

    tracing::info!(
        districts = aggregates.len(),
        model = model.is_some(),
        "District risk scored"
    );

    Ok(aggregates
        .into_iter()
        .zip(scores)
        .map(|(a, score)| RiskScore {
            district: a.district,
            date,
            score,
        })
        .collect())
}

/// Write `district,date,score` rows with a header.
pub fn write_scores_csv<W: Write>(mut out: W, scores: &[RiskScore]) -> std::io::Result<()> {
    writeln!(out, "district,date,score")?;
    for s in scores {
        writeln!(
            out,
            "{},{},{}",
            csv_field(&s.district),
            s.date.format("%Y-%m-%d"),
            s.score
        )?;
    }
    out.flush()
}
