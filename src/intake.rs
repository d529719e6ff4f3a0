//! Case intake: turns a submitted form into a classified, located report.
//!
//! Malformed optional fields never reject a submission. They are dropped
//! from the report and listed as warnings so the reporter can correct them.

use std::path::Path;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::classification::classify;
use crate::db::CaseStore;
use crate::geometry::{resolve, PolygonSet};
use crate::models::enums::{Classification, LabResult, ReporterType, Sex};
use crate::models::{CaseReport, ClassificationRules, GeoPoint, Location, SymptomSet};
use crate::outcome::{FallbackReason, Outcome};

/// Oldest age the form accepts.
pub const MAX_AGE: u32 = 120;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Form is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Case rejected: {0}")]
    Rejected(String),
}

/// Raw case form, as typed by the reporter. Free-text fields are kept as
/// text until intake parses them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseForm {
    pub name: String,
    pub sex: Sex,
    pub age: String,
    pub reporter: ReporterType,
    pub region: String,
    pub district: String,
    pub community: String,
    pub town: String,
    pub landmark: String,
    /// "lat,lon" in decimal degrees
    pub coordinates: String,
    pub onset_date: Option<NaiveDate>,
    pub lab_result: LabResult,
    pub fever: bool,
    pub cough: bool,
    pub rash: bool,
    pub other_symptoms: String,
    pub epi_link: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntakeWarning {
    InvalidCoordinates { input: String, reason: String },
    InvalidAge { input: String },
    /// Coordinates fell outside every loaded boundary; manual location kept.
    NoBoundaryMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeResult {
    pub report: CaseReport,
    pub warnings: Vec<IntakeWarning>,
}

/// Result of persisting a form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub case_id: String,
    pub classification: Classification,
    pub warnings: Vec<IntakeWarning>,
    /// Set when the case is buffered in memory rather than stored.
    pub fallback: Option<FallbackReason>,
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Short case id: the first 8 characters of a v4 UUID.
pub fn new_case_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

impl CaseForm {
    pub fn from_json_file(path: &Path) -> Result<Self, IntakeError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Checkbox symptoms followed by the free-text ones, `;`-joined.
    pub fn symptom_text(&self) -> String {
        [
            (self.fever, "fever"),
            (self.cough, "cough"),
            (self.rash, "rash"),
            (true, self.other_symptoms.trim()),
        ]
        .into_iter()
        .filter(|(checked, text)| *checked && !text.is_empty())
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join(";")
    }

    fn location(&self) -> Location {
        Location {
            region: non_blank(&self.region),
            district: non_blank(&self.district),
            community: non_blank(&self.community),
            town: non_blank(&self.town),
            landmark: non_blank(&self.landmark),
        }
    }
}

fn parse_age(text: &str, warnings: &mut Vec<IntakeWarning>) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.parse::<u32>() {
        Ok(age) if age <= MAX_AGE => Some(age),
        _ => {
            warnings.push(IntakeWarning::InvalidAge { input: text.to_string() });
            None
        }
    }
}

fn parse_coordinates(text: &str, warnings: &mut Vec<IntakeWarning>) -> Option<GeoPoint> {
    if text.trim().is_empty() {
        return None;
    }
    match text.parse::<GeoPoint>() {
        Ok(point) => Some(point),
        Err(e) => {
            warnings.push(IntakeWarning::InvalidCoordinates {
                input: text.trim().to_string(),
                reason: e.to_string(),
            });
            None
        }
    }
}

/// Build a report from a form at a given time. Resolved boundary names
/// replace the manual location fields they cover.
pub fn build_case_at(
    form: &CaseForm,
    rules: Option<&ClassificationRules>,
    polygons: Option<&PolygonSet>,
    now: NaiveDateTime,
) -> IntakeResult {
    let mut warnings = Vec::new();
    let age = parse_age(&form.age, &mut warnings);
    let coordinates = parse_coordinates(&form.coordinates, &mut warnings);

    let mut location = form.location();
    if let (Some(point), Some(polygons)) = (coordinates, polygons) {
        let assigned = resolve(point.latitude, point.longitude, polygons);
        if assigned.is_empty() {
            warnings.push(IntakeWarning::NoBoundaryMatch);
        } else {
            location.district = assigned.district.or(location.district);
            location.region = assigned.region.or(location.region);
            location.community = assigned.community.or(location.community);
        }
    }

    let mut report = CaseReport {
        case_id: new_case_id(),
        name: non_blank(&form.name),
        sex: form.sex,
        age,
        reporter: form.reporter,
        location,
        coordinates,
        onset_date: form.onset_date,
        lab_result: form.lab_result,
        symptoms: SymptomSet::parse(&form.symptom_text()),
        epi_link: form.epi_link,
        classification: Classification::Suspected,
        recorded_at: now,
    };
    report.classification = classify(&report, rules);

    IntakeResult { report, warnings }
}

pub fn build_case(
    form: &CaseForm,
    rules: Option<&ClassificationRules>,
    polygons: Option<&PolygonSet>,
) -> IntakeResult {
    build_case_at(form, rules, polygons, Local::now().naive_local())
}

/// Build and persist a form. Storage trouble buffers the case and is
/// reported through `Submission::fallback`; a rejected record is an error.
pub fn submit_form(
    store: &mut CaseStore,
    form: &CaseForm,
    rules: Option<&ClassificationRules>,
    polygons: Option<&PolygonSet>,
) -> Result<Submission, IntakeError> {
    let IntakeResult { report, warnings } = build_case(form, rules, polygons);
    let classification = report.classification;
    if !warnings.is_empty() {
        tracing::info!(case_id = %report.case_id, warnings = warnings.len(), "Case accepted with warnings");
    }

    match store.submit(report) {
        Outcome::Success { value } => Ok(Submission {
            case_id: value,
            classification,
            warnings,
            fallback: None,
        }),
        Outcome::RecoverableDefault { value, reason } => Ok(Submission {
            case_id: value,
            classification,
            warnings,
            fallback: Some(reason),
        }),
        Outcome::Failure { reason } => Err(IntakeError::Rejected(reason)),
    }
}
