use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::enums::{Classification, LabResult, ReporterType, Sex};

/// Current field-set version of `CaseReport`. Version 1 is the legacy
/// flat row (`lab_positive` flag, `coords` text) handled by `models::legacy`.
pub const CASE_SCHEMA_VERSION: u32 = 2;

/// One surveillance event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case_id: String,
    pub name: Option<String>,
    pub sex: Sex,
    pub age: Option<u32>,
    pub reporter: ReporterType,
    pub location: Location,
    pub coordinates: Option<GeoPoint>,
    pub onset_date: Option<NaiveDate>,
    pub lab_result: LabResult,
    pub symptoms: SymptomSet,
    pub epi_link: bool,
    pub classification: Classification,
    pub recorded_at: NaiveDateTime,
}

/// Manually entered administrative location. Every level is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub region: Option<String>,
    pub district: Option<String>,
    pub community: Option<String>,
    pub town: Option<String>,
    pub landmark: Option<String>,
}

/// WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("Expected \"lat,lon\", got {0:?}")]
    Format(String),

    #[error("Not a number: {0:?}")]
    NotANumber(String),

    #[error("Out of range: lat {latitude}, lon {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::OutOfRange { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }
}

impl FromStr for GeoPoint {
    type Err = CoordinateError;

    /// Parses the "lat,lon" text the case form and legacy rows carry.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');
        let (lat, lon) = match (parts.next(), parts.next(), parts.next()) {
            (Some(lat), Some(lon), None) => (lat.trim(), lon.trim()),
            _ => return Err(CoordinateError::Format(s.into())),
        };
        let latitude: f64 = lat
            .parse()
            .map_err(|_| CoordinateError::NotANumber(lat.into()))?;
        let longitude: f64 = lon
            .parse()
            .map_err(|_| CoordinateError::NotANumber(lon.into()))?;
        Self::new(latitude, longitude)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Canonical symptom tokens: trimmed, lower-cased, de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymptomSet(BTreeSet<String>);

impl SymptomSet {
    /// Splits free text on `,` or `;` into canonical tokens.
    pub fn parse(text: &str) -> Self {
        Self(
            text.split([',', ';'])
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tokens
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(&token.trim().to_lowercase())
    }

    /// True when every required token is present. Callers guard the
    /// empty-requirement case themselves.
    pub fn contains_all<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|s| self.contains(s.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Storage form: tokens joined by `;`.
    pub fn to_storage_string(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(";")
    }
}

impl CaseReport {
    pub fn is_located(&self) -> bool {
        self.coordinates.is_some()
    }
}
