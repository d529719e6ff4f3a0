//! Administrative boundaries: loading, datum normalization and
//! point-in-polygon assignment.

pub mod loader;
pub mod resolver;

pub use loader::*;
pub use resolver::*;

use std::collections::BTreeMap;

use geo::MultiPolygon;
use thiserror::Error;

use crate::outcome::{FallbackReason, Outcome};

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedDatum(String),

    #[error("Archive contains no .geojson or .json member")]
    NoBoundaryFile,

    #[error("Unsupported boundary file: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid geometry in feature {feature}: {reason}")]
    InvalidGeometry { feature: usize, reason: String },
}

/// How the set's coordinates came to be WGS84 longitude/latitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatumNormalization {
    /// No datum was declared; coordinates are taken as-is.
    AssumedGeographic,
    /// The source declared a geographic datum.
    DeclaredGeographic,
    /// Coordinates were converted from spherical Mercator.
    Reprojected,
}

/// One named administrative polygon.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub geometry: MultiPolygon<f64>,
    pub attributes: BTreeMap<String, String>,
}

impl Boundary {
    pub fn new(geometry: MultiPolygon<f64>) -> Self {
        Self {
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Value of the first candidate attribute present on the boundary,
    /// blank or not. Later spellings are not consulted once one is found.
    pub fn attribute(&self, candidates: &[&str]) -> Option<&str> {
        candidates
            .iter()
            .find_map(|key| self.attributes.get(*key))
            .map(|v| v.trim())
    }
}

/// Ordered boundary collection in geographic coordinates. Order matters:
/// the resolver returns the first containing boundary.
#[derive(Debug, Clone)]
pub struct PolygonSet {
    pub boundaries: Vec<Boundary>,
    pub datum: DatumNormalization,
}

impl PolygonSet {
    /// Hand-built set whose coordinates are known to be WGS84.
    pub fn geographic(boundaries: Vec<Boundary>) -> Self {
        Self {
            boundaries,
            datum: DatumNormalization::DeclaredGeographic,
        }
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Report an assumed datum as a fallback so callers can surface it.
    pub fn into_outcome(self) -> Outcome<Self> {
        match self.datum {
            DatumNormalization::AssumedGeographic => {
                Outcome::fallback(self, FallbackReason::DatumAssumed)
            }
            _ => Outcome::success(self),
        }
    }
}
