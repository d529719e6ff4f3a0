use geo::{Contains, Point};
use serde::{Deserialize, Serialize};

use super::{Boundary, PolygonSet};

const DISTRICT_FIELDS: &[&str] = &[
    "district", "District", "NAME_2", "ADM2_NAME", "ADM1_NAME", "region", "Region",
];
const REGION_FIELDS: &[&str] = &["region", "Region", "ADM1_NAME", "NAME_1"];
const COMMUNITY_FIELDS: &[&str] = &["community", "COMMUNITY", "NAME_3"];

/// Administrative names derived from a containing boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAssignment {
    pub district: Option<String>,
    pub region: Option<String>,
    pub community: Option<String>,
}

impl AdminAssignment {
    pub fn is_empty(&self) -> bool {
        self.district.is_none() && self.region.is_none() && self.community.is_none()
    }

    fn from_boundary(boundary: &Boundary) -> Self {
        Self {
            district: boundary.attribute(DISTRICT_FIELDS).map(str::to_string),
            region: boundary.attribute(REGION_FIELDS).map(str::to_string),
            community: boundary.attribute(COMMUNITY_FIELDS).map(str::to_string),
        }
    }
}

/// Assign a coordinate to the first boundary in `polygons` containing it.
/// No containing boundary yields an empty assignment.
pub fn resolve(latitude: f64, longitude: f64, polygons: &PolygonSet) -> AdminAssignment {
    // x is longitude, y is latitude
    let point = Point::new(longitude, latitude);
    match polygons.boundaries.iter().find(|b| b.geometry.contains(&point)) {
        Some(boundary) => AdminAssignment::from_boundary(boundary),
        None => {
            tracing::debug!(latitude, longitude, "No boundary contains point");
            AdminAssignment::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: min_x, y: min_y),
            (x: max_x, y: min_y),
            (x: max_x, y: max_y),
            (x: min_x, y: max_y),
            (x: min_x, y: min_y),
        ]])
    }

    fn kenya() -> PolygonSet {
        PolygonSet::geographic(vec![
            Boundary::new(square(36.6, -1.45, 37.1, -1.15))
                .with_attribute("NAME_2", "Nairobi")
                .with_attribute("NAME_1", "Nairobi Province")
                .with_attribute("NAME_3", "Kibera"),
            Boundary::new(square(39.5, -4.2, 39.8, -3.9)).with_attribute("district", "Mombasa"),
        ])
    }

    #[test]
    fn resolves_nairobi() {
        let got = resolve(-1.30, 36.80, &kenya());
        assert_eq!(got.district.as_deref(), Some("Nairobi"));
        assert_eq!(got.region.as_deref(), Some("Nairobi Province"));
        assert_eq!(got.community.as_deref(), Some("Kibera"));
    }

    #[test]
    fn swapped_axes_do_not_match() {
        // (36.80, -1.30) read as lat/lon lies far outside every boundary
        assert!(resolve(36.80, -1.30, &kenya()).is_empty());
    }

    #[test]
    fn no_match_is_empty() {
        assert!(resolve(0.0, 0.0, &kenya()).is_empty());
        assert!(resolve(0.0, 0.0, &PolygonSet::geographic(Vec::new())).is_empty());
    }

    #[test]
    fn first_overlapping_boundary_wins() {
        let set = PolygonSet::geographic(vec![
            Boundary::new(square(0.0, 0.0, 2.0, 2.0)).with_attribute("district", "First"),
            Boundary::new(square(1.0, 1.0, 3.0, 3.0)).with_attribute("district", "Second"),
        ]);
        assert_eq!(resolve(1.5, 1.5, &set).district.as_deref(), Some("First"));
        assert_eq!(resolve(2.5, 2.5, &set).district.as_deref(), Some("Second"));
    }

    #[test]
    fn district_falls_back_through_candidates() {
        let set = PolygonSet::geographic(vec![Boundary::new(square(0.0, 0.0, 1.0, 1.0))
            .with_attribute("ADM1_NAME", "Coast")]);
        let got = resolve(0.5, 0.5, &set);
        assert_eq!(got.district.as_deref(), Some("Coast"));
        assert_eq!(got.region.as_deref(), Some("Coast"));
        assert_eq!(got.community, None);
    }

    #[test]
    fn first_present_candidate_wins_even_when_blank() {
        let set = PolygonSet::geographic(vec![Boundary::new(square(0.0, 0.0, 1.0, 1.0))
            .with_attribute("district", "")
            .with_attribute("ADM1_NAME", "Coast")]);
        let got = resolve(0.5, 0.5, &set);
        assert_eq!(got.district.as_deref(), Some(""));
        assert_eq!(got.region.as_deref(), Some("Coast"));
    }

    #[test]
    fn boundary_without_names_matches_with_empty_fields() {
        let set = PolygonSet::geographic(vec![Boundary::new(square(0.0, 0.0, 1.0, 1.0))]);
        assert_eq!(resolve(0.5, 0.5, &set), AdminAssignment::default());
    }
}
