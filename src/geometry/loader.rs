use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;
use std::io::Read;
use std::path::Path;

use geo::{Coord, LineString, MapCoords, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::Value;

use super::{Boundary, DatumNormalization, GeometryError, PolygonSet};

/// WGS84 semi-major axis used by spherical ("web") Mercator.
const MERCATOR_RADIUS: f64 = 6_378_137.0;

#[derive(Deserialize)]
struct RawCollection {
    #[serde(default)]
    crs: Option<RawCrs>,
    #[serde(default)]
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawCrs {
    #[serde(default)]
    properties: Option<RawCrsProperties>,
}

#[derive(Deserialize)]
struct RawCrsProperties {
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
}

#[derive(Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// Map a legacy `crs.properties.name` to a normalization path.
fn datum_for(name: Option<&str>) -> Result<DatumNormalization, GeometryError> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(DatumNormalization::AssumedGeographic);
    };
    let upper = name.to_ascii_uppercase();
    if upper.ends_with("CRS84") {
        return Ok(DatumNormalization::DeclaredGeographic);
    }
    let code = upper.rsplit(':').next().unwrap_or_default();
    match code {
        "4326" if upper.contains("EPSG") => Ok(DatumNormalization::DeclaredGeographic),
        "3857" | "900913" | "3785" if upper.contains("EPSG") => {
            Ok(DatumNormalization::Reprojected)
        }
        _ => Err(GeometryError::UnsupportedDatum(name.to_string())),
    }
}

/// Inverse spherical Mercator: metres to degrees.
fn mercator_to_geographic(c: Coord<f64>) -> Coord<f64> {
    let lon = (c.x / MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (c.y / MERCATOR_RADIUS).exp().atan() - FRAC_PI_2).to_degrees();
    Coord { x: lon, y: lat }
}

fn parse_ring(value: &Value, feature: usize) -> Result<LineString<f64>, GeometryError> {
    let invalid = |reason: &str| GeometryError::InvalidGeometry {
        feature,
        reason: reason.to_string(),
    };
    let positions: Vec<Vec<f64>> =
        serde_json::from_value(value.clone()).map_err(|e| invalid(&e.to_string()))?;
    let coords = positions
        .iter()
        .map(|p| match p.as_slice() {
            // Altitude, if present, is ignored
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(invalid("position needs at least two values")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

fn parse_polygon(value: &Value, feature: usize) -> Result<Polygon<f64>, GeometryError> {
    let rings = value.as_array().ok_or_else(|| GeometryError::InvalidGeometry {
        feature,
        reason: "polygon coordinates must be an array of rings".into(),
    })?;
    let mut rings = rings.iter().map(|r| parse_ring(r, feature));
    let exterior = rings.next().transpose()?.ok_or_else(|| GeometryError::InvalidGeometry {
        feature,
        reason: "polygon has no exterior ring".into(),
    })?;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_geometry(
    geometry: &RawGeometry,
    feature: usize,
) -> Result<Option<MultiPolygon<f64>>, GeometryError> {
    match geometry.kind.as_str() {
        "Polygon" => Ok(Some(MultiPolygon::new(vec![parse_polygon(
            &geometry.coordinates,
            feature,
        )?]))),
        "MultiPolygon" => {
            let parts = geometry
                .coordinates
                .as_array()
                .ok_or_else(|| GeometryError::InvalidGeometry {
                    feature,
                    reason: "multipolygon coordinates must be an array".into(),
                })?
                .iter()
                .map(|p| parse_polygon(p, feature))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(MultiPolygon::new(parts)))
        }
        other => {
            tracing::warn!(feature, kind = other, "Skipping non-polygon boundary feature");
            Ok(None)
        }
    }
}

fn render_attribute(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Load a GeoJSON FeatureCollection of Polygon / MultiPolygon features.
pub fn load_geojson<R: Read>(reader: R) -> Result<PolygonSet, GeometryError> {
    let raw: RawCollection = serde_json::from_reader(reader)?;
    let datum = datum_for(
        raw.crs
            .as_ref()
            .and_then(|c| c.properties.as_ref())
            .and_then(|p| p.name.as_deref()),
    )?;

    let mut boundaries = Vec::with_capacity(raw.features.len());
    for (index, feature) in raw.features.iter().enumerate() {
        let Some(ref geometry) = feature.geometry else {
            tracing::warn!(feature = index, "Skipping feature without geometry");
            continue;
        };
        let Some(mut shape) = parse_geometry(geometry, index)? else {
            continue;
        };
        if datum == DatumNormalization::Reprojected {
            shape = shape.map_coords(mercator_to_geographic);
        }
        let attributes: BTreeMap<String, String> = feature
            .properties
            .iter()
            .flatten()
            .filter_map(|(k, v)| render_attribute(v).map(|v| (k.clone(), v)))
            .collect();
        boundaries.push(Boundary {
            geometry: shape,
            attributes,
        });
    }

    match datum {
        DatumNormalization::AssumedGeographic => tracing::warn!(
            boundaries = boundaries.len(),
            "Boundary file declares no datum, assuming WGS84"
        ),
        _ => tracing::info!(boundaries = boundaries.len(), datum = ?datum, "Boundaries loaded"),
    }

    Ok(PolygonSet { boundaries, datum })
}

fn is_boundary_member(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("geojson" | "json")
    )
}

/// Load the first `.geojson` / `.json` member of a `.tar.gz` archive.
pub fn load_archive(path: &Path) -> Result<PolygonSet, GeometryError> {
    let file = std::fs::File::open(path)?;
    let gz = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(gz);

    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member = entry.path()?.into_owned();
        if is_boundary_member(&member) {
            tracing::debug!(member = %member.display(), "Reading boundary member");
            return load_geojson(entry);
        }
    }
    Err(GeometryError::NoBoundaryFile)
}

/// Load a boundary file by extension: GeoJSON or a gzipped tar of one.
pub fn load_path(path: &Path) -> Result<PolygonSet, GeometryError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        load_archive(path)
    } else if is_boundary_member(path) {
        load_geojson(std::io::BufReader::new(std::fs::File::open(path)?))
    } else {
        Err(GeometryError::UnsupportedFormat(path.display().to_string()))
    }
}
