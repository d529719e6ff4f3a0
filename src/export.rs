//! Flat exports of the case table.

use std::io::Write;

use crate::models::CaseReport;

const CASE_COLUMNS: &[&str] = &[
    "case_id",
    "name",
    "sex",
    "age",
    "reporter",
    "region",
    "district",
    "community",
    "town",
    "landmark",
    "latitude",
    "longitude",
    "onset_date",
    "lab_result",
    "symptoms",
    "epi_link",
    "classification",
    "recorded_at",
];

/// Quote a CSV field when it holds a separator, quote or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn case_row(case: &CaseReport) -> Vec<String> {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let loc = &case.location;
    vec![
        case.case_id.clone(),
        text(&case.name),
        case.sex.to_string(),
        case.age.map(|a| a.to_string()).unwrap_or_default(),
        case.reporter.to_string(),
        text(&loc.region),
        text(&loc.district),
        text(&loc.community),
        text(&loc.town),
        text(&loc.landmark),
        case.coordinates.map(|p| p.latitude.to_string()).unwrap_or_default(),
        case.coordinates.map(|p| p.longitude.to_string()).unwrap_or_default(),
        case.onset_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
        case.lab_result.to_string(),
        case.symptoms.to_storage_string(),
        u8::from(case.epi_link).to_string(),
        case.classification.to_string(),
        case.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    ]
}

pub fn write_cases_csv<W: Write>(mut out: W, cases: &[CaseReport]) -> std::io::Result<()> {
    writeln!(out, "{}", CASE_COLUMNS.join(","))?;
    for case in cases {
        let row: Vec<String> = case_row(case).iter().map(|f| csv_field(f)).collect();
        writeln!(out, "{}", row.join(","))?;
    }
    out.flush()
}

pub fn write_cases_json<W: Write>(mut out: W, cases: &[CaseReport]) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut out, cases)?;
    writeln!(out)?;
    out.flush()
}
