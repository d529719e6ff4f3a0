//! Adapter from the schema-v1 flat case row to `CaseReport`.
//!
//! V1 rows store lab positivity as a 0/1 integer, symptoms as free text and
//! coordinates as "lat,lon" text. SQLite does not enforce column types, so
//! every column arrives as text and is parsed here. Fields that cannot be
//! read are dropped and reported, never guessed.

use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use super::case::{CaseReport, GeoPoint, Location, SymptomSet};
use super::enums::{Classification, LabResult, ReporterType, Sex};
use super::rules::ClassificationRules;
use crate::classification::classify_parts;

/// One row of the v1 `cases` table, column for column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyCaseRow {
    pub case_id: String,
    pub name: Option<String>,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub reporter: Option<String>,
    pub region: Option<String>,
    pub district: Option<String>,
    pub community: Option<String>,
    pub onset_date: Option<String>,
    pub lab_positive: Option<String>,
    pub symptoms: Option<String>,
    pub classification: Option<String>,
    pub coords: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MigrationWarning {
    /// A column held text that does not parse into the v2 field.
    Unparsed { field: &'static str, value: String },
    /// The stored label disagrees with the current rules; the rules win.
    Reclassified {
        stored: Option<String>,
        computed: Classification,
    },
}

#[derive(Debug, Clone)]
pub struct MigratedCase {
    pub report: CaseReport,
    pub warnings: Vec<MigrationWarning>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Integer text, accepting a whole-valued real such as "34.0".
fn parse_whole(text: &str) -> Option<i64> {
    text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

impl LegacyCaseRow {
    /// Convert into the current model, re-deriving the classification.
    pub fn migrate(self, rules: Option<&ClassificationRules>) -> MigratedCase {
        let mut warnings = Vec::new();

        let sex = match non_empty(self.sex) {
            None => Sex::Unknown,
            Some(s) => Sex::from_str(&s).unwrap_or_else(|_| {
                warnings.push(MigrationWarning::Unparsed { field: "sex", value: s });
                Sex::Unknown
            }),
        };

        let reporter = match non_empty(self.reporter) {
            None => ReporterType::default(),
            Some(r) => ReporterType::from_str(&r).unwrap_or_else(|_| {
                warnings.push(MigrationWarning::Unparsed { field: "reporter", value: r });
                ReporterType::default()
            }),
        };

        let age = non_empty(self.age).and_then(|a| match parse_whole(&a) {
            Some(n) if (0..=150).contains(&n) => Some(n as u32),
            _ => {
                warnings.push(MigrationWarning::Unparsed { field: "age", value: a });
                None
            }
        });

        let onset_date = non_empty(self.onset_date).and_then(|d| {
            // v1 wrote either a bare date or a full timestamp
            let head = d.get(..10).unwrap_or(d.as_str());
            match NaiveDate::parse_from_str(head, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    warnings.push(MigrationWarning::Unparsed { field: "onset_date", value: d });
                    None
                }
            }
        });

        let coordinates = non_empty(self.coords).and_then(|c| match GeoPoint::from_str(&c) {
            Ok(p) => Some(p),
            Err(_) => {
                warnings.push(MigrationWarning::Unparsed { field: "coords", value: c });
                None
            }
        });

        let lab_flag = non_empty(self.lab_positive).and_then(|l| match parse_whole(&l) {
            Some(flag) => Some(flag),
            None => {
                warnings.push(MigrationWarning::Unparsed { field: "lab_positive", value: l });
                None
            }
        });
        let lab_result = LabResult::from_legacy_flag(lab_flag);
        let symptoms = SymptomSet::parse(self.symptoms.as_deref().unwrap_or(""));
        // v1 never recorded an epidemiological link
        let epi_link = false;
        let classification = classify_parts(lab_result, &symptoms, epi_link, rules);

        let stored = non_empty(self.classification);
        if stored.as_deref() != Some(classification.as_str()) {
            warnings.push(MigrationWarning::Reclassified {
                stored,
                computed: classification,
            });
        }

        let report = CaseReport {
            case_id: self.case_id,
            name: non_empty(self.name),
            sex,
            age,
            reporter,
            location: Location {
                region: non_empty(self.region),
                district: non_empty(self.district),
                community: non_empty(self.community),
                town: None,
                landmark: None,
            },
            coordinates,
            onset_date,
            lab_result,
            symptoms,
            epi_link,
            classification,
            recorded_at: Local::now().naive_local(),
        };

        MigratedCase { report, warnings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_row() -> LegacyCaseRow {
        LegacyCaseRow {
            case_id: "a1b2c3d4".into(),
            name: Some("".into()),
            sex: Some("Female".into()),
            age: Some("34".into()),
            reporter: Some("Citizen".into()),
            region: Some("Nairobi".into()),
            district: Some("Westlands".into()),
            community: None,
            onset_date: Some("2025-03-02".into()),
            lab_positive: Some("0".into()),
            symptoms: Some("fever;cough;rash".into()),
            classification: Some("Probable".into()),
            coords: Some("-1.26,36.80".into()),
        }
    }

    #[test]
    fn clean_row_migrates_without_warnings() {
        let migrated = v1_row().migrate(None);
        assert!(migrated.warnings.is_empty(), "{:?}", migrated.warnings);
        let r = migrated.report;
        assert_eq!(r.sex, Sex::Female);
        assert_eq!(r.reporter, ReporterType::Citizen);
        assert_eq!(r.age, Some(34));
        assert_eq!(r.name, None);
        assert_eq!(r.lab_result, LabResult::Negative);
        assert_eq!(r.onset_date, NaiveDate::from_ymd_opt(2025, 3, 2));
        assert_eq!(r.coordinates.unwrap().latitude, -1.26);
        assert_eq!(r.classification, Classification::Probable);
    }

    #[test]
    fn timestamp_onset_is_truncated_to_date() {
        let mut row = v1_row();
        row.onset_date = Some("2025-03-02 00:00:00".into());
        let migrated = row.migrate(None);
        assert_eq!(migrated.report.onset_date, NaiveDate::from_ymd_opt(2025, 3, 2));
    }

    #[test]
    fn bad_coords_are_dropped_and_reported() {
        let mut row = v1_row();
        row.coords = Some("near the market".into());
        let migrated = row.migrate(None);
        assert!(migrated.report.coordinates.is_none());
        assert!(migrated.warnings.contains(&MigrationWarning::Unparsed {
            field: "coords",
            value: "near the market".into(),
        }));
    }

    #[test]
    fn stale_label_is_recomputed() {
        // The old form marked any case with one required symptom as Probable
        let mut row = v1_row();
        row.symptoms = Some("fever".into());
        let migrated = row.migrate(None);
        assert_eq!(migrated.report.classification, Classification::Suspected);
        assert!(matches!(
            migrated.warnings.last(),
            Some(MigrationWarning::Reclassified { computed: Classification::Suspected, .. })
        ));
    }

    #[test]
    fn text_age_is_dropped_and_reported() {
        let mut row = v1_row();
        row.age = Some("thirty".into());
        let migrated = row.migrate(None);
        assert_eq!(migrated.report.age, None);
        assert_eq!(
            migrated.warnings,
            vec![MigrationWarning::Unparsed { field: "age", value: "thirty".into() }]
        );
    }

    #[test]
    fn real_valued_columns_are_accepted() {
        let mut row = v1_row();
        row.age = Some("34.0".into());
        row.lab_positive = Some("1".into());
        row.classification = Some("Confirmed".into());
        let migrated = row.migrate(None);
        assert!(migrated.warnings.is_empty(), "{:?}", migrated.warnings);
        assert_eq!(migrated.report.age, Some(34));
        assert_eq!(migrated.report.lab_result, LabResult::Positive);
    }

    #[test]
    fn unreadable_lab_flag_is_unknown() {
        let mut row = v1_row();
        row.lab_positive = Some("yes".into());
        let migrated = row.migrate(None);
        assert_eq!(migrated.report.lab_result, LabResult::Unknown);
        assert!(migrated.warnings.contains(&MigrationWarning::Unparsed {
            field: "lab_positive",
            value: "yes".into(),
        }));
    }

    #[test]
    fn unknown_sex_label_falls_back() {
        let mut row = v1_row();
        row.sex = Some("F".into());
        let migrated = row.migrate(None);
        assert_eq!(migrated.report.sex, Sex::Unknown);
        assert_eq!(migrated.warnings.len(), 1);
    }
}
