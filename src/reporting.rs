//! Dashboard aggregates over stored cases.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::clustering::{detect_clusters_at, Cluster, ClusterParams, ClusterPoint};
use crate::config::AlertSettings;
use crate::models::enums::{Classification, Sex};
use crate::models::CaseReport;
use crate::temporal::onset_in_window;

// ═══════════════════════════════════════════
// Counts
// ═══════════════════════════════════════════

/// Count per classification, every tier present, in tier order.
pub fn classification_counts(cases: &[CaseReport]) -> Vec<(Classification, usize)> {
    Classification::all()
        .iter()
        .map(|c| (*c, cases.iter().filter(|r| r.classification == *c).count()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    IsoWeek,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpiPoint {
    /// `YYYY-MM-DD`, or `YYYY-Www` for ISO weeks
    pub period: String,
    pub start: NaiveDate,
    pub cases: usize,
}

/// Cases per onset period, ascending. Undated cases are not plotted.
pub fn epi_curve(cases: &[CaseReport], granularity: Granularity) -> Vec<EpiPoint> {
    let mut buckets: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for date in cases.iter().filter_map(|c| c.onset_date) {
        let start = match granularity {
            Granularity::Day => date,
            Granularity::IsoWeek => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
        };
        *buckets.entry(start).or_default() += 1;
    }

    buckets
        .into_iter()
        .map(|(start, cases)| EpiPoint {
            period: match granularity {
                Granularity::Day => start.format("%Y-%m-%d").to_string(),
                Granularity::IsoWeek => start.format("%G-W%V").to_string(),
            },
            start,
            cases,
        })
        .collect()
}

// ═══════════════════════════════════════════
// Demographics
// ═══════════════════════════════════════════

const AGE_BANDS: &[(&str, u32, u32)] = &[
    ("0-4", 0, 4),
    ("5-14", 5, 14),
    ("15-24", 15, 24),
    ("25-44", 25, 44),
    ("45-64", 45, 64),
    ("65+", 65, u32::MAX),
];

pub const UNKNOWN_AGE: &str = "unknown";

pub fn age_band(age: Option<u32>) -> &'static str {
    age.and_then(|a| {
        AGE_BANDS
            .iter()
            .find(|(_, lo, hi)| (*lo..=*hi).contains(&a))
            .map(|(label, _, _)| *label)
    })
    .unwrap_or(UNKNOWN_AGE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Demographics {
    pub by_sex: Vec<(Sex, usize)>,
    /// Every band is listed, `unknown` last.
    pub by_age_band: Vec<(&'static str, usize)>,
}

pub fn demographics(cases: &[CaseReport]) -> Demographics {
    let by_sex = Sex::all()
        .iter()
        .map(|s| (*s, cases.iter().filter(|c| c.sex == *s).count()))
        .collect();
    let by_age_band = AGE_BANDS
        .iter()
        .map(|(label, _, _)| *label)
        .chain(std::iter::once(UNKNOWN_AGE))
        .map(|band| (band, cases.iter().filter(|c| age_band(c.age) == band).count()))
        .collect();
    Demographics { by_sex, by_age_band }
}

// ═══════════════════════════════════════════
// Alerts and hotspots
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Quiet,
    Elevated,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityAlert {
    pub level: ActivityLevel,
    pub recent_cases: usize,
    pub window_days: u32,
    pub threshold: u32,
}

pub fn activity_alert(cases: &[CaseReport], alerts: &AlertSettings, now: NaiveDateTime) -> ActivityAlert {
    let recent_cases = cases
        .iter()
        .filter_map(|c| c.onset_date)
        .filter(|d| onset_in_window(*d, now, alerts.recent_days))
        .count();
    let level = if recent_cases > alerts.high_activity_threshold as usize {
        ActivityLevel::High
    } else if recent_cases > 0 {
        ActivityLevel::Elevated
    } else {
        ActivityLevel::Quiet
    };
    if level == ActivityLevel::High {
        tracing::warn!(recent_cases, days = alerts.recent_days, "High case activity");
    }
    ActivityAlert {
        level,
        recent_cases,
        window_days: alerts.recent_days,
        threshold: alerts.high_activity_threshold,
    }
}

/// Located cases as detector input, with the owning case ids.
pub fn cluster_points(cases: &[CaseReport]) -> (Vec<ClusterPoint>, Vec<&str>) {
    cases
        .iter()
        .filter_map(|c| {
            c.coordinates.map(|p| {
                (
                    ClusterPoint::new(p.latitude, p.longitude, c.onset_date),
                    c.case_id.as_str(),
                )
            })
        })
        .unzip()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotspot {
    #[serde(flatten)]
    pub cluster: Cluster,
    pub case_ids: Vec<String>,
}

/// Hotspots among located cases, using the configured cluster settings.
pub fn detect_case_clusters(
    cases: &[CaseReport],
    alerts: &AlertSettings,
    now: NaiveDateTime,
) -> Vec<Hotspot> {
    let (points, ids) = cluster_points(cases);
    detect_clusters_at(&points, &ClusterParams::from(alerts), now)
        .into_iter()
        .map(|cluster| Hotspot {
            case_ids: cluster.members.iter().map(|&i| ids[i].to_string()).collect(),
            cluster,
        })
        .collect()
}

/// Everything the `summary` command prints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub by_classification: Vec<(Classification, usize)>,
    pub epi_curve: Vec<EpiPoint>,
    pub demographics: Demographics,
    pub alert: ActivityAlert,
}

pub fn summarize(
    cases: &[CaseReport],
    alerts: &AlertSettings,
    granularity: Granularity,
    now: NaiveDateTime,
) -> Summary {
    Summary {
        total: cases.len(),
        by_classification: classification_counts(cases),
        epi_curve: epi_curve(cases, granularity),
        demographics: demographics(cases),
        alert: activity_alert(cases, alerts, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{LabResult, ReporterType};
    use crate::models::{GeoPoint, Location, SymptomSet};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn case(id: &str, onset: Option<NaiveDate>) -> CaseReport {
        CaseReport {
            case_id: id.into(),
            name: None,
            sex: Sex::Unknown,
            age: None,
            reporter: ReporterType::Citizen,
            location: Location::default(),
            coordinates: None,
            onset_date: onset,
            lab_result: LabResult::Unknown,
            symptoms: SymptomSet::default(),
            epi_link: false,
            classification: Classification::Suspected,
            recorded_at: date(6, 10).and_hms_opt(8, 0, 0).unwrap(),
        }
    }

    fn now() -> NaiveDateTime {
        date(6, 10).and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn counts_list_every_tier() {
        let mut a = case("a", None);
        a.classification = Classification::Confirmed;
        let counts = classification_counts(&[a, case("b", None), case("c", None)]);
        assert_eq!(
            counts,
            vec![
                (Classification::Confirmed, 1),
                (Classification::Probable, 0),
                (Classification::Suspected, 2),
            ]
        );
    }

    #[test]
    fn daily_epi_curve_skips_undated() {
        let cases = vec![
            case("a", Some(date(6, 2))),
            case("b", Some(date(6, 1))),
            case("c", Some(date(6, 2))),
            case("d", None),
        ];
        let curve = epi_curve(&cases, Granularity::Day);
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].period, "2025-06-01");
        assert_eq!(curve[0].cases, 1);
        assert_eq!(curve[1].period, "2025-06-02");
        assert_eq!(curve[1].cases, 2);
    }

    #[test]
    fn weekly_epi_curve_groups_by_iso_week() {
        // 2025-06-02 is a Monday; 06-08 the Sunday of the same week
        let cases = vec![
            case("a", Some(date(6, 2))),
            case("b", Some(date(6, 8))),
            case("c", Some(date(6, 9))),
        ];
        let curve = epi_curve(&cases, Granularity::IsoWeek);
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].period, "2025-W23");
        assert_eq!(curve[0].start, date(6, 2));
        assert_eq!(curve[0].cases, 2);
        assert_eq!(curve[1].period, "2025-W24");
    }

    #[test]
    fn iso_week_label_uses_week_year() {
        // 2024-12-30 belongs to ISO week 1 of 2025
        let curve = epi_curve(
            &[case("a", NaiveDate::from_ymd_opt(2024, 12, 31))],
            Granularity::IsoWeek,
        );
        assert_eq!(curve[0].period, "2025-W01");
    }

    #[test]
    fn age_bands() {
        assert_eq!(age_band(Some(0)), "0-4");
        assert_eq!(age_band(Some(4)), "0-4");
        assert_eq!(age_band(Some(5)), "5-14");
        assert_eq!(age_band(Some(44)), "25-44");
        assert_eq!(age_band(Some(65)), "65+");
        assert_eq!(age_band(Some(120)), "65+");
        assert_eq!(age_band(None), "unknown");
    }

    #[test]
    fn demographics_count_sex_and_age() {
        let mut a = case("a", None);
        a.sex = Sex::Female;
        a.age = Some(3);
        let mut b = case("b", None);
        b.sex = Sex::Female;
        b.age = Some(30);
        let d = demographics(&[a, b, case("c", None)]);
        assert!(d.by_sex.contains(&(Sex::Female, 2)));
        assert!(d.by_sex.contains(&(Sex::Unknown, 1)));
        assert_eq!(d.by_age_band.len(), 7);
        assert_eq!(d.by_age_band[0], ("0-4", 1));
        assert_eq!(d.by_age_band[3], ("25-44", 1));
        assert_eq!(d.by_age_band[6], ("unknown", 1));
    }

    #[test]
    fn activity_levels() {
        let alerts = AlertSettings {
            high_activity_threshold: 2,
            ..AlertSettings::default()
        };
        assert_eq!(activity_alert(&[], &alerts, now()).level, ActivityLevel::Quiet);

        // June 3 midnight is before the June 3 noon cutoff
        let old = vec![case("a", Some(date(6, 3))), case("b", None)];
        assert_eq!(activity_alert(&old, &alerts, now()).level, ActivityLevel::Quiet);

        let some = vec![case("a", Some(date(6, 4))), case("b", Some(date(6, 9)))];
        let alert = activity_alert(&some, &alerts, now());
        assert_eq!(alert.level, ActivityLevel::Elevated);
        assert_eq!(alert.recent_cases, 2);

        let many: Vec<CaseReport> = (0..3).map(|i| case(&i.to_string(), Some(date(6, 9)))).collect();
        assert_eq!(activity_alert(&many, &alerts, now()).level, ActivityLevel::High);
    }

    #[test]
    fn hotspots_carry_case_ids() {
        let located = |id: &str, lat: f64, lon: f64| {
            let mut c = case(id, Some(date(6, 5)));
            c.coordinates = Some(GeoPoint::new(lat, lon).unwrap());
            c
        };
        let cases = vec![
            case("unlocated", Some(date(6, 5))),
            located("n1", -1.2921, 36.8219),
            located("n2", -1.2950, 36.8250),
            located("far", -4.0435, 39.6682),
            located("n3", -1.2900, 36.8200),
        ];
        let (points, ids) = cluster_points(&cases);
        assert_eq!(points.len(), 4);
        assert_eq!(ids, vec!["n1", "n2", "far", "n3"]);

        let hotspots = detect_case_clusters(&cases, &AlertSettings::default(), now());
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].case_ids, vec!["n1", "n2", "n3"]);
        assert_eq!(hotspots[0].cluster.count, 3);
    }

    #[test]
    fn summary_totals() {
        let cases = vec![case("a", Some(date(6, 9)))];
        let summary = summarize(&cases, &AlertSettings::default(), Granularity::Day, now());
        assert_eq!(summary.total, 1);
        assert_eq!(summary.alert.level, ActivityLevel::Elevated);
        assert_eq!(summary.epi_curve.len(), 1);
    }
}
