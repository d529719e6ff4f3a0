use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const CASE_COLUMNS: &str = "case_id, name, sex, age, reporter, region, district, community,
     town, landmark, latitude, longitude, onset_date, lab_result, symptoms, epi_link,
     classification, recorded_at";

/// Fields an administrator may correct after submission. The label itself
/// is not among them: it is recomputed from the corrected inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseCorrection {
    pub lab_result: Option<LabResult>,
    pub symptoms: Option<SymptomSet>,
    pub epi_link: Option<bool>,
}

impl CaseCorrection {
    pub fn is_empty(&self) -> bool {
        self.lab_result.is_none() && self.symptoms.is_none() && self.epi_link.is_none()
    }
}

pub fn insert_case(conn: &Connection, case: &CaseReport) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO cases (case_id, schema_version, name, sex, age, reporter, region, district,
         community, town, landmark, latitude, longitude, onset_date, lab_result, symptoms,
         epi_link, classification, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            case.case_id,
            CASE_SCHEMA_VERSION,
            case.name,
            case.sex.as_str(),
            case.age,
            case.reporter.as_str(),
            case.location.region,
            case.location.district,
            case.location.community,
            case.location.town,
            case.location.landmark,
            case.coordinates.map(|p| p.latitude),
            case.coordinates.map(|p| p.longitude),
            case.onset_date.map(|d| d.to_string()),
            case.lab_result.as_str(),
            case.symptoms.to_storage_string(),
            case.epi_link as i32,
            case.classification.as_str(),
            case.recorded_at.to_string(),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, _) if f.code == ErrorCode::ConstraintViolation => {
            DatabaseError::ConstraintViolation(format!("case {}: {e}", case.case_id))
        }
        other => DatabaseError::Sqlite(other),
    })?;
    Ok(())
}

pub fn get_case(conn: &Connection, case_id: &str) -> Result<Option<CaseReport>, DatabaseError> {
    let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_id = ?1");
    let row = conn
        .query_row(&sql, params![case_id], read_case_row)
        .optional()?;
    row.map(CaseRow::into_report).transpose()
}

/// Every stored case, oldest submission first.
pub fn get_all_cases(conn: &Connection) -> Result<Vec<CaseReport>, DatabaseError> {
    let sql = format!("SELECT {CASE_COLUMNS} FROM cases ORDER BY recorded_at, case_id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_case_row)?;
    collect_cases(rows)
}

/// Cases with an onset on or after `from`. Cases without an onset date are
/// excluded.
pub fn get_cases_since(conn: &Connection, from: &NaiveDate) -> Result<Vec<CaseReport>, DatabaseError> {
    let sql = format!(
        "SELECT {CASE_COLUMNS} FROM cases
         WHERE onset_date IS NOT NULL AND onset_date >= ?1
         ORDER BY onset_date, case_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![from.to_string()], read_case_row)?;
    collect_cases(rows)
}

pub fn count_cases(conn: &Connection) -> Result<u32, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM cases", [], |row| row.get(0))?;
    Ok(count)
}

/// Apply an administrative correction and re-derive the classification.
pub fn correct_case(
    conn: &Connection,
    case_id: &str,
    correction: &CaseCorrection,
    rules: Option<&ClassificationRules>,
) -> Result<CaseReport, DatabaseError> {
    let mut case = get_case(conn, case_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "case".into(),
        id: case_id.into(),
    })?;

    if let Some(lab) = correction.lab_result {
        case.lab_result = lab;
    }
    if let Some(ref symptoms) = correction.symptoms {
        case.symptoms = symptoms.clone();
    }
    if let Some(epi_link) = correction.epi_link {
        case.epi_link = epi_link;
    }
    let previous = case.classification;
    let updated = case.reclassify(rules);

    conn.execute(
        "UPDATE cases SET lab_result = ?1, symptoms = ?2, epi_link = ?3,
         classification = ?4, corrected_at = ?5 WHERE case_id = ?6",
        params![
            case.lab_result.as_str(),
            case.symptoms.to_storage_string(),
            case.epi_link as i32,
            updated.as_str(),
            Local::now().naive_local().to_string(),
            case_id,
        ],
    )?;

    if previous != updated {
        tracing::info!(case_id, from = %previous, to = %updated, "Case reclassified after correction");
    }

    Ok(case)
}

/// Outcome of importing a v1 table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LegacyImportSummary {
    pub imported: u32,
    pub skipped_existing: u32,
    pub warnings: Vec<(String, MigrationWarning)>,
}

/// Any v1 cell as text. Column affinity was never enforced, so a cell may
/// hold an integer, real or text regardless of its declared type.
fn legacy_text(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get::<_, Value>(idx)? {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    })
}

/// Read the flat v1 `cases` table from a legacy database.
pub fn read_legacy_rows(legacy: &Connection) -> Result<Vec<LegacyCaseRow>, DatabaseError> {
    let mut stmt = legacy.prepare(
        "SELECT case_id, name, sex, age, reporter, region, district, community,
         onset_date, lab_positive, symptoms, classification, coords
         FROM cases",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(LegacyCaseRow {
            case_id: legacy_text(row, 0)?.unwrap_or_default(),
            name: legacy_text(row, 1)?,
            sex: legacy_text(row, 2)?,
            age: legacy_text(row, 3)?,
            reporter: legacy_text(row, 4)?,
            region: legacy_text(row, 5)?,
            district: legacy_text(row, 6)?,
            community: legacy_text(row, 7)?,
            onset_date: legacy_text(row, 8)?,
            lab_positive: legacy_text(row, 9)?,
            symptoms: legacy_text(row, 10)?,
            classification: legacy_text(row, 11)?,
            coords: legacy_text(row, 12)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(DatabaseError::from)
}

/// Migrate v1 rows into the store in one transaction. Rows whose id is
/// already present are left untouched.
pub fn import_legacy_rows(
    conn: &Connection,
    rows: Vec<LegacyCaseRow>,
    rules: Option<&ClassificationRules>,
) -> Result<LegacyImportSummary, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let mut summary = LegacyImportSummary::default();

    for row in rows {
        if get_case(&tx, &row.case_id)?.is_some() {
            summary.skipped_existing += 1;
            continue;
        }
        let migrated = row.migrate(rules);
        let id = migrated.report.case_id.clone();
        insert_case(&tx, &migrated.report)?;
        summary.imported += 1;
        summary
            .warnings
            .extend(migrated.warnings.into_iter().map(|w| (id.clone(), w)));
    }

    tx.commit()?;
    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped_existing,
        warnings = summary.warnings.len(),
        "Legacy cases imported"
    );
    Ok(summary)
}

/// Raw column values, converted after the statement finishes.
struct CaseRow {
    case_id: String,
    name: Option<String>,
    sex: String,
    age: Option<u32>,
    reporter: String,
    region: Option<String>,
    district: Option<String>,
    community: Option<String>,
    town: Option<String>,
    landmark: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    onset_date: Option<String>,
    lab_result: String,
    symptoms: String,
    epi_link: i32,
    classification: String,
    recorded_at: String,
}

fn read_case_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CaseRow> {
    Ok(CaseRow {
        case_id: row.get(0)?,
        name: row.get(1)?,
        sex: row.get(2)?,
        age: row.get(3)?,
        reporter: row.get(4)?,
        region: row.get(5)?,
        district: row.get(6)?,
        community: row.get(7)?,
        town: row.get(8)?,
        landmark: row.get(9)?,
        latitude: row.get(10)?,
        longitude: row.get(11)?,
        onset_date: row.get(12)?,
        lab_result: row.get(13)?,
        symptoms: row.get(14)?,
        epi_link: row.get(15)?,
        classification: row.get(16)?,
        recorded_at: row.get(17)?,
    })
}

fn collect_cases(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<CaseRow>>,
) -> Result<Vec<CaseReport>, DatabaseError> {
    let mut cases = Vec::new();
    for row in rows {
        cases.push(row?.into_report()?);
    }
    Ok(cases)
}

impl CaseRow {
    fn into_report(self) -> Result<CaseReport, DatabaseError> {
        let coordinates = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        };
        Ok(CaseReport {
            sex: Sex::from_str(&self.sex)?,
            reporter: ReporterType::from_str(&self.reporter)?,
            lab_result: LabResult::from_str(&self.lab_result)?,
            classification: Classification::from_str(&self.classification)?,
            onset_date: self
                .onset_date
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            recorded_at: NaiveDateTime::parse_from_str(&self.recorded_at, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            case_id: self.case_id,
            name: self.name,
            age: self.age,
            location: Location {
                region: self.region,
                district: self.district,
                community: self.community,
                town: self.town,
                landmark: self.landmark,
            },
            coordinates,
            symptoms: SymptomSet::parse(&self.symptoms),
            epi_link: self.epi_link != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn make_case(id: &str, onset: &str) -> CaseReport {
        CaseReport {
            case_id: id.into(),
            name: Some("Test Patient".into()),
            sex: Sex::Female,
            age: Some(29),
            reporter: ReporterType::CommunityVolunteer,
            location: Location {
                region: Some("Nairobi".into()),
                district: Some("Westlands".into()),
                ..Default::default()
            },
            coordinates: Some(GeoPoint { latitude: -1.26, longitude: 36.8 }),
            onset_date: NaiveDate::parse_from_str(onset, "%Y-%m-%d").ok(),
            lab_result: LabResult::Negative,
            symptoms: SymptomSet::parse("fever;cough"),
            epi_link: false,
            classification: Classification::Probable,
            recorded_at: NaiveDateTime::parse_from_str(
                &format!("{onset} 09:30:00.250"),
                "%Y-%m-%d %H:%M:%S%.f",
            )
            .unwrap(),
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = test_db();
        let case = make_case("c0000001", "2025-02-01");
        insert_case(&conn, &case).unwrap();

        let loaded = get_case(&conn, "c0000001").unwrap().unwrap();
        assert_eq!(loaded, case);
    }

    #[test]
    fn get_missing_case_is_none() {
        let conn = test_db();
        assert!(get_case(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn duplicate_id_is_constraint_violation() {
        let conn = test_db();
        let case = make_case("c0000001", "2025-02-01");
        insert_case(&conn, &case).unwrap();
        let err = insert_case(&conn, &case).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn case_without_coordinates_or_onset() {
        let conn = test_db();
        let mut case = make_case("c0000002", "2025-02-01");
        case.coordinates = None;
        case.onset_date = None;
        case.age = None;
        insert_case(&conn, &case).unwrap();

        let loaded = get_case(&conn, "c0000002").unwrap().unwrap();
        assert!(loaded.coordinates.is_none());
        assert!(loaded.onset_date.is_none());
        assert!(loaded.age.is_none());
    }

    #[test]
    fn get_all_cases_in_submission_order() {
        let conn = test_db();
        insert_case(&conn, &make_case("b", "2025-02-03")).unwrap();
        insert_case(&conn, &make_case("a", "2025-02-01")).unwrap();

        let all = get_all_cases(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].case_id, "a");
        assert_eq!(count_cases(&conn).unwrap(), 2);
    }

    #[test]
    fn cases_since_filters_on_onset() {
        let conn = test_db();
        insert_case(&conn, &make_case("old", "2025-01-01")).unwrap();
        insert_case(&conn, &make_case("new", "2025-03-01")).unwrap();
        let mut undated = make_case("undated", "2025-03-01");
        undated.onset_date = None;
        insert_case(&conn, &undated).unwrap();

        let since = get_cases_since(&conn, &NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()).unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].case_id, "new");
    }

    #[test]
    fn correction_reclassifies() {
        let conn = test_db();
        insert_case(&conn, &make_case("c1", "2025-02-01")).unwrap();

        let correction = CaseCorrection {
            lab_result: Some(LabResult::Positive),
            ..Default::default()
        };
        let updated = correct_case(&conn, "c1", &correction, None).unwrap();
        assert_eq!(updated.classification, Classification::Confirmed);

        let stored = get_case(&conn, "c1").unwrap().unwrap();
        assert_eq!(stored.classification, Classification::Confirmed);
        assert_eq!(stored.lab_result, LabResult::Positive);

        let corrected_at: Option<String> = conn
            .query_row("SELECT corrected_at FROM cases WHERE case_id = 'c1'", [], |r| r.get(0))
            .unwrap();
        assert!(corrected_at.is_some());
    }

    #[test]
    fn correction_can_downgrade() {
        let conn = test_db();
        insert_case(&conn, &make_case("c1", "2025-02-01")).unwrap();
        let correction = CaseCorrection {
            symptoms: Some(SymptomSet::parse("rash")),
            ..Default::default()
        };
        let updated = correct_case(&conn, "c1", &correction, None).unwrap();
        assert_eq!(updated.classification, Classification::Suspected);
    }

    #[test]
    fn correct_missing_case_is_not_found() {
        let conn = test_db();
        let err = correct_case(&conn, "ghost", &CaseCorrection::default(), None).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    fn legacy_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE cases (
                case_id TEXT PRIMARY KEY, name TEXT, sex TEXT, age INTEGER, reporter TEXT,
                region TEXT, district TEXT, community TEXT, onset_date TEXT,
                lab_positive INTEGER, symptoms TEXT, classification TEXT, coords TEXT);
             INSERT INTO cases VALUES ('aaaa1111', 'A', 'Male', 40, 'Citizen', 'R', 'D', NULL,
                '2025-01-10', 1, '', 'Confirmed', '-1.3,36.8');
             INSERT INTO cases VALUES ('bbbb2222', NULL, 'Unknown', 0, 'Frontline worker', '', '', '',
                '2025-01-11', 0, 'fever', 'Probable', 'not coords');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn legacy_import_migrates_and_reports() {
        let legacy = legacy_db();
        let conn = test_db();

        let rows = read_legacy_rows(&legacy).unwrap();
        assert_eq!(rows.len(), 2);

        let summary = import_legacy_rows(&conn, rows, None).unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped_existing, 0);
        // bbbb2222: bad coords + stale Probable label
        assert_eq!(summary.warnings.len(), 2);
        assert!(summary.warnings.iter().all(|(id, _)| id == "bbbb2222"));

        let a = get_case(&conn, "aaaa1111").unwrap().unwrap();
        assert_eq!(a.classification, Classification::Confirmed);
        assert!(a.coordinates.is_some());
    }

    #[test]
    fn legacy_text_in_integer_column_is_reported_not_fatal() {
        let legacy = legacy_db();
        legacy
            .execute_batch(
                "INSERT INTO cases VALUES ('cccc3333', NULL, 'Male', 'thirty', 'Citizen', 'R', 'D',
                    NULL, '2025-01-12', '1', '', 'Confirmed', NULL);",
            )
            .unwrap();
        let conn = test_db();

        let rows = read_legacy_rows(&legacy).unwrap();
        assert_eq!(rows.len(), 3);
        let summary = import_legacy_rows(&conn, rows, None).unwrap();
        assert_eq!(summary.imported, 3);
        assert!(summary.warnings.contains(&(
            "cccc3333".to_string(),
            MigrationWarning::Unparsed { field: "age", value: "thirty".into() },
        )));

        let c = get_case(&conn, "cccc3333").unwrap().unwrap();
        assert_eq!(c.age, None);
        assert_eq!(c.lab_result, LabResult::Positive);
        assert_eq!(c.classification, Classification::Confirmed);
    }

    #[test]
    fn legacy_import_skips_existing_ids() {
        let legacy = legacy_db();
        let conn = test_db();
        import_legacy_rows(&conn, read_legacy_rows(&legacy).unwrap(), None).unwrap();
        let again = import_legacy_rows(&conn, read_legacy_rows(&legacy).unwrap(), None).unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped_existing, 2);
        assert_eq!(count_cases(&conn).unwrap(), 2);
    }
}
