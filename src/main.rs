//! Surveilai command line.
//!
//! Usage:
//!   surveilai init
//!   surveilai classify --lab positive --symptoms "fever,cough" [--epi-link]
//!   surveilai submit <form.json> [--boundaries <file>]
//!   surveilai summary [--weekly]
//!   surveilai clusters
//!   surveilai score [--population <csv>] [--model <json>] [--output <csv>]
//!   surveilai export [--format csv|json] [--output <file>]
//!   surveilai correct <case_id> [--lab <result>] [--symptoms <text>] [--epi-link <bool>]
//!   surveilai import-legacy <legacy.db>
//!   surveilai config-check [--apply <file>]

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;

use surveilai_lib::classification::classify_text;
use surveilai_lib::config::{self, AppConfig, ConfigError};
use surveilai_lib::db::{
    correct_case, import_legacy_rows, read_legacy_rows, CaseCorrection, CaseStore, DatabaseError,
};
use surveilai_lib::export::{write_cases_csv, write_cases_json};
use surveilai_lib::geometry::{load_path, GeometryError, PolygonSet};
use surveilai_lib::intake::{submit_form, CaseForm, IntakeError};
use surveilai_lib::models::enums::LabResult;
use surveilai_lib::models::{CaseReport, SymptomSet};
use surveilai_lib::outcome::Outcome;
use surveilai_lib::reporting::{detect_case_clusters, summarize, Granularity};
use surveilai_lib::risk::{
    load_population_csv, score_districts, write_scores_csv, LinearRiskModel, RiskError, RiskModel,
};

#[derive(Parser)]
#[command(name = "surveilai")]
#[command(version)]
#[command(about = "Outbreak case reporting: classification, district assignment and hotspots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, case database and default config
    Init,

    /// Classify a case without storing it
    Classify {
        /// Lab result: unknown, negative, positive, presumed
        #[arg(long, default_value = "unknown")]
        lab: LabResult,

        /// Symptoms separated by `,` or `;`
        #[arg(long, default_value = "")]
        symptoms: String,

        /// Case has an epidemiological link
        #[arg(long)]
        epi_link: bool,
    },

    /// Submit a case form (JSON)
    Submit {
        form: PathBuf,

        /// GeoJSON or .tar.gz boundary file for district assignment
        #[arg(short, long)]
        boundaries: Option<PathBuf>,
    },

    /// Counts, epi curve, demographics and the activity alert
    Summary {
        /// Group the epi curve by ISO week instead of by day
        #[arg(long)]
        weekly: bool,
    },

    /// Spatio-temporal hotspots among located cases
    Clusters,

    /// District risk scores as CSV
    Score {
        /// `district,population` CSV
        #[arg(short, long)]
        population: Option<PathBuf>,

        /// Logistic model weights (JSON)
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export every case
    Export {
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Correct a stored case and re-derive its classification
    Correct {
        case_id: String,

        #[arg(long)]
        lab: Option<LabResult>,

        #[arg(long)]
        symptoms: Option<String>,

        #[arg(long, action = clap::ArgAction::Set)]
        epi_link: Option<bool>,
    },

    /// Import the flat case table of a legacy database
    ImportLegacy { database: PathBuf },

    /// Validate config.yaml, optionally replacing it with a new file first
    ConfigCheck {
        #[arg(long)]
        apply: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Nothing to correct")]
    EmptyCorrection,

    #[error("Case store unavailable")]
    StoreUnavailable,

    #[error("{0}")]
    Failed(String),
}

fn load_app_config() -> AppConfig {
    let outcome = config::load_config(&config::config_path());
    if let Some(reason) = outcome.fallback_reason() {
        tracing::warn!(?reason, "Using default configuration");
    }
    outcome.into_value().unwrap_or_default()
}

fn load_boundaries(path: &Path) -> Result<PolygonSet, CliError> {
    let outcome = load_path(path)?.into_outcome();
    if outcome.fallback_reason().is_some() {
        eprintln!("warning: boundary file declares no datum; WGS84 assumed");
    }
    outcome
        .into_value()
        .ok_or_else(|| CliError::Failed("boundary file could not be used".into()))
}

fn open_store() -> CaseStore {
    CaseStore::open(&config::database_path()).with_spill(&config::pending_path())
}

fn all_cases(store: &CaseStore) -> Result<Vec<CaseReport>, CliError> {
    match store.all_cases() {
        Outcome::Success { value } => Ok(value),
        Outcome::RecoverableDefault { value, reason } => {
            tracing::warn!(?reason, "Reading buffered cases only");
            Ok(value)
        }
        Outcome::Failure { reason } => Err(CliError::Failed(reason)),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, CliError> {
    let out: Box<dyn Write> = match path {
        Some(path) => Box::new(io::BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    Ok(out)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let now = Local::now().naive_local();

    match cli.command {
        Commands::Init => {
            let db_path = config::database_path();
            let store = CaseStore::open(&db_path).with_spill(&config::pending_path());
            if !store.is_connected() {
                return Err(CliError::StoreUnavailable);
            }
            let loaded = config::load_config(&config::config_path());
            println!("data directory: {}", config::app_data_dir().display());
            println!("database:       {}", db_path.display());
            println!(
                "config:         {} ({})",
                config::config_path().display(),
                if loaded.is_success() { "existing" } else { "defaults" }
            );
        }

        Commands::Classify {
            lab,
            symptoms,
            epi_link,
        } => {
            let settings = load_app_config();
            let label = classify_text(lab, &symptoms, epi_link, Some(&settings.classification_rules));
            println!("{label}");
        }

        Commands::Submit { form, boundaries } => {
            let settings = load_app_config();
            let polygons = boundaries.as_deref().map(load_boundaries).transpose()?;
            let form = CaseForm::from_json_file(&form)?;
            let mut store = open_store();
            let submission = submit_form(
                &mut store,
                &form,
                Some(&settings.classification_rules),
                polygons.as_ref(),
            )?;
            if !store.pending().is_empty() {
                if store.pending_on_disk() {
                    eprintln!(
                        "warning: database unavailable; case {} kept in {} until the next run",
                        submission.case_id,
                        config::pending_path().display()
                    );
                } else {
                    // Neither the database nor the spill file took it: hand the record back
                    eprintln!("warning: case {} could not be saved anywhere:", submission.case_id);
                    let mut err = io::stderr().lock();
                    serde_json::to_writer_pretty(&mut err, store.pending())?;
                    writeln!(err)?;
                }
            }
            print_json(&submission)?;
        }

        Commands::Summary { weekly } => {
            let settings = load_app_config();
            let store = open_store();
            let cases = all_cases(&store)?;
            let granularity = if weekly { Granularity::IsoWeek } else { Granularity::Day };
            print_json(&summarize(&cases, &settings.alerts, granularity, now))?;
        }

        Commands::Clusters => {
            let settings = load_app_config();
            let store = open_store();
            let cases = all_cases(&store)?;
            print_json(&detect_case_clusters(&cases, &settings.alerts, now))?;
        }

        Commands::Score {
            population,
            model,
            output,
        } => {
            let store = open_store();
            let cases = all_cases(&store)?;
            let populations = population
                .as_deref()
                .map(|p| -> Result<_, RiskError> {
                    load_population_csv(BufReader::new(File::open(p)?))
                })
                .transpose()?;
            let model = model.as_deref().map(LinearRiskModel::from_json_file).transpose()?;
            let scores = score_districts(
                &cases,
                populations.as_ref(),
                model.as_ref().map(|m| m as &dyn RiskModel),
                now,
            )?;
            write_scores_csv(open_output(output.as_deref())?, &scores)?;
        }

        Commands::Export { format, output } => {
            let store = open_store();
            let cases = all_cases(&store)?;
            let out = open_output(output.as_deref())?;
            match format {
                ExportFormat::Csv => write_cases_csv(out, &cases)?,
                ExportFormat::Json => write_cases_json(out, &cases)?,
            }
            tracing::info!(cases = cases.len(), "Cases exported");
        }

        Commands::Correct {
            case_id,
            lab,
            symptoms,
            epi_link,
        } => {
            let correction = CaseCorrection {
                lab_result: lab,
                symptoms: symptoms.as_deref().map(SymptomSet::parse),
                epi_link,
            };
            if correction.is_empty() {
                return Err(CliError::EmptyCorrection);
            }
            let settings = load_app_config();
            let store = open_store();
            let conn = store.connection().ok_or(CliError::StoreUnavailable)?;
            let case = correct_case(conn, &case_id, &correction, Some(&settings.classification_rules))?;
            println!("{} {}", case.case_id, case.classification);
        }

        Commands::ImportLegacy { database } => {
            let settings = load_app_config();
            let legacy = Connection::open_with_flags(&database, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .map_err(DatabaseError::from)?;
            let rows = read_legacy_rows(&legacy)?;
            let store = open_store();
            let conn = store.connection().ok_or(CliError::StoreUnavailable)?;
            let summary = import_legacy_rows(conn, rows, Some(&settings.classification_rules))?;
            print_json(&summary)?;
        }

        Commands::ConfigCheck { apply } => {
            let path = config::config_path();
            if let Some(source) = apply {
                let text = std::fs::read_to_string(source)?;
                if let Some(problem) = config::save_raw_config(&path, &text)? {
                    eprintln!("warning: saved config does not parse: {problem}");
                }
            }
            let outcome = config::load_config(&path);
            match outcome.fallback_reason() {
                None => println!("{}: ok", path.display()),
                Some(reason) => println!("{}: using defaults ({reason:?})", path.display()),
            }
            if let Some(current) = outcome.value() {
                print!("{}", serde_yaml::to_string(current).map_err(ConfigError::from)?);
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    surveilai_lib::init_tracing();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
