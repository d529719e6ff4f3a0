pub mod classification;
pub mod clustering;
pub mod config;
pub mod db;
pub mod export;
pub mod geometry;
pub mod intake;
pub mod models;
pub mod outcome;
pub mod reporting;
pub mod risk;
pub mod temporal;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Logs go to stderr so command output stays machine-readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Surveilai starting v{}", config::APP_VERSION);
}
