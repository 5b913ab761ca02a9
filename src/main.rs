mod api;
mod config;
mod db;
mod error;
mod ingest;
mod query;
mod types;

use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::{Config, IMPORT_CONNECT_TIMEOUT_SECS};
use crate::db::store::SqliteStore;
use crate::error::{AppError, Result};
use crate::ingest::importer::Importer;

/// What the process was started to do.
enum Mode {
    Serve,
    Import,
}

impl Mode {
    fn from_args() -> Result<Self> {
        match std::env::args().nth(1).as_deref() {
            None | Some("serve") => Ok(Mode::Serve),
            Some("import") => Ok(Mode::Import),
            Some(other) => Err(AppError::Config(format!(
                "unknown command '{other}', expected 'serve' or 'import'"
            ))),
        }
    }
}

#[tokio::main]
async fn main() {
    let (cfg, mode) = match Config::from_env().and_then(|c| Ok((c, Mode::from_args()?))) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let result = match mode {
        Mode::Serve => serve(cfg).await,
        Mode::Import => import(cfg).await,
    };
    if let Err(e) = result {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let store = SqliteStore::connect(&cfg.db_path).await?;

    let app = router(ApiState { store }, cfg.request_timeout);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// One-shot bulk load. Must not run concurrently with another import
/// against the same database.
async fn import(cfg: Config) -> Result<()> {
    let store = SqliteStore::connect(&cfg.db_path).await?;

    info!("Importing from {}", cfg.import_source);
    let mut lines = cfg
        .import_source
        .open(Duration::from_secs(IMPORT_CONNECT_TIMEOUT_SECS))
        .await?;

    let report = Importer::new(&store, cfg.import_options())
        .run(&mut lines)
        .await?;

    info!(
        "Import finished: {} rows read, {} records written in {} batches, {} skipped",
        report.rows_read, report.records_written, report.batches_written, report.rows_skipped,
    );
    Ok(())
}
