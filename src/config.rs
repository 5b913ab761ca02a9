use std::time::Duration;

use crate::error::{AppError, Result};
use crate::ingest::importer::{ImportOptions, OnParseError};
use crate::ingest::source::ImportSource;

/// Full UK Land Registry price-paid dataset (several gigabytes).
pub const IMPORT_SOURCE_URL: &str =
    "http://prod.publicdata.landregistry.gov.uk.s3-website-eu-west-1.amazonaws.com/pp-complete.csv";

/// Default cap on imported rows. `IMPORT_LIMIT=-1` lifts it.
pub const DEFAULT_IMPORT_LIMIT: i64 = 50_000;

/// Records per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Rows between import progress logs.
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;

/// Connect timeout for the dataset download.
pub const IMPORT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Per-request deadline for the HTTP API (REQUEST_TIMEOUT_SECS)
    pub request_timeout: Duration,
    /// URL or local path of the dataset (IMPORT_SOURCE)
    pub import_source: ImportSource,
    /// Row cap, `None` when IMPORT_LIMIT is -1
    pub import_limit: Option<u64>,
    /// IMPORT_BATCH_SIZE
    pub import_batch_size: usize,
    /// IMPORT_PROGRESS_EVERY
    pub import_progress_every: u64,
    /// IMPORT_ON_PARSE_ERROR: "abort" (default) or "skip"
    pub import_on_parse_error: OnParseError,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "houseprice.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse::<u64>()
                    .unwrap_or(30),
            ),
            import_source: ImportSource::parse(
                &std::env::var("IMPORT_SOURCE").unwrap_or_else(|_| IMPORT_SOURCE_URL.to_string()),
            ),
            import_limit: parse_import_limit(
                &std::env::var("IMPORT_LIMIT").unwrap_or_else(|_| DEFAULT_IMPORT_LIMIT.to_string()),
            )?,
            import_batch_size: std::env::var("IMPORT_BATCH_SIZE")
                .unwrap_or_else(|_| DEFAULT_BATCH_SIZE.to_string())
                .parse::<usize>()
                .ok()
                .filter(|&n| n >= 1)
                .ok_or_else(|| {
                    AppError::Config("IMPORT_BATCH_SIZE must be a positive integer".to_string())
                })?,
            import_progress_every: std::env::var("IMPORT_PROGRESS_EVERY")
                .unwrap_or_else(|_| DEFAULT_PROGRESS_EVERY.to_string())
                .parse::<u64>()
                .unwrap_or(DEFAULT_PROGRESS_EVERY),
            import_on_parse_error: std::env::var("IMPORT_ON_PARSE_ERROR")
                .unwrap_or_else(|_| "abort".to_string())
                .parse()?,
        })
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            row_limit: self.import_limit,
            batch_size: self.import_batch_size,
            progress_every: self.import_progress_every,
            on_parse_error: self.import_on_parse_error,
        }
    }
}

/// `-1` means unbounded; any other negative value is rejected.
fn parse_import_limit(raw: &str) -> Result<Option<u64>> {
    match raw.trim().parse::<i64>() {
        Ok(-1) => Ok(None),
        Ok(n) if n >= 0 => Ok(Some(n as u64)),
        _ => Err(AppError::Config(format!(
            "IMPORT_LIMIT must be -1 or a non-negative integer, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_limit_sentinel_is_unbounded() {
        assert_eq!(parse_import_limit("-1").unwrap(), None);
        assert_eq!(parse_import_limit("50000").unwrap(), Some(50_000));
        assert!(parse_import_limit("-2").is_err());
        assert!(parse_import_limit("many").is_err());
    }
}
