use std::fmt;
use std::str::FromStr;

use futures_util::Stream;
use tracing::{error, info, warn};

use crate::db::store::SaleWriter;
use crate::error::{AppError, Result};
use crate::ingest::parser::parse_raw_line;
use crate::ingest::source::LineSource;
use crate::types::SaleRecord;

/// What to do with a row that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnParseError {
    /// Stop the import. Batches already written stay written.
    Abort,
    /// Log the row and keep going.
    Skip,
}

impl FromStr for OnParseError {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(OnParseError::Abort),
            "skip" => Ok(OnParseError::Skip),
            other => Err(AppError::Config(format!(
                "IMPORT_ON_PARSE_ERROR must be 'abort' or 'skip', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OnParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnParseError::Abort => write!(f, "abort"),
            OnParseError::Skip => write!(f, "skip"),
        }
    }
}

/// Upper bound on the batch buffer reserved up front. Larger batches grow
/// on demand.
const BATCH_PREALLOC_CAP: usize = 4_096;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Maximum records to import. `None` reads the whole source.
    pub row_limit: Option<u64>,
    /// Records per `insert_batch` call. Must be >= 1.
    pub batch_size: usize,
    /// Log progress every this many rows. 0 disables progress logs.
    pub progress_every: u64,
    pub on_parse_error: OnParseError,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Non-empty lines consumed from the source.
    pub rows_read: u64,
    pub records_parsed: u64,
    /// Rows actually inserted; already-stored identifiers are not counted.
    pub records_written: u64,
    pub batches_written: u64,
    pub rows_skipped: u64,
}

/// Reads feed lines, parses them into records and writes them to the store
/// in fixed-size batches. One batch write is in flight at a time.
///
/// Not safe to run twice concurrently against the same store; callers must
/// serialise imports.
pub struct Importer<'a, W> {
    store: &'a W,
    options: ImportOptions,
    batch: Vec<SaleRecord>,
    report: ImportReport,
}

impl<'a, W: SaleWriter> Importer<'a, W> {
    pub fn new(store: &'a W, options: ImportOptions) -> Self {
        let batch = Vec::with_capacity(options.batch_size.clamp(1, BATCH_PREALLOC_CAP));
        Self {
            store,
            options,
            batch,
            report: ImportReport::default(),
        }
    }

    pub async fn run<S, B>(mut self, lines: &mut LineSource<S>) -> Result<ImportReport>
    where
        S: Stream<Item = Result<B>> + Unpin,
        B: AsRef<[u8]>,
    {
        if self.options.batch_size == 0 {
            return Err(AppError::Config("batch size must be at least 1".to_string()));
        }
        if self.options.row_limit == Some(0) {
            return Ok(self.report);
        }

        info!(
            limit = ?self.options.row_limit,
            batch_size = self.options.batch_size,
            on_parse_error = %self.options.on_parse_error,
            "Import started"
        );

        let mut line_no = 0u64;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.report.rows_read += 1;

            match parse_raw_line(&line) {
                Ok(record) => {
                    self.batch.push(record);
                    self.report.records_parsed += 1;
                    if self.batch.len() >= self.options.batch_size {
                        self.flush().await?;
                    }
                }
                Err(source) => match self.options.on_parse_error {
                    OnParseError::Abort => {
                        warn!(line = line_no, error = %source, "Malformed row, aborting import");
                        if let Err(e) = self.flush().await {
                            error!(
                                line = line_no,
                                pending = self.batch.len(),
                                "Flushing rows before the malformed one failed: {e}"
                            );
                        }
                        warn!(
                            line = line_no,
                            written = self.report.records_written,
                            "Import aborted; earlier batches remain stored"
                        );
                        return Err(AppError::Parse { line: line_no, source });
                    }
                    OnParseError::Skip => {
                        warn!(line = line_no, error = %source, "Skipping malformed row");
                        self.report.rows_skipped += 1;
                    }
                },
            }

            if self.options.progress_every > 0 && self.report.rows_read % self.options.progress_every == 0 {
                info!(
                    rows_read = self.report.rows_read,
                    written = self.report.records_written,
                    skipped = self.report.rows_skipped,
                    "Import progress"
                );
            }

            if self
                .options
                .row_limit
                .is_some_and(|limit| self.report.records_parsed >= limit)
            {
                info!(limit = ?self.options.row_limit, "Row limit reached");
                break;
            }
        }

        self.flush().await?;

        info!(
            rows_read = self.report.rows_read,
            written = self.report.records_written,
            batches = self.report.batches_written,
            skipped = self.report.rows_skipped,
            "Import complete"
        );
        Ok(self.report)
    }

    async fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let written = self.store.insert_batch(&self.batch).await?;
        self.report.records_written += written;
        self.report.batches_written += 1;
        self.batch.clear();
        Ok(())
    }
}
