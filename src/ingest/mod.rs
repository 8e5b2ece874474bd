//! Source ingestion: reading raw alert rows and normalizing them.

pub mod normalize;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

pub use self::normalize::{normalize, Normalized, RowDiagnostic, RowIssue};

/// Columns every source must provide.
pub const REQUIRED_COLUMNS: [&str; 4] = ["timestamp", "rule_description", "agent_name", "level"];

/// Optional feature column.
pub const BYTES_COLUMN: &str = "bytes_transferred";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("source is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("failed to read source: {0}")]
    Read(String),
}

impl From<csv::Error> for SourceError {
    fn from(e: csv::Error) -> Self {
        SourceError::Read(e.to_string())
    }
}

/// One untyped row as read from the source, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// 1-based data row ordinal (header excluded).
    pub row: u64,
    pub timestamp: String,
    pub rule_description: String,
    pub agent_name: String,
    pub level: String,
    /// `None` when the source has no `bytes_transferred` column or the cell is empty.
    pub bytes_transferred: Option<String>,
}

/// Locate the required columns in a header row.
pub(crate) fn resolve_columns<'a, I>(headers: I) -> Result<ColumnMap, SourceError>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();
    let find = |name: &str| names.iter().position(|h| h == name);

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| find(c).is_none())
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SourceError::MissingColumns(missing));
    }

    Ok(ColumnMap {
        timestamp: find("timestamp").unwrap_or_default(),
        rule_description: find("rule_description").unwrap_or_default(),
        agent_name: find("agent_name").unwrap_or_default(),
        level: find("level").unwrap_or_default(),
        bytes_transferred: find(BYTES_COLUMN),
    })
}

/// Positions of the known columns within a source row.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ColumnMap {
    pub timestamp: usize,
    pub rule_description: usize,
    pub agent_name: usize,
    pub level: usize,
    pub bytes_transferred: Option<usize>,
}

impl ColumnMap {
    pub(crate) fn build_row<F>(&self, row: u64, cell: F) -> RawRow
    where
        F: Fn(usize) -> Option<String>,
    {
        RawRow {
            row,
            timestamp: cell(self.timestamp).unwrap_or_default(),
            rule_description: cell(self.rule_description).unwrap_or_default(),
            agent_name: cell(self.agent_name).unwrap_or_default(),
            level: cell(self.level).unwrap_or_default(),
            bytes_transferred: self
                .bytes_transferred
                .and_then(&cell)
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Read every data row of a CSV file.
///
/// A missing file is `Unavailable`; a header without the required columns is
/// `MissingColumns`. Rows the CSV reader cannot decode are skipped with a
/// warning rather than failing the batch.
pub fn read_csv(path: &Path) -> Result<Vec<RawRow>, SourceError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            SourceError::Unavailable(format!("{} not found", path.display()))
        }
        _ => SourceError::Unavailable(format!("{}: {}", path.display(), e)),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let columns = resolve_columns(headers.iter())?;

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let ordinal = idx as u64 + 1;
        match result {
            Ok(record) => {
                rows.push(columns.build_row(ordinal, |i| record.get(i).map(str::to_string)));
            }
            Err(e) => {
                warn!(row = ordinal, error = %e, "skipping undecodable source row");
            }
        }
    }

    info!(path = %path.display(), rows = rows.len(), "read alert source");
    Ok(rows)
}

/// Read and normalize the CSV at `path` in one step.
pub fn load_csv(path: &Path) -> Result<Normalized, SourceError> {
    let rows = read_csv(path)?;
    let normalized = normalize(rows);
    debug!(
        records = normalized.records.len(),
        diagnostics = normalized.diagnostics.len(),
        "normalized CSV source"
    );
    Ok(normalized)
}
