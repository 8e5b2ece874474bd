//! Snapshot ownership and refresh.
//!
//! The engine holds exactly one piece of state: the current immutable
//! snapshot. Refresh builds a new one from the source and swaps it in;
//! readers holding the old `Arc` are unaffected.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{SourceConfig, SourceKind};
use crate::ingest::{self, normalize, RowDiagnostic, SourceError};
use crate::record::AlertRecord;
use crate::storage;

/// How the last source read went.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceStatus {
    Loaded,
    /// Source read fine but produced no usable records.
    NoData,
    Unavailable { reason: String },
}

/// One normalized read of the source.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub records: Vec<AlertRecord>,
    pub diagnostics: Vec<RowDiagnostic>,
    pub status: SourceStatus,
    pub loaded_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn empty(status: SourceStatus) -> Self {
        Self {
            records: Vec::new(),
            diagnostics: Vec::new(),
            status,
            loaded_at: Utc::now(),
        }
    }

    pub fn from_records(records: Vec<AlertRecord>, diagnostics: Vec<RowDiagnostic>) -> Self {
        let status = if records.is_empty() {
            SourceStatus::NoData
        } else {
            SourceStatus::Loaded
        };
        Self {
            records,
            diagnostics,
            status,
            loaded_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read and normalize the configured source.
///
/// An unavailable source becomes an empty snapshot; only schema violations
/// (missing required columns) and unreadable data are errors.
pub fn load_snapshot(source: &SourceConfig) -> Result<Snapshot, SourceError> {
    let rows = match source.kind {
        SourceKind::Csv => ingest::read_csv(&source.path),
        SourceKind::Sqlite => storage::load_rows(&source.path.to_string_lossy(), &source.table),
    };
    let rows = match rows {
        Ok(rows) => rows,
        Err(SourceError::Unavailable(reason)) => {
            warn!(path = %source.path.display(), %reason, "alert source unavailable");
            return Ok(Snapshot::empty(SourceStatus::Unavailable { reason }));
        }
        Err(e) => return Err(e),
    };

    let normalized = normalize(rows);
    let snapshot = Snapshot::from_records(normalized.records, normalized.diagnostics);
    info!(
        records = snapshot.len(),
        diagnostics = snapshot.diagnostics.len(),
        status = ?snapshot.status,
        "snapshot loaded"
    );
    Ok(snapshot)
}

/// Holder of the current snapshot.
pub struct Engine {
    source: SourceConfig,
    current: RwLock<Arc<Snapshot>>,
}

impl Engine {
    /// Build an engine and perform the initial load.
    pub fn open(source: SourceConfig) -> Result<Self, SourceError> {
        let snapshot = load_snapshot(&source)?;
        Ok(Self::with_snapshot(source, snapshot))
    }

    pub fn with_snapshot(source: SourceConfig, snapshot: Snapshot) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    /// The current snapshot. Cheap; callers keep it for a whole request.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        snapshot
    }

    /// Re-read the source synchronously and swap the snapshot in.
    pub fn refresh(&self) -> Result<Arc<Snapshot>, SourceError> {
        let snapshot = load_snapshot(&self.source)?;
        Ok(self.replace(snapshot))
    }

    /// Re-read the source on the blocking pool, bounded by
    /// `source.read_timeout_secs`. On timeout or error the previous snapshot
    /// stays in place.
    pub async fn refresh_bounded(self: &Arc<Self>) -> Result<Arc<Snapshot>> {
        let source = self.source.clone();
        let limit = Duration::from_secs(source.read_timeout_secs.max(1));
        let task = tokio::task::spawn_blocking(move || load_snapshot(&source));
        let snapshot = match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined??,
            Err(_) => anyhow::bail!("source read exceeded {}s", limit.as_secs()),
        };
        Ok(self.replace(snapshot))
    }
}
