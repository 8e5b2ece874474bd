//! One analysis pass: filter, aggregate, score.
//!
//! Everything a caller needs is passed in an `AnalysisRequest`; nothing is
//! remembered between passes.

pub mod aggregator;
pub mod stats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::detect::{self, DetectError, FeatureColumn, Projection, ScoringParams, ScoringStatus};
use crate::filter::{self, FilterCriteria};
use crate::record::AlertRecord;
use crate::session::{Snapshot, SourceStatus};

pub use self::aggregator::{aggregate, AggregateAxis, AggregateResult, AggregateSet, GroupKey};
pub use self::stats::Summary;

/// Explicit parameters for one pass.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub criteria: FilterCriteria,
    pub features: Vec<FeatureColumn>,
    pub params: ScoringParams,
    /// Fit the anomaly model at all.
    pub score: bool,
    /// Bound on the model fit in `run_bounded`.
    pub fit_timeout: Duration,
}

impl Default for AnalysisRequest {
    fn default() -> Self {
        Self {
            criteria: FilterCriteria::default(),
            features: FeatureColumn::DEFAULT.to_vec(),
            params: ScoringParams::default(),
            score: true,
            fit_timeout: Duration::from_secs(30),
        }
    }
}

impl AnalysisRequest {
    /// Defaults taken from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            criteria: FilterCriteria::default(),
            features: config.scoring.features.clone(),
            params: config.scoring.params(),
            score: true,
            fit_timeout: Duration::from_secs(config.scoring.fit_timeout_secs.max(1)),
        }
    }

    pub fn with_criteria(mut self, criteria: FilterCriteria) -> Self {
        self.criteria = criteria;
        self
    }
}

/// Everything handed to presentation and export.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub source: SourceStatus,
    /// Size of the unfiltered snapshot.
    pub snapshot_total: usize,
    pub records: Vec<AlertRecord>,
    pub summary: Summary,
    pub aggregates: AggregateSet,
    pub scoring: ScoringStatus,
}

impl Analysis {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct Prepared {
    analysis: Analysis,
    projection: Option<Projection>,
}

fn prepare(snapshot: &Snapshot, request: &AnalysisRequest) -> Prepared {
    let view = filter::apply(&snapshot.records, &request.criteria);
    let summary = Summary::compute(&view);
    let aggregates = AggregateSet::compute(&view);
    let projection = request
        .score
        .then(|| Projection::build(&view, &request.features));

    Prepared {
        analysis: Analysis {
            source: snapshot.status.clone(),
            snapshot_total: snapshot.len(),
            records: view.to_records(),
            summary,
            aggregates,
            scoring: ScoringStatus::Skipped,
        },
        projection,
    }
}

fn finish(mut prepared: Prepared, scoring: Option<Result<detect::AnomalyReport, DetectError>>) -> Analysis {
    if let Some(result) = scoring {
        prepared.analysis.scoring = result.into();
    }
    let a = &prepared.analysis;
    info!(
        total = a.snapshot_total,
        filtered = a.records.len(),
        high_severity = a.summary.high_severity,
        scored = a.scoring.report().map(|r| r.labels.len()),
        "analysis complete"
    );
    prepared.analysis
}

/// Run a pass synchronously.
pub fn run(snapshot: &Snapshot, request: &AnalysisRequest) -> Analysis {
    let mut prepared = prepare(snapshot, request);
    let scoring = prepared
        .projection
        .take()
        .map(|p| detect::score_projection(p, &request.params));
    finish(prepared, scoring)
}

/// Run a pass with the model fit on the blocking pool under
/// `request.fit_timeout`. A fit that overruns is cancelled and reported as
/// not scored; the filtered records and aggregates are still returned.
pub async fn run_bounded(snapshot: Arc<Snapshot>, request: AnalysisRequest) -> Analysis {
    let mut prepared = prepare(&snapshot, &request);
    let scoring = match prepared.projection.take() {
        None => None,
        Some(projection) => {
            let params = request.params;
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = cancel.clone();
            let task = tokio::task::spawn_blocking(move || {
                detect::score_projection_cancellable(projection, &params, &flag)
            });
            Some(match tokio::time::timeout(request.fit_timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(error = %e, "scoring task failed");
                    Err(DetectError::FitFailed {
                        reason: e.to_string(),
                    })
                }
                Err(_) => {
                    cancel.store(true, Ordering::Relaxed);
                    warn!(limit_secs = request.fit_timeout.as_secs(), "model fit timed out");
                    Err(DetectError::TimedOut {
                        seconds: request.fit_timeout.as_secs(),
                    })
                }
            })
        }
    };
    finish(prepared, scoring)
}
