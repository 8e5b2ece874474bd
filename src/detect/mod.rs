//! Cohort-relative anomaly scoring.
//!
//! Each call fits a fresh isolation forest on the records it is given, so an
//! "Anomaly" label is only meaningful relative to that batch.

pub mod engine;
pub mod features;
pub mod forest;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::engine::{
    score, score_projection, score_projection_cancellable, AnomalyReport, ScoringParams,
};
pub use self::features::{FeatureColumn, Projection};

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectError {
    #[error("insufficient data: need {needed} scorable records, have {have}")]
    InsufficientData { needed: usize, have: usize },
    #[error("features have near-zero variance: {}", columns.join(", "))]
    DegenerateFeatures { columns: Vec<String> },
    #[error("no feature columns requested")]
    NoFeatures,
    #[error("unknown feature column '{name}'")]
    UnknownFeature { name: String },
    #[error("invalid scoring parameters: {reason}")]
    InvalidParams { reason: String },
    #[error("model fit exceeded {seconds}s")]
    TimedOut { seconds: u64 },
    #[error("model fit cancelled")]
    Cancelled,
    #[error("model fit failed: {reason}")]
    FitFailed { reason: String },
}

/// Scoring outcome as handed to the presentation boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoringStatus {
    Scored(AnomalyReport),
    NotScored { reason: DetectError },
    /// Scoring was not requested.
    Skipped,
}

impl ScoringStatus {
    pub fn report(&self) -> Option<&AnomalyReport> {
        match self {
            ScoringStatus::Scored(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Result<AnomalyReport, DetectError>> for ScoringStatus {
    fn from(result: Result<AnomalyReport, DetectError>) -> Self {
        match result {
            Ok(report) => ScoringStatus::Scored(report),
            Err(reason) => ScoringStatus::NotScored { reason },
        }
    }
}
