use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::features::{FeatureColumn, Projection};
use super::forest::{percentile, IsolationForest};
use super::DetectError;
use crate::record::{AlertRecord, AnomalyLabel, RecordId};

/// Minimum number of scorable records for a fit.
pub const MIN_RECORDS: usize = 2;

/// Model parameters for one scoring call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    /// Expected fraction of anomalous records, in (0, 0.5].
    pub contamination: f64,
    pub seed: u64,
    pub n_trees: usize,
    pub max_samples: usize,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            seed: 42,
            n_trees: 100,
            max_samples: 256,
        }
    }
}

impl ScoringParams {
    pub fn validate(&self) -> Result<(), DetectError> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(DetectError::InvalidParams {
                reason: format!("contamination must be in (0, 0.5], got {}", self.contamination),
            });
        }
        if self.n_trees == 0 {
            return Err(DetectError::InvalidParams {
                reason: "n_trees must be at least 1".to_string(),
            });
        }
        if self.max_samples < MIN_RECORDS {
            return Err(DetectError::InvalidParams {
                reason: format!("max_samples must be at least {}", MIN_RECORDS),
            });
        }
        Ok(())
    }
}

/// Labels and diagnostics from one fit.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    pub features: Vec<FeatureColumn>,
    pub params: ScoringParams,
    pub labels: BTreeMap<RecordId, AnomalyLabel>,
    pub scores: BTreeMap<RecordId, f64>,
    /// Scores strictly above this are labeled `Anomaly`.
    pub threshold: f64,
    pub unscored: Vec<RecordId>,
}

impl AnomalyReport {
    pub fn anomaly_count(&self) -> usize {
        self.labels
            .values()
            .filter(|l| **l == AnomalyLabel::Anomaly)
            .count()
    }

    pub fn label(&self, id: RecordId) -> Option<AnomalyLabel> {
        self.labels.get(&id).copied()
    }
}

/// Project `records` onto `columns` and score them.
pub fn score<'a, I>(
    records: I,
    columns: &[FeatureColumn],
    params: &ScoringParams,
) -> Result<AnomalyReport, DetectError>
where
    I: IntoIterator<Item = &'a AlertRecord>,
{
    score_projection(Projection::build(records, columns), params)
}

/// Fit a fresh forest on `projection` and label each row against the
/// batch's own `(1 - contamination)` score percentile.
pub fn score_projection(
    projection: Projection,
    params: &ScoringParams,
) -> Result<AnomalyReport, DetectError> {
    score_projection_cancellable(projection, params, &AtomicBool::new(false))
}

/// As [`score_projection`], abandoning the fit with
/// [`DetectError::Cancelled`] once `cancel` is set.
pub fn score_projection_cancellable(
    projection: Projection,
    params: &ScoringParams,
    cancel: &AtomicBool,
) -> Result<AnomalyReport, DetectError> {
    params.validate()?;
    if projection.columns.is_empty() {
        return Err(DetectError::NoFeatures);
    }
    if projection.len() < MIN_RECORDS {
        return Err(DetectError::InsufficientData {
            needed: MIN_RECORDS,
            have: projection.len(),
        });
    }
    let flat = projection.flat_columns();
    if flat.len() == projection.columns.len() {
        return Err(DetectError::DegenerateFeatures {
            columns: flat.iter().map(|c| c.to_string()).collect(),
        });
    }

    debug!(
        rows = projection.len(),
        features = ?projection.columns,
        n_trees = params.n_trees,
        "fitting isolation forest"
    );
    let forest = IsolationForest::fit(
        &projection.rows,
        params.n_trees,
        params.max_samples,
        params.seed,
        cancel,
    )
    .ok_or(DetectError::Cancelled)?;
    let raw: Vec<f64> = projection.rows.iter().map(|x| forest.score(x)).collect();
    let threshold = percentile(&raw, 100.0 * (1.0 - params.contamination)).unwrap_or(1.0);

    let mut labels = BTreeMap::new();
    let mut scores = BTreeMap::new();
    for (id, s) in projection.ids.iter().zip(&raw) {
        let label = if *s > threshold {
            AnomalyLabel::Anomaly
        } else {
            AnomalyLabel::Normal
        };
        labels.insert(*id, label);
        scores.insert(*id, *s);
    }

    let report = AnomalyReport {
        features: projection.columns,
        params: *params,
        labels,
        scores,
        threshold,
        unscored: projection.unscored,
    };
    info!(
        scored = report.labels.len(),
        anomalies = report.anomaly_count(),
        unscored = report.unscored.len(),
        "anomaly scoring complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{normalize, RawRow};

    fn raw(row: u64, hour: u32, bytes: &str) -> RawRow {
        RawRow {
            row,
            timestamp: format!("2024-03-01 {:02}:00:00", hour),
            rule_description: "rule".to_string(),
            agent_name: "agent".to_string(),
            level: "5".to_string(),
            bytes_transferred: Some(bytes.to_string()),
        }
    }

    fn injected_outliers() -> Vec<AlertRecord> {
        let mut rows: Vec<RawRow> = (0..18u64)
            .map(|i| raw(i + 1, 9 + (i % 9) as u32, &(100 + i * 22).to_string()))
            .collect();
        rows.push(raw(19, 3, "75000"));
        rows.push(raw(20, 3, "91000"));
        normalize(rows).records
    }

    #[test]
    fn test_injected_outliers_are_labeled() {
        let records = injected_outliers();
        let report = score(&records, &FeatureColumn::DEFAULT, &ScoringParams::default()).unwrap();
        assert_eq!(report.labels.len(), 20);
        assert_eq!(report.anomaly_count(), 2);
        assert_eq!(report.label(RecordId(19)), Some(AnomalyLabel::Anomaly));
        assert_eq!(report.label(RecordId(20)), Some(AnomalyLabel::Anomaly));
    }

    #[test]
    fn test_scoring_is_reproducible() {
        let records = injected_outliers();
        let a = score(&records, &FeatureColumn::DEFAULT, &ScoringParams::default()).unwrap();
        let b = score(&records, &FeatureColumn::DEFAULT, &ScoringParams::default()).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.scores, b.scores);
    }

    #[test]
    fn test_zero_variance_is_not_scored() {
        let records = normalize((1..=10).map(|i| raw(i, 12, "250"))).records;
        let err = score(&records, &FeatureColumn::DEFAULT, &ScoringParams::default()).unwrap_err();
        assert!(matches!(err, DetectError::DegenerateFeatures { .. }));
    }

    #[test]
    fn test_single_record_is_not_scored() {
        let records = normalize(vec![raw(1, 12, "250")]).records;
        let err = score(&records, &FeatureColumn::DEFAULT, &ScoringParams::default()).unwrap_err();
        assert_eq!(err, DetectError::InsufficientData { needed: 2, have: 1 });
    }

    #[test]
    fn test_records_missing_features_are_unscored() {
        let mut rows: Vec<RawRow> = (1..=10).map(|i| raw(i, (i % 24) as u32, &(i * 10).to_string())).collect();
        rows.push(raw(11, 1, "garbage"));
        let records = normalize(rows).records;
        let report = score(&records, &FeatureColumn::DEFAULT, &ScoringParams::default()).unwrap();
        assert_eq!(report.unscored, vec![RecordId(11)]);
        assert_eq!(report.label(RecordId(11)), None);
    }

    #[test]
    fn test_invalid_contamination_rejected() {
        let records = injected_outliers();
        let params = ScoringParams {
            contamination: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            score(&records, &FeatureColumn::DEFAULT, &params),
            Err(DetectError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_empty_feature_list() {
        let records = injected_outliers();
        assert_eq!(
            score(&records, &[], &ScoringParams::default()).unwrap_err(),
            DetectError::NoFeatures
        );
    }

    #[test]
    fn test_near_zero_variance_is_not_scored() {
        // Differences at the 1e-10 relative scale are below the flatness cutoff.
        let rows = (1..=10).map(|i| raw(i, 12, if i % 2 == 0 { "1000000" } else { "1000000.0001" }));
        let records = normalize(rows).records;
        let err = score(&records, &FeatureColumn::DEFAULT, &ScoringParams::default()).unwrap_err();
        assert!(matches!(err, DetectError::DegenerateFeatures { ref columns } if columns.len() == 2));

        // Real spread at the same magnitude is scored.
        let rows = (1..=10).map(|i| raw(i, 12, &(1_000_000 + i * 500).to_string()));
        let records = normalize(rows).records;
        assert!(score(&records, &FeatureColumn::DEFAULT, &ScoringParams::default()).is_ok());
    }

    #[test]
    fn test_extreme_values_do_not_abort_scoring() {
        let projection = Projection {
            columns: vec![FeatureColumn::BytesTransferred],
            ids: vec![RecordId(1), RecordId(2), RecordId(3)],
            rows: vec![vec![-1e308], vec![1e308], vec![5.0]],
            unscored: vec![],
        };
        let report = score_projection(projection, &ScoringParams::default()).unwrap();
        assert_eq!(report.labels.len(), 3);
        assert!(report.scores.values().all(|s| s.is_finite()));
    }

    #[test]
    fn test_cancelled_fit_reports_cancelled() {
        let records = injected_outliers();
        let projection = Projection::build(&records, &FeatureColumn::DEFAULT);
        let err = score_projection_cancellable(projection, &ScoringParams::default(), &AtomicBool::new(true))
            .unwrap_err();
        assert_eq!(err, DetectError::Cancelled);
    }
}
