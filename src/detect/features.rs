//! Feature projection of alert records into a numeric matrix.

use serde::{Deserialize, Serialize};

use super::DetectError;
use crate::record::{AlertRecord, RecordId};

/// Numeric record attributes usable as model features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    BytesTransferred,
    Hour,
    Level,
}

impl FeatureColumn {
    pub const DEFAULT: [FeatureColumn; 2] = [FeatureColumn::BytesTransferred, FeatureColumn::Hour];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::BytesTransferred => "bytes_transferred",
            FeatureColumn::Hour => "hour",
            FeatureColumn::Level => "level",
        }
    }

    pub fn extract(&self, record: &AlertRecord) -> Option<f64> {
        match self {
            FeatureColumn::BytesTransferred => record.bytes_transferred,
            FeatureColumn::Hour => Some(f64::from(record.hour)),
            FeatureColumn::Level => record.level.map(f64::from),
        }
    }

    /// Parse a comma-separated list such as `bytes_transferred,hour`.
    pub fn parse_list(s: &str) -> Result<Vec<FeatureColumn>, DetectError> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl std::str::FromStr for FeatureColumn {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bytes_transferred" | "bytes" => Ok(FeatureColumn::BytesTransferred),
            "hour" => Ok(FeatureColumn::Hour),
            "level" => Ok(FeatureColumn::Level),
            other => Err(DetectError::UnknownFeature {
                name: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Owned feature matrix. Rows line up with `ids`.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub columns: Vec<FeatureColumn>,
    pub ids: Vec<RecordId>,
    pub rows: Vec<Vec<f64>>,
    /// Records lacking at least one requested feature.
    pub unscored: Vec<RecordId>,
}

impl Projection {
    pub fn build<'a, I>(records: I, columns: &[FeatureColumn]) -> Self
    where
        I: IntoIterator<Item = &'a AlertRecord>,
    {
        let mut p = Projection {
            columns: columns.to_vec(),
            ..Default::default()
        };
        for record in records {
            let row: Option<Vec<f64>> = columns.iter().map(|c| c.extract(record)).collect();
            match row {
                Some(row) => {
                    p.ids.push(record.id);
                    p.rows.push(row);
                }
                None => p.unscored.push(record.id),
            }
        }
        p
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Columns whose spread is negligible relative to their magnitude.
    pub fn flat_columns(&self) -> Vec<FeatureColumn> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(j, _)| {
                let n = self.rows.len() as f64;
                if n == 0.0 {
                    return true;
                }
                let mean = self.rows.iter().map(|r| r[*j]).sum::<f64>() / n;
                let var = self.rows.iter().map(|r| (r[*j] - mean).powi(2)).sum::<f64>() / n;
                var.sqrt() <= 1e-9 * mean.abs().max(1.0)
            })
            .map(|(_, c)| *c)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{normalize, RawRow};

    #[test]
    fn test_parse_list() {
        assert_eq!(
            FeatureColumn::parse_list("bytes_transferred, hour").unwrap(),
            FeatureColumn::DEFAULT.to_vec()
        );
        assert_eq!(
            FeatureColumn::parse_list("level,packets"),
            Err(DetectError::UnknownFeature {
                name: "packets".to_string()
            })
        );
    }

    #[test]
    fn test_projection_skips_missing_features() {
        let records = normalize(vec![
            RawRow {
                row: 1,
                timestamp: "2024-03-01 04:00:00".into(),
                level: "3".into(),
                bytes_transferred: Some("100".into()),
                ..Default::default()
            },
            RawRow {
                row: 2,
                timestamp: "2024-03-01 05:00:00".into(),
                level: "3".into(),
                bytes_transferred: Some("n/a".into()),
                ..Default::default()
            },
        ])
        .records;

        let p = Projection::build(&records, &FeatureColumn::DEFAULT);
        assert_eq!(p.ids, vec![RecordId(1)]);
        assert_eq!(p.rows, vec![vec![100.0, 4.0]]);
        assert_eq!(p.unscored, vec![RecordId(2)]);
    }
}
