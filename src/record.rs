//! Normalized alert records and the values derived from them.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Level at or above which an alert counts as high severity.
pub const HIGH_SEVERITY_LEVEL: u8 = 7;

/// Level at or above which an alert counts as medium severity.
pub const MEDIUM_SEVERITY_LEVEL: u8 = 4;

/// Stable identifier of a record: the 1-based ordinal of its data row in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse severity bucket derived from the numeric level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeverityTier {
    Low,
    Medium,
    High,
}

impl SeverityTier {
    pub fn from_level(level: u8) -> Self {
        if level >= HIGH_SEVERITY_LEVEL {
            SeverityTier::High
        } else if level >= MEDIUM_SEVERITY_LEVEL {
            SeverityTier::Medium
        } else {
            SeverityTier::Low
        }
    }
}

impl std::fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeverityTier::Low => write!(f, "Low"),
            SeverityTier::Medium => write!(f, "Medium"),
            SeverityTier::High => write!(f, "High"),
        }
    }
}

/// One ingested security event with its derived fields.
///
/// Records are immutable once normalized. Every stage downstream of the
/// normalizer reads them through shared references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub id: RecordId,
    pub timestamp: DateTime<FixedOffset>,
    pub rule_description: String,
    pub agent_name: String,
    /// `None` when the source value was not an integral number.
    pub level: Option<u8>,
    /// `None` when the source cell held something non-numeric.
    pub bytes_transferred: Option<f64>,
    pub date: NaiveDate,
    pub hour: u32,
    /// `None` exactly when `level` is `None`.
    pub severity_tier: Option<SeverityTier>,
}

impl AlertRecord {
    pub fn is_high_severity(&self) -> bool {
        self.level.is_some_and(|l| l >= HIGH_SEVERITY_LEVEL)
    }
}

/// Binary classification attached to a scored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyLabel {
    Normal,
    Anomaly,
}

impl std::fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyLabel::Normal => write!(f, "Normal"),
            AnomalyLabel::Anomaly => write!(f, "Anomaly"),
        }
    }
}
