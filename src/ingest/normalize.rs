//! Raw row -> `AlertRecord` conversion.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use serde::Serialize;
use tracing::{debug, warn};

use super::RawRow;
use crate::record::{AlertRecord, RecordId, SeverityTier};

/// Outcome of normalizing a batch.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<AlertRecord>,
    pub diagnostics: Vec<RowDiagnostic>,
}

impl Normalized {
    /// True when no usable records came out of the batch.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.issue.drops_row()).count()
    }
}

/// A per-row problem found during normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiagnostic {
    pub row: u64,
    pub issue: RowIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RowIssue {
    /// Row was dropped.
    InvalidTimestamp(String),
    /// Level kept as missing.
    NonNumericLevel(String),
    /// Non-numeric, non-finite or negative bytes, kept as missing.
    NonNumericBytes(String),
}

impl RowIssue {
    pub fn drops_row(&self) -> bool {
        matches!(self, RowIssue::InvalidTimestamp(_))
    }
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    let utc = FixedOffset::east_opt(0)?;
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| utc.from_utc_datetime(&naive))
}

/// Coerce a level cell to an integral severity. Fractional, negative or
/// out-of-range values are treated as non-numeric.
pub fn parse_level(raw: &str) -> Option<u8> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<u8>() {
        return Some(v);
    }
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(&v) {
        Some(v as u8)
    } else {
        None
    }
}

/// A byte count is a finite, non-negative number.
fn parse_bytes(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Normalize raw rows into typed records.
///
/// Pure with respect to its input. Rows with an unparseable timestamp are
/// dropped; bad levels or byte counts are kept as missing. Every issue is
/// reported in `diagnostics`.
pub fn normalize<I>(rows: I) -> Normalized
where
    I: IntoIterator<Item = RawRow>,
{
    let mut out = Normalized::default();

    for raw in rows {
        let Some(timestamp) = parse_timestamp(&raw.timestamp) else {
            debug!(row = raw.row, value = %raw.timestamp, "dropping row with invalid timestamp");
            out.diagnostics.push(RowDiagnostic {
                row: raw.row,
                issue: RowIssue::InvalidTimestamp(raw.timestamp),
            });
            continue;
        };

        let level = parse_level(&raw.level);
        if level.is_none() {
            out.diagnostics.push(RowDiagnostic {
                row: raw.row,
                issue: RowIssue::NonNumericLevel(raw.level.clone()),
            });
        }

        let bytes_transferred = match raw.bytes_transferred.as_deref() {
            None => Some(0.0),
            Some(cell) => {
                let parsed = parse_bytes(cell);
                if parsed.is_none() {
                    out.diagnostics.push(RowDiagnostic {
                        row: raw.row,
                        issue: RowIssue::NonNumericBytes(cell.to_string()),
                    });
                }
                parsed
            }
        };

        out.records.push(AlertRecord {
            id: RecordId(raw.row),
            date: timestamp.date_naive(),
            hour: timestamp.hour(),
            timestamp,
            rule_description: raw.rule_description,
            agent_name: raw.agent_name,
            level,
            bytes_transferred,
            severity_tier: level.map(SeverityTier::from_level),
        });
    }

    if !out.diagnostics.is_empty() {
        warn!(
            dropped = out.dropped(),
            issues = out.diagnostics.len(),
            kept = out.records.len(),
            "normalization reported row issues"
        );
    }

    out
}
