//! Report assembly and export.
//!
//! The assembler only reshapes an already-computed `Analysis`; nothing is
//! recomputed at export time.

mod render;

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::analysis::{AggregateResult, Analysis};
use crate::detect::ScoringStatus;

pub use self::render::{render_json, render_markdown};

pub const REPORT_TITLE: &str = "Alert Analytics Report";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("output directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Json,
    Markdown,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Pie,
    Line,
}

/// Renderable figure description. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    pub x_label: String,
    pub points: Vec<(String, usize)>,
}

impl ChartSpec {
    fn from_table(title: &str, kind: ChartKind, x_label: &str, table: &AggregateResult) -> Self {
        Self {
            title: title.to_string(),
            kind,
            x_label: x_label.to_string(),
            points: table
                .groups
                .iter()
                .map(|g| (g.key.to_string(), g.count))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_alerts: usize,
    pub high_severity: usize,
    pub unique_agents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarySection {
    pub average_severity: String,
    pub most_active_agent: String,
    pub top_rule: String,
}

/// Display row for the alerts table. Derived; never written back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub timestamp: String,
    pub rule_description: String,
    pub agent_name: String,
    pub severity_level: String,
    pub anomaly: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalySection {
    pub scored: usize,
    pub anomalies: usize,
    pub unscored: usize,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub id: Uuid,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub overview: Overview,
    pub summary: SummarySection,
    pub charts: Vec<ChartSpec>,
    pub anomalies: AnomalySection,
    pub alerts: Vec<ReportRow>,
}

impl ReportDocument {
    pub fn assemble(analysis: &Analysis, generated_at: DateTime<Utc>) -> Self {
        let s = &analysis.summary;
        let na = || "N/A".to_string();

        let charts = if analysis.is_empty() {
            Vec::new()
        } else {
            let a = &analysis.aggregates;
            vec![
                ChartSpec::from_table("Alerts by Severity", ChartKind::Bar, "level", &a.by_level),
                ChartSpec::from_table("Alerts by Agent", ChartKind::Bar, "agent_name", &a.by_agent),
                ChartSpec::from_table("Severity Breakdown", ChartKind::Pie, "severity_tier", &a.by_tier),
                ChartSpec::from_table("Alerts Over Time", ChartKind::Line, "date", &a.by_date),
            ]
        };

        let report = analysis.scoring.report();
        let anomalies = match &analysis.scoring {
            ScoringStatus::Scored(r) => AnomalySection {
                scored: r.labels.len(),
                anomalies: r.anomaly_count(),
                unscored: r.unscored.len(),
                note: None,
            },
            ScoringStatus::NotScored { reason } => AnomalySection {
                scored: 0,
                anomalies: 0,
                unscored: analysis.records.len(),
                note: Some(format!("not scored: {}", reason)),
            },
            ScoringStatus::Skipped => AnomalySection {
                scored: 0,
                anomalies: 0,
                unscored: analysis.records.len(),
                note: Some("scoring not requested".to_string()),
            },
        };

        let alerts = analysis
            .records
            .iter()
            .map(|r| ReportRow {
                timestamp: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                rule_description: r.rule_description.clone(),
                agent_name: r.agent_name.clone(),
                severity_level: r.level.map_or_else(na, |l| l.to_string()),
                anomaly: report.and_then(|rep| rep.label(r.id)).map(|l| l.to_string()),
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            title: REPORT_TITLE.to_string(),
            generated_at,
            overview: Overview {
                total_alerts: s.total,
                high_severity: s.high_severity,
                unique_agents: s.unique_agents,
            },
            summary: SummarySection {
                average_severity: s.mean_severity_display(),
                most_active_agent: s.most_active_agent.clone().unwrap_or_else(na),
                top_rule: s.top_rule.clone().unwrap_or_else(na),
            },
            charts,
            anomalies,
            alerts,
        }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, ExportError> {
        match format {
            ReportFormat::Json => Ok(render_json(self)?),
            ReportFormat::Markdown => Ok(render_markdown(self)),
        }
    }
}

/// Write `doc` to `path` atomically.
///
/// The content goes to a temporary file in the target directory which is
/// then renamed over `path`. On any failure the temporary file is removed
/// and `path` is left as it was.
pub fn export(doc: &ReportDocument, path: &Path, format: ReportFormat) -> Result<(), ExportError> {
    let body = doc.render(format)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Err(ExportError::MissingDirectory(dir));
    }

    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(body.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    info!(path = %path.display(), ?format, rows = doc.alerts.len(), "report exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{run, AnalysisRequest};
    use crate::filter::FilterCriteria;
    use crate::ingest::{normalize, RawRow};
    use crate::session::Snapshot;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn analysis(criteria: FilterCriteria) -> Analysis {
        let rows = [
            ("2024-03-01 10:00:00", "SSH login failed", "web-01", "5", "200"),
            ("2024-03-01 11:30:00", "Port scan", "db-01", "9", "350"),
            ("2024-03-02 09:15:00", "SSH login failed", "web-01", "x", "180"),
        ];
        let n = normalize(rows.iter().enumerate().map(|(i, (ts, rule, agent, level, bytes))| RawRow {
            row: i as u64 + 1,
            timestamp: ts.to_string(),
            rule_description: rule.to_string(),
            agent_name: agent.to_string(),
            level: level.to_string(),
            bytes_transferred: Some(bytes.to_string()),
        }));
        let snap = Snapshot::from_records(n.records, n.diagnostics);
        run(&snap, &AnalysisRequest::default().with_criteria(criteria))
    }

    #[test]
    fn test_assemble_sections() {
        let doc = ReportDocument::assemble(&analysis(FilterCriteria::default()), Utc::now());
        assert_eq!(doc.overview.total_alerts, 3);
        assert_eq!(doc.overview.high_severity, 1);
        assert_eq!(doc.summary.average_severity, "7.00");
        assert_eq!(doc.summary.most_active_agent, "web-01");
        assert_eq!(doc.summary.top_rule, "SSH login failed");
        assert_eq!(doc.charts.len(), 4);
        assert_eq!(doc.charts[2].kind, ChartKind::Pie);
        assert_eq!(doc.alerts[1].timestamp, "2024-03-01 11:30:00");
        assert_eq!(doc.alerts[2].severity_level, "N/A");
        assert_eq!(doc.anomalies.scored, 3);
    }

    #[test]
    fn test_empty_analysis_has_no_charts() {
        let far = NaiveDate::from_ymd_opt(2031, 1, 1).unwrap();
        let doc = ReportDocument::assemble(
            &analysis(FilterCriteria::default().with_date_range(Some(far), None)),
            Utc::now(),
        );
        assert!(doc.charts.is_empty());
        assert!(doc.alerts.is_empty());
        assert_eq!(doc.summary.average_severity, "N/A");
        assert_eq!(doc.summary.most_active_agent, "N/A");
        assert!(doc.anomalies.note.is_some());
    }

    #[test]
    fn test_export_writes_both_formats() {
        let dir = TempDir::new().unwrap();
        let doc = ReportDocument::assemble(&analysis(FilterCriteria::default()), Utc::now());

        let json_path = dir.path().join("report.json");
        export(&doc, &json_path, ReportFormat::Json).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed["overview"]["total_alerts"], 3);

        let md_path = dir.path().join("report.md");
        export(&doc, &md_path, ReportFormat::Markdown).unwrap();
        let md = std::fs::read_to_string(&md_path).unwrap();
        assert!(md.starts_with("# Alert Analytics Report"));

        // only the two reports, no leftover temp files
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_export_failure_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let doc = ReportDocument::assemble(&analysis(FilterCriteria::default()), Utc::now());

        let missing = dir.path().join("nope").join("report.json");
        assert!(matches!(
            export(&doc, &missing, ReportFormat::Json),
            Err(ExportError::MissingDirectory(_))
        ));

        // target is a directory: rename fails after the temp file was written
        let target = dir.path().join("occupied");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();
        assert!(matches!(
            export(&doc, &target, ReportFormat::Json),
            Err(ExportError::Io { .. })
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("md".parse::<ReportFormat>(), Ok(ReportFormat::Markdown));
        assert!("docx".parse::<ReportFormat>().is_err());
    }
}
