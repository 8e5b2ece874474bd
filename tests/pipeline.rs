//! End-to-end: CSV source -> engine -> analysis -> exported report.

use std::io::Write;
use std::sync::Arc;

use alertscope::analysis::{self, AggregateAxis, AnalysisRequest};
use alertscope::config::SourceConfig;
use alertscope::detect::ScoringStatus;
use alertscope::filter::FilterCriteria;
use alertscope::record::{AnomalyLabel, RecordId};
use alertscope::report::{self, ReportDocument, ReportFormat};
use alertscope::session::{Engine, SourceStatus};
use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::{NamedTempFile, TempDir};

/// Twenty alerts over four days; the last two are large night-time transfers.
fn write_source() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "timestamp,rule_description,agent_name,level,bytes_transferred").unwrap();
    for i in 0..18u32 {
        writeln!(
            file,
            "2024-03-{:02}T{:02}:10:00Z,{},{},{},{}",
            1 + i % 4,
            9 + i % 9,
            if i % 3 == 0 { "SSH authentication failure" } else { "Web attack blocked" },
            ["web-01", "web-02", "db-01"][(i % 3) as usize],
            2 + i % 10,
            120 + i * 25
        )
        .unwrap();
    }
    writeln!(file, "2024-03-04T03:00:00Z,Outbound transfer,db-01,12,88000").unwrap();
    writeln!(file, "2024-03-04T02:00:00Z,Outbound transfer,db-01,13,97000").unwrap();
    // Dropped at normalization, does not shift the ids above.
    writeln!(file, "yesterday,Garbage,web-01,3,1").unwrap();
    file.flush().unwrap();
    file
}

fn engine(file: &NamedTempFile) -> Arc<Engine> {
    let source = SourceConfig {
        path: file.path().to_path_buf(),
        ..Default::default()
    };
    Arc::new(Engine::open(source).unwrap())
}

#[test]
fn test_snapshot_load_with_diagnostics() {
    let file = write_source();
    let engine = engine(&file);
    let snap = engine.snapshot();
    assert_eq!(snap.status, SourceStatus::Loaded);
    assert_eq!(snap.len(), 20);
    assert_eq!(snap.diagnostics.len(), 1);
    assert_eq!(snap.diagnostics[0].row, 21);
}

#[test]
fn test_full_pass_flags_injected_transfers() {
    let file = write_source();
    let engine = engine(&file);
    let a = analysis::run(&engine.snapshot(), &AnalysisRequest::default());

    assert_eq!(a.summary.total, 20);
    for axis in AggregateAxis::ALL {
        let table = a.aggregates.get(axis);
        assert_eq!(table.grouped_total() + table.excluded, 20, "axis {:?}", axis);
    }

    let report = a.scoring.report().expect("scored");
    assert_eq!(report.anomaly_count(), 2);
    assert_eq!(report.label(RecordId(19)), Some(AnomalyLabel::Anomaly));
    assert_eq!(report.label(RecordId(20)), Some(AnomalyLabel::Anomaly));
}

#[test]
fn test_filtered_pass_is_consistent_with_filter() {
    let file = write_source();
    let engine = engine(&file);
    let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
    let criteria = FilterCriteria::default()
        .with_date_range(Some(day), Some(day))
        .with_keyword("WEB");
    let a = analysis::run(
        &engine.snapshot(),
        &AnalysisRequest::default().with_criteria(criteria),
    );

    assert!(!a.is_empty());
    assert!(a
        .records
        .iter()
        .all(|r| r.date == day && r.rule_description.contains("Web")));
    assert_eq!(a.summary.total, a.records.len());
}

#[tokio::test]
async fn test_bounded_pass_and_export() {
    let file = write_source();
    let engine = engine(&file);
    let a = analysis::run_bounded(engine.snapshot(), AnalysisRequest::default()).await;
    assert!(matches!(a.scoring, ScoringStatus::Scored(_)));

    let generated = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
    let doc = ReportDocument::assemble(&a, generated);
    assert_eq!(doc.charts.len(), 4);
    assert_eq!(doc.alerts.len(), 20);
    assert_eq!(doc.anomalies.anomalies, 2);

    let dir = TempDir::new().unwrap();
    let json_path = dir.path().join("report.json");
    report::export(&doc, &json_path, ReportFormat::Json).unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(parsed["overview"]["total_alerts"], 20);
    assert_eq!(parsed["title"], "Alert Analytics Report");
}

#[tokio::test]
async fn test_refresh_picks_up_appended_rows() {
    let mut file = write_source();
    let engine = engine(&file);
    let held = engine.snapshot();

    writeln!(file, "2024-03-05T10:00:00Z,New alert,web-03,7,300").unwrap();
    file.flush().unwrap();
    let fresh = engine.refresh_bounded().await.unwrap();

    assert_eq!(held.len(), 20);
    assert_eq!(fresh.len(), 21);
    let a = analysis::run(&fresh, &AnalysisRequest::default());
    assert_eq!(a.summary.unique_agents, 4);
}
