use std::fmt::Write;

use super::ReportDocument;

pub fn render_json(doc: &ReportDocument) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(doc)
}

/// Pipes and newlines would break table cells.
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\r', '\n'], " ")
}

pub fn render_markdown(doc: &ReportDocument) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_markdown(&mut out, doc);
    out
}

fn write_markdown(out: &mut String, doc: &ReportDocument) -> std::fmt::Result {
    writeln!(out, "# {}", doc.title)?;
    writeln!(out)?;
    writeln!(
        out,
        "_Report {} generated {}_",
        doc.id,
        doc.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(out)?;

    writeln!(out, "## Overview")?;
    writeln!(out)?;
    writeln!(out, "- Total Alerts: {}", doc.overview.total_alerts)?;
    writeln!(out, "- High Severity (>=7): {}", doc.overview.high_severity)?;
    writeln!(out, "- Unique Agents: {}", doc.overview.unique_agents)?;
    writeln!(out)?;

    writeln!(out, "## Summary")?;
    writeln!(out)?;
    writeln!(out, "- Average Severity: {}", doc.summary.average_severity)?;
    writeln!(out, "- Most Active Agent: {}", doc.summary.most_active_agent)?;
    writeln!(out, "- Top Rule: {}", doc.summary.top_rule)?;
    writeln!(out)?;

    writeln!(out, "## Charts")?;
    writeln!(out)?;
    if doc.charts.is_empty() {
        writeln!(out, "No chart data.")?;
        writeln!(out)?;
    }
    for chart in &doc.charts {
        writeln!(out, "### {}", chart.title)?;
        writeln!(out)?;
        writeln!(out, "| {} | count |", chart.x_label)?;
        writeln!(out, "|---|---:|")?;
        for (label, count) in &chart.points {
            writeln!(out, "| {} | {} |", cell(label), count)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Anomalies")?;
    writeln!(out)?;
    writeln!(
        out,
        "- Scored: {}, Anomalies: {}, Unscored: {}",
        doc.anomalies.scored, doc.anomalies.anomalies, doc.anomalies.unscored
    )?;
    if let Some(note) = &doc.anomalies.note {
        writeln!(out, "- Note: {}", note)?;
    }
    writeln!(out)?;

    writeln!(out, "## Alerts Table")?;
    writeln!(out)?;
    writeln!(out, "| Timestamp | Rule Description | Agent Name | Severity Level | Anomaly |")?;
    writeln!(out, "|---|---|---|---:|---|")?;
    for row in &doc.alerts {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            row.timestamp,
            cell(&row.rule_description),
            cell(&row.agent_name),
            row.severity_level,
            row.anomaly.as_deref().unwrap_or("-")
        )?;
    }
    Ok(())
}
