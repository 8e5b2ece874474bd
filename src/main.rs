use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use alertscope::analysis::{self, Analysis, AnalysisRequest};
use alertscope::config::{AppConfig, LogFormat};
use alertscope::detect::{FeatureColumn, ScoringStatus};
use alertscope::filter::FilterCriteria;
use alertscope::record::AnomalyLabel;
use alertscope::report::{self, ReportDocument, ReportFormat};
use alertscope::session::{self, Snapshot, SourceStatus};

#[derive(Parser)]
#[command(
    name = "alertscope",
    about = "Filter, aggregate and score exported security alerts",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $ALERTSCOPE_CONFIG, then ./alertscope.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Alert source file; overrides the configured one (.db/.sqlite selects SQLite)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the read-only HTTP API
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print summary statistics for the filtered alerts
    Summary {
        #[command(flatten)]
        filters: FilterArgs,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List the filtered alerts
    Alerts {
        #[command(flatten)]
        filters: FilterArgs,

        /// Maximum rows to print
        #[arg(long)]
        limit: Option<usize>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Score the filtered alerts and list the anomalous ones
    Anomalies {
        #[command(flatten)]
        filters: FilterArgs,

        /// Feature columns (bytes_transferred, hour, level)
        #[arg(long, value_delimiter = ',')]
        features: Vec<FeatureColumn>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Export a report document for the filtered alerts
    Report {
        #[command(flatten)]
        filters: FilterArgs,

        /// Output file path
        #[arg(long)]
        output: PathBuf,

        /// Output format: json or markdown
        #[arg(long, default_value = "json")]
        format: ReportFormat,
    },

    /// Load a CSV export into a SQLite table
    Import {
        /// CSV file to read
        #[arg(long)]
        csv: PathBuf,

        /// SQLite database to write
        #[arg(long)]
        db: PathBuf,

        /// Destination table
        #[arg(long, default_value = "alerts")]
        table: String,
    },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Accepted severity levels (repeatable or comma-separated)
    #[arg(long = "level", value_delimiter = ',')]
    levels: Vec<u8>,

    /// Accepted agent names (repeatable)
    #[arg(long = "agent")]
    agents: Vec<String>,

    /// Case-insensitive substring of the rule description
    #[arg(long)]
    keyword: Option<String>,
}

impl FilterArgs {
    fn criteria(&self) -> FilterCriteria {
        let mut criteria = FilterCriteria::default();
        if self.from.is_some() || self.to.is_some() {
            criteria = criteria.with_date_range(self.from, self.to);
        }
        if !self.levels.is_empty() {
            criteria = criteria.with_levels(self.levels.iter().copied());
        }
        if !self.agents.is_empty() {
            criteria = criteria.with_agents(self.agents.iter().cloned());
        }
        if let Some(k) = &self.keyword {
            criteria = criteria.with_keyword(k.clone());
        }
        criteria
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Read the configured source once, bounded by `source.read_timeout_secs`.
async fn load(config: &AppConfig) -> Result<Arc<Snapshot>> {
    let source = config.source.clone();
    let limit = Duration::from_secs(source.read_timeout_secs.max(1));
    let task = tokio::task::spawn_blocking(move || session::load_snapshot(&source));
    let snapshot = tokio::time::timeout(limit, task)
        .await
        .with_context(|| format!("source read exceeded {}s", limit.as_secs()))???;
    if let SourceStatus::Unavailable { reason } = &snapshot.status {
        eprintln!("warning: alert source unavailable ({}); continuing with no data", reason);
    }
    Ok(Arc::new(snapshot))
}

async fn analyze(
    config: &AppConfig,
    filters: &FilterArgs,
    features: Option<Vec<FeatureColumn>>,
    score: bool,
) -> Result<Analysis> {
    let snapshot = load(config).await?;
    let mut request = AnalysisRequest::from_config(config).with_criteria(filters.criteria());
    if let Some(features) = features {
        request.features = features;
    }
    request.score = score;
    Ok(analysis::run_bounded(snapshot, request).await)
}

fn print_summary(a: &Analysis) {
    let s = &a.summary;
    println!("\n=== Alert Summary ===");
    println!("{:<20} : {} (of {})", "Total Alerts", s.total, a.snapshot_total);
    println!("{:<20} : {}", "High Severity (>=7)", s.high_severity);
    println!("{:<20} : {}", "Unique Agents", s.unique_agents);
    println!("{:<20} : {}", "Average Severity", s.mean_severity_display());
    println!(
        "{:<20} : {}",
        "Most Active Agent",
        s.most_active_agent.as_deref().unwrap_or("N/A")
    );
    println!("{:<20} : {}", "Top Rule", s.top_rule.as_deref().unwrap_or("N/A"));

    let tiers = &a.aggregates.by_tier;
    if !tiers.is_empty() {
        println!("\nBy severity tier:");
        for g in &tiers.groups {
            println!("  {:<10} {}", g.key.to_string(), g.count);
        }
        if tiers.excluded > 0 {
            println!("  {:<10} {}", "(no level)", tiers.excluded);
        }
    }
    println!();
}

fn print_alerts(a: &Analysis, limit: Option<usize>) {
    if a.is_empty() {
        println!("No alerts match the given filters.");
        return;
    }
    println!(
        "{:<19} | {:<16} | {:<5} | Rule",
        "Timestamp", "Agent", "Level"
    );
    println!("{:-<19}-|-{:-<16}-|-{:-<5}-|-{:-<40}", "", "", "", "");
    let shown = limit.unwrap_or(usize::MAX);
    for r in a.records.iter().take(shown) {
        let level = r.level.map_or_else(|| "N/A".to_string(), |l| l.to_string());
        println!(
            "{:<19} | {:<16} | {:<5} | {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.agent_name,
            level,
            r.rule_description
        );
    }
    if a.records.len() > shown {
        println!("... {} more", a.records.len() - shown);
    }
}

fn print_anomalies(a: &Analysis) {
    let report = match &a.scoring {
        ScoringStatus::Scored(r) => r,
        ScoringStatus::NotScored { reason } => {
            println!("Anomaly scoring unavailable: {}", reason);
            return;
        }
        ScoringStatus::Skipped => {
            println!("Anomaly scoring was not requested.");
            return;
        }
    };

    let names: Vec<&str> = report.features.iter().map(|f| f.name()).collect();
    println!("\n=== Anomaly Scoring ===");
    println!("Features:   {}", names.join(", "));
    println!("Scored:     {}", report.labels.len());
    println!("Anomalies:  {}", report.anomaly_count());
    println!("Unscored:   {}", report.unscored.len());
    println!("Threshold:  {:.4}", report.threshold);

    if report.anomaly_count() > 0 {
        println!();
        println!(
            "{:<6} | {:<7} | {:<19} | {:<16} | Rule",
            "Row", "Score", "Timestamp", "Agent"
        );
        println!("{:-<6}-|-{:-<7}-|-{:-<19}-|-{:-<16}-|-{:-<30}", "", "", "", "", "");
        for r in &a.records {
            if report.label(r.id) != Some(AnomalyLabel::Anomaly) {
                continue;
            }
            let score = report.scores.get(&r.id).copied().unwrap_or_default();
            println!(
                "{:<6} | {:<7.4} | {:<19} | {:<16} | {}",
                r.id.to_string(),
                score,
                r.timestamp.format("%Y-%m-%d %H:%M:%S"),
                r.agent_name,
                r.rule_description
            );
        }
    }
    println!();
}

fn import(csv: &Path, db: &Path, table: &str) -> Result<usize> {
    let rows = alertscope::ingest::read_csv(csv)
        .with_context(|| format!("failed to read {}", csv.display()))?;
    let pool = alertscope::storage::open_pool(&db.to_string_lossy())?;
    alertscope::storage::import_rows(&pool, table, &rows)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    if let Some(source) = &cli.source {
        config.source.override_path(source);
    }
    init_tracing(&config);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting alertscope server");
            alertscope::serve(config).await?;
        }
        Commands::Summary { filters, json } => {
            let a = analyze(&config, &filters, None, false).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&a.summary)?);
            } else {
                print_summary(&a);
            }
        }
        Commands::Alerts {
            filters,
            limit,
            json,
        } => {
            let a = analyze(&config, &filters, None, false).await?;
            if json {
                let shown: Vec<_> = a.records.iter().take(limit.unwrap_or(usize::MAX)).collect();
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                print_alerts(&a, limit);
            }
        }
        Commands::Anomalies {
            filters,
            features,
            json,
        } => {
            let features = (!features.is_empty()).then_some(features);
            let a = analyze(&config, &filters, features, true).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&a.scoring)?);
            } else {
                print_anomalies(&a);
            }
        }
        Commands::Report {
            filters,
            output,
            format,
        } => {
            tracing::info!(output = %output.display(), ?format, "Exporting report");
            let a = analyze(&config, &filters, None, true).await?;
            let doc = ReportDocument::assemble(&a, Utc::now());
            report::export(&doc, &output, format)?;
            println!(
                "Report {} written to {} ({} alerts)",
                doc.id,
                output.display(),
                doc.alerts.len()
            );
        }
        Commands::Import { csv, db, table } => {
            tracing::info!(csv = %csv.display(), db = %db.display(), %table, "Importing alerts");
            let written = import(&csv, &db, &table)?;
            println!("Imported {} rows into {}:{}", written, db.display(), table);
        }
    }

    Ok(())
}
