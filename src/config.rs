//! TOML configuration for alertscope.
//!
//! Layered: an explicit path, then the `ALERTSCOPE_CONFIG` environment
//! variable, then `./alertscope.toml`, then compiled-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::{FeatureColumn, ScoringParams};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ALERTSCOPE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "alertscope.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try the environment override, then the local file, then defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "ALERTSCOPE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(error = %e, "local config file could not be loaded, using defaults");
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Load from `path` when given, otherwise fall back through the layers.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::load_or_default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.params().validate()?;
        if self.scoring.features.is_empty() {
            anyhow::bail!("scoring.features must name at least one column");
        }
        if self.source.kind == SourceKind::Sqlite && self.source.table.trim().is_empty() {
            anyhow::bail!("source.table must be set for sqlite sources");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Csv,
    Sqlite,
}

/// Where alerts are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub path: PathBuf,
    /// Table name for sqlite sources.
    pub table: String,
    /// Wall-clock bound on one source read.
    pub read_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Csv,
            path: PathBuf::from("data/alerts.csv"),
            table: "alerts".to_string(),
            read_timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    /// Point at a different file, picking the kind from its extension.
    pub fn override_path(&mut self, path: &Path) {
        self.kind = match path.extension().and_then(|e| e.to_str()) {
            Some("db" | "sqlite" | "sqlite3") => SourceKind::Sqlite,
            _ => SourceKind::Csv,
        };
        self.path = path.to_path_buf();
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub contamination: f64,
    pub seed: u64,
    pub n_trees: usize,
    pub max_samples: usize,
    pub features: Vec<FeatureColumn>,
    /// Wall-clock bound on one model fit.
    pub fit_timeout_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let params = ScoringParams::default();
        Self {
            contamination: params.contamination,
            seed: params.seed,
            n_trees: params.n_trees,
            max_samples: params.max_samples,
            features: FeatureColumn::DEFAULT.to_vec(),
            fit_timeout_secs: 30,
        }
    }
}

impl ScoringConfig {
    pub fn params(&self) -> ScoringParams {
        ScoringParams {
            contamination: self.contamination,
            seed: self.seed,
            n_trees: self.n_trees,
            max_samples: self.max_samples,
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
