//! Query-string parsing into engine types.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::detect::FeatureColumn;
use crate::filter::FilterCriteria;

/// Filter and scoring parameters accepted by the analysis endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Comma-separated levels.
    pub levels: Option<String>,
    /// Comma-separated agent names.
    pub agents: Option<String>,
    pub keyword: Option<String>,
    /// Comma-separated feature columns.
    pub features: Option<String>,
    pub limit: Option<usize>,
}

fn parse_date(name: &str, raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid {} date '{}', expected YYYY-MM-DD", name, raw))
}

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().filter(|s| !s.trim().is_empty())
}

fn split(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl AnalysisQuery {
    pub fn criteria(&self) -> Result<FilterCriteria, String> {
        let mut criteria = FilterCriteria::default();

        let from = non_empty(&self.from).map(|d| parse_date("from", d)).transpose()?;
        let to = non_empty(&self.to).map(|d| parse_date("to", d)).transpose()?;
        if from.is_some() || to.is_some() {
            criteria = criteria.with_date_range(from, to);
        }

        // An empty list (`levels=`) is the same as leaving the parameter out.
        if let Some(raw) = &self.levels {
            let levels = split(raw)
                .map(|l| l.parse::<u8>().map_err(|_| format!("invalid level '{}'", l)))
                .collect::<Result<Vec<_>, _>>()?;
            if !levels.is_empty() {
                criteria = criteria.with_levels(levels);
            }
        }

        if let Some(raw) = &self.agents {
            let agents: Vec<&str> = split(raw).collect();
            if !agents.is_empty() {
                criteria = criteria.with_agents(agents);
            }
        }

        if let Some(k) = &self.keyword {
            criteria = criteria.with_keyword(k.clone());
        }

        Ok(criteria)
    }

    /// Requested features, or `None` to use the configured ones.
    pub fn features(&self) -> Result<Option<Vec<FeatureColumn>>, String> {
        match &self.features {
            None => Ok(None),
            Some(raw) => FeatureColumn::parse_list(raw)
                .map(Some)
                .map_err(|e| e.to_string()),
        }
    }
}
