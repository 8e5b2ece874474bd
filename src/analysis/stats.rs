//! Summary statistics over a record set.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::record::AlertRecord;

pub fn total_count<'a, I>(records: I) -> usize
where
    I: IntoIterator<Item = &'a AlertRecord>,
{
    records.into_iter().count()
}

/// Count of records with `level >= 7`.
pub fn high_severity_count<'a, I>(records: I) -> usize
where
    I: IntoIterator<Item = &'a AlertRecord>,
{
    records.into_iter().filter(|r| r.is_high_severity()).count()
}

pub fn unique_agent_count<'a, I>(records: I) -> usize
where
    I: IntoIterator<Item = &'a AlertRecord>,
{
    records
        .into_iter()
        .map(|r| r.agent_name.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Mean of the numeric levels. `None` when there are none.
pub fn mean_severity<'a, I>(records: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a AlertRecord>,
{
    let (sum, n) = records
        .into_iter()
        .filter_map(|r| r.level)
        .fold((0.0, 0usize), |(sum, n), l| (sum + f64::from(l), n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Most frequent value. Ties resolve to the value seen first.
fn mode<'a, I>(values: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    // value -> (count, first position)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, v) in values.into_iter().enumerate() {
        counts.entry(v).or_insert((0, pos)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, pa)), (_, (cb, pb))| ca.cmp(cb).then(pb.cmp(pa)))
        .map(|(v, _)| v)
}

pub fn mode_agent<'a, I>(records: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a AlertRecord>,
{
    mode(records.into_iter().map(|r| r.agent_name.as_str()))
}

pub fn mode_rule<'a, I>(records: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a AlertRecord>,
{
    mode(records.into_iter().map(|r| r.rule_description.as_str()))
}

/// All summary figures for one record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub high_severity: usize,
    pub unique_agents: usize,
    pub mean_severity: Option<f64>,
    pub most_active_agent: Option<String>,
    pub top_rule: Option<String>,
}

impl Summary {
    pub fn compute<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AlertRecord>,
        I::IntoIter: Clone,
    {
        let it = records.into_iter();
        Self {
            total: total_count(it.clone()),
            high_severity: high_severity_count(it.clone()),
            unique_agents: unique_agent_count(it.clone()),
            mean_severity: mean_severity(it.clone()),
            most_active_agent: mode_agent(it.clone()).map(str::to_string),
            top_rule: mode_rule(it).map(str::to_string),
        }
    }

    /// Mean severity for display: two decimals, or `N/A`.
    pub fn mean_severity_display(&self) -> String {
        match self.mean_severity {
            Some(m) => format!("{:.2}", m),
            None => "N/A".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{normalize, RawRow};

    fn records(rows: &[(&str, &str, &str)]) -> Vec<AlertRecord> {
        normalize(rows.iter().enumerate().map(|(i, (rule, agent, level))| RawRow {
            row: i as u64 + 1,
            timestamp: "2024-03-01 10:00:00".to_string(),
            rule_description: rule.to_string(),
            agent_name: agent.to_string(),
            level: level.to_string(),
            bytes_transferred: None,
        }))
        .records
    }

    #[test]
    fn test_counts() {
        let r = records(&[
            ("a", "web-01", "7"),
            ("b", "web-02", "6"),
            ("c", "web-01", "12"),
            ("d", "db-01", "bad"),
        ]);
        assert_eq!(total_count(&r), 4);
        assert_eq!(high_severity_count(&r), 2);
        assert_eq!(unique_agent_count(&r), 3);
    }

    #[test]
    fn test_mean_ignores_missing_levels() {
        let r = records(&[("a", "x", "2"), ("b", "x", "4"), ("c", "x", "?")]);
        assert_eq!(mean_severity(&r), Some(3.0));
        assert_eq!(mean_severity(&r[2..]), None);
        assert_eq!(mean_severity(&[] as &[AlertRecord]), None);
    }

    #[test]
    fn test_mode_tie_breaks_on_first_seen() {
        let r = records(&[
            ("rule-b", "zeta", "1"),
            ("rule-a", "alpha", "1"),
            ("rule-a", "alpha", "1"),
            ("rule-b", "zeta", "1"),
        ]);
        assert_eq!(mode_agent(&r), Some("zeta"));
        assert_eq!(mode_rule(&r), Some("rule-b"));
    }

    #[test]
    fn test_mode_prefers_higher_count() {
        let r = records(&[("x", "a", "1"), ("y", "b", "1"), ("y", "b", "1")]);
        assert_eq!(mode_agent(&r), Some("b"));
        assert_eq!(mode_rule(&r), Some("y"));
    }

    #[test]
    fn test_empty_summary() {
        let s = Summary::compute(&[] as &[AlertRecord]);
        assert_eq!(s.total, 0);
        assert_eq!(s.mean_severity, None);
        assert_eq!(s.most_active_agent, None);
        assert_eq!(s.mean_severity_display(), "N/A");
    }
}
