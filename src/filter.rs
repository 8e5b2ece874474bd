//! Compound record filtering.
//!
//! A `FilterCriteria` is a conjunction of independently-optional predicates.
//! Applying it never mutates the source; the result is a borrowed view.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::AlertRecord;

/// Inclusive date bounds. A missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub date_range: Option<DateRange>,
    pub severity_set: Option<BTreeSet<u8>>,
    pub agent_set: Option<BTreeSet<String>>,
    pub keyword: Option<String>,
}

impl FilterCriteria {
    pub fn with_date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    pub fn with_levels<I: IntoIterator<Item = u8>>(mut self, levels: I) -> Self {
        self.severity_set = Some(levels.into_iter().collect());
        self
    }

    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agent_set = Some(agents.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// True when no predicate constrains anything.
    pub fn is_unconstrained(&self) -> bool {
        self.date_range.is_none()
            && self.severity_set.is_none()
            && self.agent_set.is_none()
            && self.needle().is_none()
    }

    /// Lowercased keyword, or `None` when absent or empty. Whitespace is
    /// matched literally.
    fn needle(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
    }

    fn matches(&self, record: &AlertRecord, needle: Option<&str>) -> bool {
        if let Some(range) = &self.date_range {
            if !range.contains(record.date) {
                return false;
            }
        }
        if let Some(levels) = &self.severity_set {
            match record.level {
                Some(level) if levels.contains(&level) => {}
                _ => return false,
            }
        }
        if let Some(agents) = &self.agent_set {
            if !agents.contains(&record.agent_name) {
                return false;
            }
        }
        if let Some(needle) = needle {
            if !record.rule_description.to_lowercase().contains(needle) {
                return false;
            }
        }
        true
    }
}

/// Read-only selection over a record slice, in source order.
#[derive(Debug, Clone)]
pub struct AlertView<'a> {
    records: Vec<&'a AlertRecord>,
}

impl<'a> AlertView<'a> {
    /// A view over every record.
    pub fn all(records: &'a [AlertRecord]) -> Self {
        Self {
            records: records.iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, &'a AlertRecord>> {
        self.records.iter().copied()
    }

    /// Narrow this view further. Same result as applying both criteria
    /// together to the underlying records.
    pub fn refine(&self, criteria: &FilterCriteria) -> AlertView<'a> {
        let needle = criteria.needle();
        AlertView {
            records: self
                .iter()
                .filter(|r| criteria.matches(r, needle.as_deref()))
                .collect(),
        }
    }

    pub fn to_records(&self) -> Vec<AlertRecord> {
        self.iter().cloned().collect()
    }
}

impl<'v, 'a> IntoIterator for &'v AlertView<'a> {
    type Item = &'a AlertRecord;
    type IntoIter = std::iter::Copied<std::slice::Iter<'v, &'a AlertRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Select the records matching every present predicate.
pub fn apply<'a>(records: &'a [AlertRecord], criteria: &FilterCriteria) -> AlertView<'a> {
    if criteria.is_unconstrained() {
        return AlertView::all(records);
    }
    AlertView::all(records).refine(criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{normalize, RawRow};

    fn fixture() -> Vec<AlertRecord> {
        let rows = [
            ("2024-03-01 09:00:00", "SSH authentication failed", "web-01", "5"),
            ("2024-03-01 12:00:00", "Port scan detected", "db-01", "9"),
            ("2024-03-02 08:00:00", "ssh brute force", "web-01", "10"),
            ("2024-03-03 17:00:00", "File integrity changed", "db-01", "3"),
            ("2024-03-04 02:00:00", "Unknown severity", "web-02", "?"),
        ];
        normalize(rows.iter().enumerate().map(|(i, (ts, rule, agent, level))| RawRow {
            row: i as u64 + 1,
            timestamp: ts.to_string(),
            rule_description: rule.to_string(),
            agent_name: agent.to_string(),
            level: level.to_string(),
            bytes_transferred: None,
        }))
        .records
    }

    fn ids(view: &AlertView<'_>) -> Vec<u64> {
        view.iter().map(|r| r.id.0).collect()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_empty_criteria_is_identity() {
        let records = fixture();
        let view = apply(&records, &FilterCriteria::default());
        assert_eq!(view.len(), records.len());
    }

    #[test]
    fn test_date_range_inclusive() {
        let records = fixture();
        let c = FilterCriteria::default().with_date_range(Some(date(2)), Some(date(3)));
        assert_eq!(ids(&apply(&records, &c)), vec![3, 4]);

        let open_start = FilterCriteria::default().with_date_range(None, Some(date(1)));
        assert_eq!(ids(&apply(&records, &open_start)), vec![1, 2]);
    }

    #[test]
    fn test_severity_set_skips_missing_levels() {
        let records = fixture();
        let all_levels = FilterCriteria::default().with_levels(0..=15);
        assert_eq!(ids(&apply(&records, &all_levels)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_keyword_is_case_insensitive() {
        let records = fixture();
        let c = FilterCriteria::default().with_keyword("SSH");
        assert_eq!(ids(&apply(&records, &c)), vec![1, 3]);
    }

    #[test]
    fn test_empty_keyword_is_no_constraint() {
        let records = fixture();
        let c = FilterCriteria::default().with_keyword("");
        assert!(c.is_unconstrained());
        assert_eq!(apply(&records, &c).len(), records.len());
    }

    #[test]
    fn test_whitespace_keyword_is_a_literal_search() {
        let records = fixture();
        let double = FilterCriteria::default().with_keyword("  ");
        assert!(!double.is_unconstrained());
        assert!(apply(&records, &double).is_empty());

        let single = FilterCriteria::default().with_keyword(" ");
        assert_eq!(apply(&records, &single).len(), records.len());
    }

    #[test]
    fn test_filters_commute() {
        let records = fixture();
        let sev = FilterCriteria::default().with_levels([5, 9, 10]);
        let agent = FilterCriteria::default().with_agents(["web-01"]);

        let a = apply(&records, &sev).refine(&agent);
        let b = apply(&records, &agent).refine(&sev);
        let combined = apply(&records, &sev.clone().with_agents(["web-01"]));
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(ids(&a), ids(&combined));
        assert_eq!(ids(&a), vec![1, 3]);
    }

    #[test]
    fn test_result_is_subset_of_source() {
        let records = fixture();
        let c = FilterCriteria::default()
            .with_agents(["db-01", "web-02"])
            .with_keyword("e");
        let view = apply(&records, &c);
        assert!(view.iter().all(|r| records.contains(r)));
    }

    #[test]
    fn test_excluding_everything_is_empty_not_error() {
        let records = fixture();
        let c = FilterCriteria::default().with_date_range(Some(date(20)), Some(date(21)));
        assert!(apply(&records, &c).is_empty());
    }
}
