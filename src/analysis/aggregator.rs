use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::{AlertRecord, SeverityTier};

/// Grouping dimension of an aggregate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateAxis {
    Level,
    Agent,
    Tier,
    Date,
}

impl AggregateAxis {
    pub const ALL: [AggregateAxis; 4] = [
        AggregateAxis::Level,
        AggregateAxis::Agent,
        AggregateAxis::Tier,
        AggregateAxis::Date,
    ];

    fn key(&self, record: &AlertRecord) -> Option<GroupKey> {
        match self {
            AggregateAxis::Level => record.level.map(GroupKey::Level),
            AggregateAxis::Agent => Some(GroupKey::Agent(record.agent_name.clone())),
            AggregateAxis::Tier => record.severity_tier.map(GroupKey::Tier),
            AggregateAxis::Date => Some(GroupKey::Date(record.date)),
        }
    }
}

impl std::str::FromStr for AggregateAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "level" | "severity" => Ok(AggregateAxis::Level),
            "agent" | "agent_name" => Ok(AggregateAxis::Agent),
            "tier" | "severity_tier" => Ok(AggregateAxis::Tier),
            "date" => Ok(AggregateAxis::Date),
            other => Err(format!("unknown aggregate axis '{}'", other)),
        }
    }
}

/// Value of a group within one axis. Tables only ever hold one variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum GroupKey {
    Level(u8),
    Agent(String),
    Tier(SeverityTier),
    Date(NaiveDate),
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Level(l) => write!(f, "{}", l),
            GroupKey::Agent(a) => write!(f, "{}", a),
            GroupKey::Tier(t) => write!(f, "{}", t),
            GroupKey::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: GroupKey,
    pub count: usize,
}

/// Grouped counts along one axis, ordered by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    pub axis: AggregateAxis,
    pub groups: Vec<GroupCount>,
    /// Records with no value on this axis (missing level for `Level`/`Tier`).
    pub excluded: usize,
}

impl AggregateResult {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sum of group counts, excluding `excluded`.
    pub fn grouped_total(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }
}

/// Count records per distinct value of `axis`. No zero-count padding.
pub fn aggregate<'a, I>(records: I, axis: AggregateAxis) -> AggregateResult
where
    I: IntoIterator<Item = &'a AlertRecord>,
{
    let mut counts: BTreeMap<GroupKey, usize> = BTreeMap::new();
    let mut excluded = 0;
    for record in records {
        match axis.key(record) {
            Some(key) => *counts.entry(key).or_default() += 1,
            None => excluded += 1,
        }
    }
    AggregateResult {
        axis,
        groups: counts
            .into_iter()
            .map(|(key, count)| GroupCount { key, count })
            .collect(),
        excluded,
    }
}

/// The four chart tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateSet {
    pub by_level: AggregateResult,
    pub by_agent: AggregateResult,
    pub by_tier: AggregateResult,
    pub by_date: AggregateResult,
}

impl AggregateSet {
    pub fn compute<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AlertRecord>,
        I::IntoIter: Clone,
    {
        let it = records.into_iter();
        Self {
            by_level: aggregate(it.clone(), AggregateAxis::Level),
            by_agent: aggregate(it.clone(), AggregateAxis::Agent),
            by_tier: aggregate(it.clone(), AggregateAxis::Tier),
            by_date: aggregate(it, AggregateAxis::Date),
        }
    }

    pub fn get(&self, axis: AggregateAxis) -> &AggregateResult {
        match axis {
            AggregateAxis::Level => &self.by_level,
            AggregateAxis::Agent => &self.by_agent,
            AggregateAxis::Tier => &self.by_tier,
            AggregateAxis::Date => &self.by_date,
        }
    }
}
