//! # Core Entities
//!
//! Affiliates, network entries and the per-level statistics computed from
//! them.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Widest network the persisted schema can hold (`level_1_*` .. `level_5_*`).
pub const MAX_SUPPORTED_LEVELS: u8 = 5;

/// Default traversal depth.
pub const DEFAULT_MAX_LEVELS: u8 = 5;

/// Internal numeric id of an affiliate in the reporting store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AffiliateId(pub i64);

impl fmt::Display for AffiliateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user in the external source system, in textual form.
///
/// The source stores ids as integers in some deployments and as strings in
/// others; everything here compares them as text.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExternalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExternalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An affiliate known to the reporting store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliate {
    pub id: AffiliateId,
    pub external_id: ExternalId,
    /// Distinct direct referrals, as counted by the last roster sync.
    pub total_clients: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One row of the source roster: a sponsor with at least one referral.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub external_id: ExternalId,
    pub total_clients: i64,
}

/// Accumulated money figures for a client or a level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Financials {
    pub deposits: Decimal,
    pub bets: Decimal,
    /// Gross gaming revenue.
    pub ggr: Decimal,
    /// Cost per acquisition.
    pub cpa: Decimal,
    /// Revenue share.
    pub rev: Decimal,
}

impl Financials {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign<&Financials> for Financials {
    fn add_assign(&mut self, other: &Financials) {
        self.deposits += other.deposits;
        self.bets += other.bets;
        self.ggr += other.ggr;
        self.cpa += other.cpa;
        self.rev += other.rev;
    }
}

/// A client reached from a root affiliate at a given depth.
///
/// `path` runs from the root to the direct sponsor, so `path.len() == level`
/// and `path.last() == Some(&direct_sponsor)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub client_id: ExternalId,
    pub level: u8,
    pub path: Vec<ExternalId>,
    pub direct_sponsor: ExternalId,
    #[serde(default)]
    pub financials: Financials,
}

/// Level -> entries mapping produced by one traversal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkForest {
    root: ExternalId,
    max_levels: u8,
    levels: BTreeMap<u8, Vec<NetworkEntry>>,
}

impl NetworkForest {
    pub fn new(root: ExternalId, max_levels: u8) -> Self {
        Self {
            root,
            max_levels,
            levels: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &ExternalId {
        &self.root
    }

    pub fn max_levels(&self) -> u8 {
        self.max_levels
    }

    pub(crate) fn push(&mut self, entry: NetworkEntry) {
        self.levels.entry(entry.level).or_default().push(entry);
    }

    /// Entries recorded at `level`, in discovery order.
    pub fn level(&self, level: u8) -> &[NetworkEntry] {
        self.levels.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn levels(&self) -> &BTreeMap<u8, Vec<NetworkEntry>> {
        &self.levels
    }

    /// All entries, level by level.
    pub fn entries(&self) -> impl Iterator<Item = &NetworkEntry> {
        self.levels.values().flatten()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut NetworkEntry> {
        self.levels.values_mut().flatten()
    }

    pub fn len(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct client ids, sorted.
    pub fn client_ids(&self) -> Vec<ExternalId> {
        let mut ids: Vec<ExternalId> = self.entries().map(|e| e.client_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Count and money sums for one level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelStats {
    pub level: u8,
    pub count: u64,
    pub financials: Financials,
}

/// Aggregated view of one affiliate's network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_network_size: u64,
    /// One element per level, `levels[i].level == i + 1`.
    pub levels: Vec<LevelStats>,
}

impl NetworkStats {
    /// Stats for a network with no entries.
    pub fn empty(max_levels: u8) -> Self {
        Self {
            total_network_size: 0,
            levels: (1..=max_levels)
                .map(|level| LevelStats {
                    level,
                    ..LevelStats::default()
                })
                .collect(),
        }
    }

    pub fn level(&self, level: u8) -> Option<&LevelStats> {
        self.levels.iter().find(|l| l.level == level)
    }

    /// Count at `level`, zero for levels beyond the computed depth.
    pub fn count_at(&self, level: u8) -> u64 {
        self.level(level).map(|l| l.count).unwrap_or(0)
    }

    /// Financial sums at `level`, zero for levels beyond the computed depth.
    pub fn financials_at(&self, level: u8) -> Financials {
        self.level(level).map(|l| l.financials).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn entry(client: &str, level: u8) -> NetworkEntry {
        NetworkEntry {
            client_id: ExternalId::from(client),
            level,
            path: (0..level).map(|i| ExternalId::new(format!("p{i}"))).collect(),
            direct_sponsor: ExternalId::new(format!("p{}", level - 1)),
            financials: Financials::default(),
        }
    }

    #[test]
    fn test_forest_groups_by_level() {
        let mut forest = NetworkForest::new(ExternalId::from("root"), 5);
        forest.push(entry("a", 1));
        forest.push(entry("b", 2));
        forest.push(entry("c", 1));

        assert_eq!(forest.len(), 3);
        assert_eq!(forest.level(1).len(), 2);
        assert_eq!(forest.level(1)[1].client_id.as_str(), "c");
        assert!(forest.level(3).is_empty());
    }

    #[test]
    fn test_client_ids_are_deduplicated() {
        let mut forest = NetworkForest::new(ExternalId::from("root"), 5);
        forest.push(entry("x", 1));
        forest.push(entry("x", 2));

        assert_eq!(forest.client_ids(), vec![ExternalId::from("x")]);
    }

    #[test]
    fn test_financials_add_assign() {
        let mut total = Financials::default();
        let one = Financials {
            deposits: Decimal::new(1050, 2),
            bets: Decimal::ONE,
            ..Financials::default()
        };
        total += &one;
        total += &one;

        assert_eq!(total.deposits, Decimal::new(2100, 2));
        assert_eq!(total.bets, Decimal::from(2));
        assert!(!total.is_zero());
    }

    #[test]
    fn test_empty_stats_has_one_row_per_level() {
        let stats = NetworkStats::empty(3);
        assert_eq!(stats.levels.len(), 3);
        assert_eq!(stats.levels[2].level, 3);
        assert_eq!(stats.count_at(5), 0);
    }
}
