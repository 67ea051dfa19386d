//! # Network Traversal
//!
//! Depth-first expansion of a root affiliate's referral tree, bounded by a
//! maximum depth.
//!
//! ## Guards
//!
//! - A client already on the current path is skipped (cycle guard).
//! - A `(sponsor, client, level)` triple already recorded in this run is
//!   skipped (diamond guard).
//!
//! The same client may still appear on several levels, or twice on one
//! level under different sponsors: every distinct chain is a distinct entry.
//!
//! The walk keeps an explicit stack of frames instead of recursing, and
//! visits children in exactly the order a recursive walk would.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};

use crate::domain::{
    validate_max_levels, ExternalId, Financials, NetworkEntry, NetworkForest, NetworkResult,
};
use crate::ports::ReferralSource;

/// One sponsor being expanded.
struct Frame {
    sponsor: ExternalId,
    level: u8,
    /// Root .. sponsor, `path.len() == level`.
    path: Vec<ExternalId>,
    pending: VecDeque<ExternalId>,
}

/// Child lists fetched during one traversal.
///
/// A sponsor reached through several chains is queried once.
struct ChildCache<'a, S: ReferralSource + ?Sized> {
    source: &'a S,
    fetched: HashMap<ExternalId, Vec<ExternalId>>,
}

impl<'a, S: ReferralSource + ?Sized> ChildCache<'a, S> {
    fn new(source: &'a S) -> Self {
        Self {
            source,
            fetched: HashMap::new(),
        }
    }

    async fn children(&mut self, sponsor: &ExternalId) -> NetworkResult<VecDeque<ExternalId>> {
        if let Some(children) = self.fetched.get(sponsor) {
            return Ok(children.iter().cloned().collect());
        }
        let children = self.source.direct_referrals(sponsor).await?;
        trace!(sponsor = %sponsor, count = children.len(), "Fetched direct referrals");
        let queue = children.iter().cloned().collect();
        self.fetched.insert(sponsor.clone(), children);
        Ok(queue)
    }
}

/// Build the network under `root`, up to `max_levels` deep.
///
/// Any source failure aborts the traversal and is returned as is.
pub async fn build_network<S: ReferralSource + ?Sized>(
    source: &S,
    root: &ExternalId,
    max_levels: u8,
) -> NetworkResult<NetworkForest> {
    validate_max_levels(max_levels)?;

    let mut forest = NetworkForest::new(root.clone(), max_levels);
    let mut recorded: HashSet<(ExternalId, ExternalId, u8)> = HashSet::new();
    let mut cache = ChildCache::new(source);

    let mut stack = vec![Frame {
        sponsor: root.clone(),
        level: 1,
        path: vec![root.clone()],
        pending: cache.children(root).await?,
    }];

    while let Some(frame) = stack.last_mut() {
        let Some(client) = frame.pending.pop_front() else {
            stack.pop();
            continue;
        };

        if frame.path.contains(&client) {
            trace!(client = %client, level = frame.level, "Skipping client already on path");
            continue;
        }
        if !recorded.insert((frame.sponsor.clone(), client.clone(), frame.level)) {
            continue;
        }

        let level = frame.level;
        forest.push(NetworkEntry {
            client_id: client.clone(),
            level,
            path: frame.path.clone(),
            direct_sponsor: frame.sponsor.clone(),
            financials: Financials::default(),
        });

        if level < max_levels {
            let mut path = frame.path.clone();
            path.push(client.clone());
            let pending = cache.children(&client).await?;
            stack.push(Frame {
                sponsor: client,
                level: level + 1,
                path,
                pending,
            });
        }
    }

    debug!(
        root = %root,
        entries = forest.len(),
        sponsors_queried = cache.fetched.len(),
        "Network traversal finished"
    );
    Ok(forest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryReferralSource;
    use crate::domain::NetworkError;

    fn ids(entries: &[NetworkEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.client_id.as_str()).collect()
    }

    fn path(entry: &NetworkEntry) -> Vec<&str> {
        entry.path.iter().map(ExternalId::as_str).collect()
    }

    #[tokio::test]
    async fn test_cycle_is_cut() {
        let source = MemoryReferralSource::from_edges(&[("A", "B"), ("B", "C"), ("C", "A")]);

        let forest = build_network(&source, &"A".into(), 5).await.unwrap();

        assert_eq!(ids(forest.level(1)), vec!["B"]);
        assert_eq!(ids(forest.level(2)), vec!["C"]);
        assert_eq!(path(&forest.level(2)[0]), vec!["A", "B"]);
        assert_eq!(forest.level(2)[0].direct_sponsor.as_str(), "B");
        assert!(forest.level(3).is_empty());
        assert_eq!(forest.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_referrals() {
        let source = MemoryReferralSource::from_edges(&[("A", "B")]);

        let forest = build_network(&source, &"X".into(), 5).await.unwrap();

        assert!(forest.is_empty());
    }

    #[tokio::test]
    async fn test_depth_is_bounded() {
        let source = MemoryReferralSource::from_edges(&[
            ("R", "1"),
            ("1", "2"),
            ("2", "3"),
            ("3", "4"),
            ("4", "5"),
            ("5", "6"),
        ]);

        let forest = build_network(&source, &"R".into(), 3).await.unwrap();

        assert_eq!(forest.len(), 3);
        assert_eq!(ids(forest.level(3)), vec!["3"]);
        assert_eq!(path(&forest.level(3)[0]), vec!["R", "1", "2"]);
    }

    #[tokio::test]
    async fn test_order_matches_depth_first_recursion() {
        let source = MemoryReferralSource::from_edges(&[
            ("R", "a"),
            ("R", "b"),
            ("a", "a1"),
            ("a", "a2"),
            ("b", "b1"),
        ]);

        let forest = build_network(&source, &"R".into(), 5).await.unwrap();

        assert_eq!(ids(forest.level(1)), vec!["a", "b"]);
        assert_eq!(ids(forest.level(2)), vec!["a1", "a2", "b1"]);
    }

    #[tokio::test]
    async fn test_diamond_records_each_chain() {
        // R -> a -> x and R -> b -> x
        let source = MemoryReferralSource::from_edges(&[
            ("R", "a"),
            ("R", "b"),
            ("a", "x"),
            ("b", "x"),
        ]);

        let forest = build_network(&source, &"R".into(), 5).await.unwrap();

        let level2 = forest.level(2);
        assert_eq!(ids(level2), vec!["x", "x"]);
        assert_eq!(level2[0].direct_sponsor.as_str(), "a");
        assert_eq!(level2[1].direct_sponsor.as_str(), "b");
    }

    #[tokio::test]
    async fn test_duplicate_edge_recorded_once() {
        let source = MemoryReferralSource::from_edges(&[("R", "a"), ("R", "a")]);

        let forest = build_network(&source, &"R".into(), 5).await.unwrap();

        assert_eq!(ids(forest.level(1)), vec!["a"]);
    }

    #[tokio::test]
    async fn test_self_referral_skipped() {
        let source = MemoryReferralSource::from_edges(&[("R", "R"), ("R", "a")]);

        let forest = build_network(&source, &"R".into(), 5).await.unwrap();

        assert_eq!(ids(forest.level(1)), vec!["a"]);
    }

    #[tokio::test]
    async fn test_source_failure_aborts() {
        let source = MemoryReferralSource::from_edges(&[("R", "a"), ("a", "b")]);
        source.fail_on("a");

        let err = build_network(&source, &"R".into(), 5).await.unwrap_err();

        assert!(matches!(err, NetworkError::Source(_)));
    }

    #[tokio::test]
    async fn test_invalid_depth_rejected() {
        let source = MemoryReferralSource::default();

        assert!(build_network(&source, &"R".into(), 0).await.is_err());
        assert!(build_network(&source, &"R".into(), 6).await.is_err());
    }

    #[tokio::test]
    async fn test_shared_sponsor_queried_once() {
        let source = MemoryReferralSource::from_edges(&[
            ("R", "a"),
            ("R", "b"),
            ("a", "x"),
            ("b", "x"),
            ("x", "y"),
        ]);

        build_network(&source, &"R".into(), 5).await.unwrap();

        // R, a, b, x, y
        assert_eq!(source.query_count(), 5);
    }
}
