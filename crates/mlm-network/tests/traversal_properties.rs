//! # Traversal Properties
//!
//! Structural rules checked over random referral graphs, cycles and
//! self-referrals included.

use std::collections::HashSet;

use mlm_network::{aggregate, build_network, ExternalId, MemoryReferralSource, NetworkForest};
use proptest::prelude::*;

fn run(edges: &[(u8, u8)], max_levels: u8) -> NetworkForest {
    let names: Vec<(String, String)> = edges
        .iter()
        .map(|(s, c)| (format!("u{s}"), format!("u{c}")))
        .collect();
    let source = MemoryReferralSource::default();
    for (sponsor, client) in &names {
        source.add_edge(sponsor, client);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    rt.block_on(build_network(&source, &ExternalId::from("u0"), max_levels))
        .unwrap()
}

fn edges() -> impl Strategy<Value = Vec<(u8, u8)>> {
    prop::collection::vec((0u8..8, 0u8..8), 0..24)
}

proptest! {
    /// Property: every entry sits within the depth bound and its path has one
    /// id per level, starting at the root and ending at the direct sponsor.
    #[test]
    fn prop_level_bounds_and_path_shape(edges in edges(), max_levels in 1u8..=5) {
        let forest = run(&edges, max_levels);

        for entry in forest.entries() {
            prop_assert!(entry.level >= 1 && entry.level <= max_levels);
            prop_assert_eq!(entry.path.len(), usize::from(entry.level));
            prop_assert_eq!(entry.path[0].as_str(), "u0");
            prop_assert_eq!(entry.path.last(), Some(&entry.direct_sponsor));
        }
    }

    /// Property: no id repeats along a chain, the client included.
    #[test]
    fn prop_paths_are_acyclic(edges in edges(), max_levels in 1u8..=5) {
        let forest = run(&edges, max_levels);

        for entry in forest.entries() {
            let mut seen = HashSet::new();
            for id in &entry.path {
                prop_assert!(seen.insert(id.clone()));
            }
            prop_assert!(!seen.contains(&entry.client_id));
        }
    }

    /// Property: a (sponsor, client, level) triple is recorded at most once.
    #[test]
    fn prop_triples_are_unique(edges in edges()) {
        let forest = run(&edges, 5);

        let mut seen = HashSet::new();
        for entry in forest.entries() {
            prop_assert!(seen.insert((
                entry.direct_sponsor.clone(),
                entry.client_id.clone(),
                entry.level,
            )));
        }
    }

    /// Property: the stats total equals the sum of level counts, and each
    /// level count matches the entries at that level.
    #[test]
    fn prop_total_is_sum_of_levels(edges in edges(), max_levels in 1u8..=5) {
        let forest = run(&edges, max_levels);
        let stats = aggregate(&forest);

        let sum: u64 = stats.levels.iter().map(|l| l.count).sum();
        prop_assert_eq!(stats.total_network_size, sum);
        prop_assert_eq!(stats.total_network_size, forest.len() as u64);
        for level in 1..=max_levels {
            prop_assert_eq!(stats.count_at(level), forest.level(level).len() as u64);
        }
    }

    /// Property: traversal is deterministic for a fixed source.
    #[test]
    fn prop_traversal_deterministic(edges in edges()) {
        prop_assert_eq!(run(&edges, 5), run(&edges, 5));
    }
}
