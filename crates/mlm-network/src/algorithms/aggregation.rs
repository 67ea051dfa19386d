//! # Aggregation
//!
//! Pure reductions from a built network to its per-level statistics.

use std::collections::HashMap;

use crate::domain::{ExternalId, Financials, NetworkForest, NetworkStats};

/// Copy accumulated client financials onto the matching entries.
///
/// Clients without a row keep zero financials.
pub fn enrich_financials(forest: &mut NetworkForest, financials: &HashMap<ExternalId, Financials>) {
    for entry in forest.entries_mut() {
        entry.financials = financials
            .get(&entry.client_id)
            .copied()
            .unwrap_or_default();
    }
}

/// Per-level counts and sums, with the total as the sum of level counts.
pub fn aggregate(forest: &NetworkForest) -> NetworkStats {
    let mut stats = NetworkStats::empty(forest.max_levels());

    for row in stats.levels.iter_mut() {
        let entries = forest.level(row.level);
        row.count = entries.len() as u64;
        for entry in entries {
            row.financials += &entry.financials;
        }
    }

    stats.total_network_size = stats.levels.iter().map(|l| l.count).sum();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{invariant_stats_total, NetworkEntry};
    use rust_decimal::Decimal;

    fn push(forest: &mut NetworkForest, client: &str, level: u8) {
        let path: Vec<ExternalId> = (0..level).map(|i| ExternalId::new(format!("s{i}"))).collect();
        let direct_sponsor = path[path.len() - 1].clone();
        forest.push(NetworkEntry {
            client_id: client.into(),
            level,
            path,
            direct_sponsor,
            financials: Financials::default(),
        });
    }

    #[test]
    fn test_counts_per_level() {
        let mut forest = NetworkForest::new("root".into(), 5);
        push(&mut forest, "a", 1);
        push(&mut forest, "b", 1);
        push(&mut forest, "c", 2);
        push(&mut forest, "d", 5);

        let stats = aggregate(&forest);

        assert_eq!(stats.count_at(1), 2);
        assert_eq!(stats.count_at(2), 1);
        assert_eq!(stats.count_at(3), 0);
        assert_eq!(stats.count_at(5), 1);
        assert_eq!(stats.total_network_size, 4);
        assert!(invariant_stats_total(&stats));
    }

    #[test]
    fn test_empty_forest() {
        let forest = NetworkForest::new("root".into(), 5);
        let stats = aggregate(&forest);

        assert_eq!(stats.total_network_size, 0);
        assert_eq!(stats.levels.len(), 5);
    }

    #[test]
    fn test_financial_sums() {
        let mut forest = NetworkForest::new("root".into(), 2);
        push(&mut forest, "a", 1);
        push(&mut forest, "b", 1);
        push(&mut forest, "a", 2);

        let mut money = HashMap::new();
        money.insert(
            ExternalId::from("a"),
            Financials {
                deposits: Decimal::new(1000, 2),
                ggr: Decimal::new(250, 2),
                ..Financials::default()
            },
        );
        enrich_financials(&mut forest, &money);

        let stats = aggregate(&forest);

        assert_eq!(stats.financials_at(1).deposits, Decimal::new(1000, 2));
        assert_eq!(stats.financials_at(2).deposits, Decimal::new(1000, 2));
        assert_eq!(stats.financials_at(1).ggr, Decimal::new(250, 2));
        assert!(forest.level(1)[1].financials.is_zero());
    }
}
