//! # Domain Invariants
//!
//! Structural rules every built network satisfies before it is persisted.

use std::collections::HashSet;

use super::entities::{NetworkEntry, NetworkForest, NetworkStats, MAX_SUPPORTED_LEVELS};
use super::errors::NetworkError;

/// Invariant: depth lies within the configured bound.
pub fn invariant_level_bounds(entry: &NetworkEntry, max_levels: u8) -> bool {
    entry.level >= 1 && entry.level <= max_levels
}

/// Invariant: the path holds exactly one id per level and ends at the sponsor.
pub fn invariant_path_shape(entry: &NetworkEntry) -> bool {
    entry.path.len() == usize::from(entry.level)
        && entry.path.last() == Some(&entry.direct_sponsor)
}

/// Invariant: no id appears twice along a chain, client included.
pub fn invariant_acyclic_path(entry: &NetworkEntry) -> bool {
    let mut seen = HashSet::with_capacity(entry.path.len() + 1);
    entry.path.iter().all(|id| seen.insert(id)) && !seen.contains(&entry.client_id)
}

/// Invariant: total network size equals the sum of level counts.
pub fn invariant_stats_total(stats: &NetworkStats) -> bool {
    stats.total_network_size == stats.levels.iter().map(|l| l.count).sum::<u64>()
}

/// Validate a configured depth against the persisted schema width.
pub fn validate_max_levels(max_levels: u8) -> Result<(), NetworkError> {
    if max_levels == 0 || max_levels > MAX_SUPPORTED_LEVELS {
        return Err(NetworkError::InvalidConfig(format!(
            "max levels must be between 1 and {MAX_SUPPORTED_LEVELS}, got {max_levels}"
        )));
    }
    Ok(())
}

/// Check every entry of a forest.
pub fn check_forest(forest: &NetworkForest) -> Result<(), NetworkError> {
    for entry in forest.entries() {
        if !invariant_level_bounds(entry, forest.max_levels()) {
            return Err(NetworkError::InvariantViolation(format!(
                "client {} recorded at level {} (max {})",
                entry.client_id,
                entry.level,
                forest.max_levels()
            )));
        }
        if !invariant_path_shape(entry) {
            return Err(NetworkError::InvariantViolation(format!(
                "client {} at level {} has path of length {}",
                entry.client_id,
                entry.level,
                entry.path.len()
            )));
        }
        if !invariant_acyclic_path(entry) {
            return Err(NetworkError::InvariantViolation(format!(
                "client {} repeats an id along its path",
                entry.client_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExternalId, Financials};

    fn entry(client: &str, path: &[&str]) -> NetworkEntry {
        NetworkEntry {
            client_id: ExternalId::from(client),
            level: path.len() as u8,
            path: path.iter().map(|p| ExternalId::from(*p)).collect(),
            direct_sponsor: ExternalId::from(*path.last().unwrap()),
            financials: Financials::default(),
        }
    }

    #[test]
    fn test_valid_entry_passes() {
        let e = entry("c", &["a", "b"]);
        assert!(invariant_level_bounds(&e, 5));
        assert!(invariant_path_shape(&e));
        assert!(invariant_acyclic_path(&e));
    }

    #[test]
    fn test_client_in_path_is_cycle() {
        let e = entry("a", &["a", "b"]);
        assert!(!invariant_acyclic_path(&e));
    }

    #[test]
    fn test_level_beyond_bound() {
        let e = entry("f", &["a", "b", "c"]);
        assert!(!invariant_level_bounds(&e, 2));
    }

    #[test]
    fn test_max_levels_validation() {
        assert!(validate_max_levels(1).is_ok());
        assert!(validate_max_levels(5).is_ok());
        assert!(validate_max_levels(0).is_err());
        assert!(validate_max_levels(6).is_err());
    }

    #[test]
    fn test_stats_total() {
        let mut stats = NetworkStats::empty(2);
        stats.levels[0].count = 2;
        stats.levels[1].count = 1;
        stats.total_network_size = 3;
        assert!(invariant_stats_total(&stats));

        stats.total_network_size = 4;
        assert!(!invariant_stats_total(&stats));
    }
}
