//! # MLM Network
//!
//! Builds each affiliate's multi-level referral network from an external
//! source and persists it, with per-level aggregates, to a reporting store.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Pipeline
//!
//! ```text
//! ReferralSource ──edges──→ traversal ──forest──→ aggregation ──stats──→ NetworkStore
//!                                         ↑                                  │
//!                                client financials ←─────────────────────────┘
//! ```
//!
//! ## Network Rules
//!
//! | Rule | Enforcement |
//! |------|-------------|
//! | `1 <= level <= max_levels` | traversal depth bound, `check_forest` |
//! | `path.len() == level` | frame stack carries root..sponsor |
//! | no id repeats on a path | path membership guard |
//! | `total == Σ level counts` | `aggregate`, `invariant_stats_total` |
//! | entries and stats change together | one transaction in `replace_network` |
//!
//! ## Module Structure
//!
//! ```text
//! mlm-network/
//! ├── domain/          # Entities, SyncRun state machine, errors, invariants
//! ├── algorithms/      # Traversal and aggregation
//! ├── ports/           # NetworkBuilderApi (inbound), ReferralSource + NetworkStore (outbound)
//! ├── adapters/        # Postgres and in-memory implementations
//! ├── application/     # NetworkBuilderService
//! └── config.rs        # NetworkConfig, SourceSchema
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    run_migrations, MemoryNetworkStore, MemoryReferralSource, PostgresNetworkStore,
    PostgresReferralSource,
};
pub use algorithms::{aggregate, build_network, enrich_financials};
pub use application::{NetworkBuilderService, CACHE_CLEANUP_LOG_KEY};
pub use config::{validate_identifier, NetworkConfig, SourceSchema};
pub use domain::{
    Affiliate, AffiliateId, ExternalId, Financials, LevelStats, NetworkEntry, NetworkError,
    NetworkForest, NetworkResult, NetworkStats, RosterEntry, SyncLogEntry, SyncRun,
    SyncRunRecord, SyncStatus, SyncType, DEFAULT_MAX_LEVELS, MAX_SUPPORTED_LEVELS,
};
pub use ports::{
    BatchReport, ChangedSponsors, NetworkBuilderApi, NetworkStore, NetworkSummary,
    ReferralSource,
};
