//! # Algorithms
//!
//! - `traversal` - bounded depth-first network walk
//! - `aggregation` - per-level counts and financial sums

pub mod aggregation;
pub mod traversal;

pub use aggregation::{aggregate, enrich_financials};
pub use traversal::build_network;
