//! # Affiliate Node
//!
//! Runs the affiliate network service as one process:
//!
//! - **Network builder** mirrors referral trees from the operator database
//!   into the reporting store
//! - **Sync scheduler** drives roster syncs, full rebuilds, incremental
//!   syncs and cache cleanup on cron schedules
//! - **Reporting API** serves read-only reports and `/metrics`
//!
//! ## Modules
//!
//! - `container/` - Environment configuration and component wiring
//! - `runtime` - Startup and shutdown sequencing

pub mod container;
pub mod runtime;

pub use container::{ConfigError, NodeConfig, ServiceContainer};
pub use runtime::{AffiliateNode, NodeError};
