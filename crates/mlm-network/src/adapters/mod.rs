//! # Adapters
//!
//! - `postgres_source` - external source over sqlx
//! - `postgres_store` - reporting store over sqlx, plus migrations
//! - `memory` - in-process implementations with failure injection

pub mod memory;
pub mod postgres_source;
pub mod postgres_store;

pub use memory::{MemoryNetworkStore, MemoryReferralSource};
pub use postgres_source::PostgresReferralSource;
pub use postgres_store::{run_migrations, PostgresNetworkStore};
