//! # Domain Layer
//!
//! Entities, sync-run state machine, errors and invariants.

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod sync_run;

pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use sync_run::*;
