//! # Application Layer

pub mod service;

pub use service::{NetworkBuilderService, CACHE_CLEANUP_LOG_KEY};
