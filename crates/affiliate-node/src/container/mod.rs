//! # Service Container
//!
//! Configuration and component wiring for the node.

pub mod config;
pub mod services;

pub use config::{ApiConfig, ConfigError, DatabaseConfig, ExternalDbConfig, NodeConfig};
pub use services::{ContainerError, ServiceContainer};
