//! # Network Builder Configuration

use serde::{Deserialize, Serialize};

use crate::domain::{validate_max_levels, NetworkError, DEFAULT_MAX_LEVELS};

/// Where referral edges live in the external source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Table holding `(user_id, user_afil)` rows.
    pub edges_table: String,
    /// Column filtered with `= 1` to select referral rows.
    pub edge_type_column: String,
    /// Update-timestamp column. When unset, incremental syncs rescan every
    /// sponsor.
    pub updated_at_column: Option<String>,
    /// SQL type of the sponsor column (e.g. `bigint`). When set, the sponsor
    /// parameter is cast to it so a plain index on `user_afil` is usable.
    /// When unset, the column is compared as text and needs an expression
    /// index on `(user_afil::text)`.
    pub sponsor_id_type: Option<String>,
}

impl Default for SourceSchema {
    fn default() -> Self {
        Self {
            edges_table: "tracked".to_string(),
            edge_type_column: "tracked_type_id".to_string(),
            updated_at_column: None,
            sponsor_id_type: None,
        }
    }
}

impl SourceSchema {
    pub fn validate(&self) -> Result<(), NetworkError> {
        validate_identifier(&self.edges_table)?;
        validate_identifier(&self.edge_type_column)?;
        if let Some(column) = &self.updated_at_column {
            validate_identifier(column)?;
        }
        if let Some(id_type) = &self.sponsor_id_type {
            validate_identifier(id_type)?;
        }
        Ok(())
    }
}

/// Network builder configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Traversal depth, 1..=5.
    pub max_levels: u8,
    /// Log batch progress every this many affiliates.
    pub progress_every: u64,
    pub source: SourceSchema,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_levels: DEFAULT_MAX_LEVELS,
            progress_every: 100,
            source: SourceSchema::default(),
        }
    }
}

impl NetworkConfig {
    /// Create a config for testing (frequent progress logs).
    pub fn for_testing() -> Self {
        Self {
            progress_every: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), NetworkError> {
        validate_max_levels(self.max_levels)?;
        if self.progress_every == 0 {
            return Err(NetworkError::InvalidConfig(
                "progress_every must be at least 1".to_string(),
            ));
        }
        self.source.validate()
    }
}

/// Accept plain or schema-qualified SQL identifiers only.
///
/// These names are spliced into query text, so anything beyond
/// `[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?` is refused.
pub fn validate_identifier(name: &str) -> Result<(), NetworkError> {
    let parts: Vec<&str> = name.split('.').collect();
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(NetworkError::InvalidConfig(format!(
            "'{name}' is not a valid SQL identifier"
        )))
    }
}
