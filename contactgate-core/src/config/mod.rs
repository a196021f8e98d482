//! Engine configuration.
//!
//! # Module Structure
//! - `limits`: guardrail constants and [`QueryLimits`]
//! - `connection`: per-backend [`ConnectionConfig`]
//!
//! [`EngineConfig`] is built once at startup, validated, and then shared
//! read-only (behind an `Arc`) by every tool call.

mod connection;
mod limits;

pub use connection::ConnectionConfig;
pub use limits::{
    CONFIGURATION_TIMEOUT, DEFAULT_LIMIT, LimitName, MAX_FILTERS, MAX_IN_VALUES, MAX_OFFSET,
    MAX_ROWS, PRIMARY_TIMEOUT, QueryLimits,
};

use crate::catalog::is_valid_qualified_name;
use crate::dialect::Dialect;
use crate::error::ContactGateError;
use serde::{Deserialize, Serialize};

/// Highest number of archive partitions a transaction query may span.
pub const MAX_ARCHIVE_COUNT: u8 = 2;

/// Default physical contact table on the primary backend.
pub const DEFAULT_CONTACT_TABLE: &str = "lvousr.contact";

/// Default client table on the configuration backend.
pub const DEFAULT_CLIENT_TABLE: &str = "lvousr.client";

/// Immutable engine configuration shared by all tool calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Guardrail limits
    pub limits: QueryLimits,

    /// Number of monthly transaction archives to fan out to, in `[0, 2]`.
    pub archive_count: u8,

    /// Physical contact table (`schema.table`) on the primary backend.
    pub contact_table: String,

    /// Physical client table (`schema.table`) on the configuration backend.
    pub client_table: String,

    /// Glob patterns (case-insensitive) marking a dialing link as PostgreSQL.
    ///
    /// Links that match are served from the primary backend directly;
    /// everything else is reached through an Oracle database link.
    pub postgres_link_patterns: Vec<String>,

    /// Forces a dialect for every dialing link, bypassing the patterns.
    pub dialect_override: Option<Dialect>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: QueryLimits::default(),
            archive_count: 0,
            contact_table: DEFAULT_CONTACT_TABLE.to_string(),
            client_table: DEFAULT_CLIENT_TABLE.to_string(),
            postgres_link_patterns: vec!["PG_*".to_string(), "*POSTGRES*".to_string()],
            dialect_override: None,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the archive count; validated by [`EngineConfig::validate`].
    pub const fn with_archive_count(mut self, archive_count: u8) -> Self {
        self.archive_count = archive_count;
        self
    }

    /// Overrides the contact table name.
    pub fn with_contact_table(mut self, table: impl Into<String>) -> Self {
        self.contact_table = table.into();
        self
    }

    /// Overrides the client table name.
    pub fn with_client_table(mut self, table: impl Into<String>) -> Self {
        self.client_table = table.into();
        self
    }

    /// Replaces the PostgreSQL link patterns.
    pub fn with_postgres_link_patterns(mut self, patterns: Vec<String>) -> Self {
        self.postgres_link_patterns = patterns;
        self
    }

    /// Forces one dialect for every dialing link.
    pub const fn with_dialect_override(mut self, dialect: Option<Dialect>) -> Self {
        self.dialect_override = dialect;
        self
    }

    /// Replaces the guardrail limits.
    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns a configuration error if the archive count is outside
    /// `[0, 2]`, a table override is not a plain `schema.table` identifier,
    /// or the limits are inconsistent.
    pub fn validate(&self) -> crate::Result<()> {
        if self.archive_count > MAX_ARCHIVE_COUNT {
            return Err(ContactGateError::configuration(format!(
                "archive_count must be between 0 and {MAX_ARCHIVE_COUNT}, got {}",
                self.archive_count
            )));
        }
        for (name, value) in [
            ("contact_table", &self.contact_table),
            ("client_table", &self.client_table),
        ] {
            if !is_valid_qualified_name(value) {
                return Err(ContactGateError::configuration(format!(
                    "{name} must be an identifier of the form schema.table"
                )));
            }
        }
        self.limits.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.archive_count, 0);
        assert_eq!(config.contact_table, "lvousr.contact");
        assert_eq!(config.client_table, "lvousr.client");
        assert!(config.dialect_override.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_archive_count_range() {
        assert!(EngineConfig::new().with_archive_count(2).validate().is_ok());
        assert!(EngineConfig::new().with_archive_count(3).validate().is_err());
    }

    #[test]
    fn test_table_override_must_be_identifier() {
        let config = EngineConfig::new().with_contact_table("lvousr.contact_v2");
        assert!(config.validate().is_ok());

        let config = EngineConfig::new().with_contact_table("lvousr.contact; drop table x");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = EngineConfig::new()
            .with_archive_count(1)
            .with_client_table("cfg.client_master")
            .with_dialect_override(Some(Dialect::Oracle))
            .with_postgres_link_patterns(vec!["PGDIAL*".to_string()]);

        assert_eq!(config.archive_count, 1);
        assert_eq!(config.client_table, "cfg.client_master");
        assert_eq!(config.dialect_override, Some(Dialect::Oracle));
        assert_eq!(config.postgres_link_patterns, vec!["PGDIAL*".to_string()]);
    }
}
