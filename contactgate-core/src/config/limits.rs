//! Guardrail limits.
//!
//! The constants below are the process-wide defaults. They are copied into an
//! immutable [`QueryLimits`] value at startup and passed explicitly to the
//! validator and builder; no tool argument can change them.

use crate::backends::BackendRole;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Maximum number of rows a single call may return.
pub const MAX_ROWS: u32 = 10_000;
/// Row limit used when the caller gives none.
pub const DEFAULT_LIMIT: u32 = 100;
/// Largest pagination offset accepted.
pub const MAX_OFFSET: u32 = 100_000;
/// Largest membership list accepted in one filter.
pub const MAX_IN_VALUES: u32 = 1_000;
/// Largest number of filters accepted in one query.
pub const MAX_FILTERS: u32 = 20;
/// Statement timeout on the primary (PostgreSQL) backend.
pub const PRIMARY_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Call timeout on the configuration (Oracle) backend.
pub const CONFIGURATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of a guardrail limit, reported in `LimitExceeded` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitName {
    MaxRows,
    MaxOffset,
    MaxInValues,
    MaxFilters,
}

impl LimitName {
    /// Constant-style name of the limit.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxRows => "MAX_ROWS",
            Self::MaxOffset => "MAX_OFFSET",
            Self::MaxInValues => "MAX_IN_VALUES",
            Self::MaxFilters => "MAX_FILTERS",
        }
    }
}

impl fmt::Display for LimitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric guardrails applied to every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLimits {
    /// Maximum rows per call
    pub max_rows: u32,
    /// Limit used when the caller omits one
    pub default_limit: u32,
    /// Maximum pagination offset
    pub max_offset: u32,
    /// Maximum values in a membership filter
    pub max_in_values: u32,
    /// Maximum filters per query
    pub max_filters: u32,
    /// Timeout for calls on the primary backend
    pub primary_timeout: Duration,
    /// Timeout for calls on the configuration backend
    pub configuration_timeout: Duration,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_rows: MAX_ROWS,
            default_limit: DEFAULT_LIMIT,
            max_offset: MAX_OFFSET,
            max_in_values: MAX_IN_VALUES,
            max_filters: MAX_FILTERS,
            primary_timeout: PRIMARY_TIMEOUT,
            configuration_timeout: CONFIGURATION_TIMEOUT,
        }
    }
}

impl QueryLimits {
    /// Validates that the limits are internally consistent.
    ///
    /// # Errors
    /// Returns a configuration error when a limit is zero, a membership list
    /// could be as long as the row maximum, or the default limit exceeds the
    /// row maximum.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_rows == 0 || self.max_filters == 0 || self.max_in_values == 0 {
            return Err(crate::error::ContactGateError::configuration(
                "guardrail limits must be greater than 0",
            ));
        }
        if self.max_in_values >= self.max_rows {
            return Err(crate::error::ContactGateError::configuration(format!(
                "max_in_values must be below max_rows ({})",
                self.max_rows
            )));
        }
        if self.default_limit == 0 || self.default_limit > self.max_rows {
            return Err(crate::error::ContactGateError::configuration(format!(
                "default_limit must be between 1 and max_rows ({})",
                self.max_rows
            )));
        }
        if self.primary_timeout.is_zero() || self.configuration_timeout.is_zero() {
            return Err(crate::error::ContactGateError::configuration(
                "backend timeouts must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Timeout applied to calls on `role`.
    pub const fn timeout_for(&self, role: BackendRole) -> Duration {
        match role {
            BackendRole::Primary => self.primary_timeout,
            BackendRole::Configuration => self.configuration_timeout,
        }
    }

    /// Builder method to set the primary backend timeout.
    pub const fn with_primary_timeout(mut self, timeout: Duration) -> Self {
        self.primary_timeout = timeout;
        self
    }

    /// Builder method to set the configuration backend timeout.
    pub const fn with_configuration_timeout(mut self, timeout: Duration) -> Self {
        self.configuration_timeout = timeout;
        self
    }
}
