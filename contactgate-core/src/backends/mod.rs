//! Backend traits and the two concrete backends.
//!
//! The engine never talks to a driver directly; it hands a [`BuiltQuery`]
//! to a [`Backend`] and receives JSON rows back. This keeps the SQL builder
//! and the fan-out executor testable without a database.
//!
//! # Module Structure
//! - `postgres`: primary backend on a `sqlx` pool (feature `postgresql`)
//! - `oracle`: configuration backend on the `oracle` crate (feature `oracle`)

use crate::builder::BuiltQuery;
use crate::config::QueryLimits;
use crate::dialect::Dialect;
use crate::error::{ContactGateError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "oracle")]
pub mod oracle;

/// One result row, keyed by lowercase column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Which of the two backends a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendRole {
    /// PostgreSQL contact store
    Primary,
    /// Oracle configuration store, also the gateway to linked databases
    Configuration,
}

impl fmt::Display for BackendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Configuration => f.write_str("configuration"),
        }
    }
}

/// A relational backend able to run built statements.
///
/// # Security Guarantees
/// - Statements arrive fully parameterized; implementations bind
///   `query.params` positionally and never interpolate values
/// - Connection strings are sanitized before reaching any error
///
/// # Object Safety
/// The engine holds backends as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Role this backend plays.
    fn role(&self) -> BackendRole;

    /// Dialect the backend speaks.
    fn dialect(&self) -> Dialect;

    /// Tests the connection.
    ///
    /// # Errors
    /// Returns `BackendUnavailable` when the backend cannot be reached.
    async fn test_connection(&self) -> Result<()>;

    /// Runs a read statement and returns every row.
    ///
    /// # Errors
    /// Returns `BackendUnavailable` or `Query` on driver failures.
    async fn fetch_all(&self, query: &BuiltQuery) -> Result<Vec<Row>>;

    /// Runs an insert that returns a generated integer key.
    ///
    /// # Errors
    /// Returns `InsertRejected` when the backend refuses the row.
    async fn insert_returning(&self, query: &BuiltQuery) -> Result<i64>;

    /// Runs several write statements in one backend transaction and returns
    /// the total number of affected rows. Nothing is committed unless every
    /// statement succeeds.
    ///
    /// # Errors
    /// Returns `InsertRejected` when any statement is refused.
    async fn execute_batch(&self, statements: &[BuiltQuery]) -> Result<u64>;
}

/// Runs a backend call under `timeout`, mapping expiry to `BackendTimeout`.
///
/// # Errors
/// Returns the call's own error, or `BackendTimeout` when it does not finish
/// in time.
pub async fn with_timeout<T, F>(role: BackendRole, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, call).await.map_err(|_| {
        tracing::warn!("{} backend call timed out after {:?}", role, timeout);
        ContactGateError::BackendTimeout {
            backend: role,
            timeout,
        }
    })?
}

/// Runs [`Backend::fetch_all`] under the backend's configured timeout.
///
/// # Errors
/// See [`with_timeout`].
pub async fn fetch_bounded(
    backend: &dyn Backend,
    limits: &QueryLimits,
    query: &BuiltQuery,
) -> Result<Vec<Row>> {
    let role = backend.role();
    with_timeout(role, limits.timeout_for(role), backend.fetch_all(query)).await
}

/// Runs [`Backend::insert_returning`] under the backend's configured timeout.
///
/// # Errors
/// See [`with_timeout`].
pub async fn insert_bounded(
    backend: &dyn Backend,
    limits: &QueryLimits,
    query: &BuiltQuery,
) -> Result<i64> {
    let role = backend.role();
    with_timeout(role, limits.timeout_for(role), backend.insert_returning(query)).await
}

/// Runs [`Backend::execute_batch`] under the backend's configured timeout.
///
/// # Errors
/// See [`with_timeout`].
pub async fn batch_bounded(
    backend: &dyn Backend,
    limits: &QueryLimits,
    statements: &[BuiltQuery],
) -> Result<u64> {
    let role = backend.role();
    with_timeout(role, limits.timeout_for(role), backend.execute_batch(statements)).await
}

/// Classifies driver error text into an insert rejection or a plain failure.
///
/// Constraint, value and integrity errors describe the row rather than the
/// backend, so they become `InsertRejected`.
pub(crate) fn is_rejection_message(message: &str) -> bool {
    const MARKERS: &[&str] = &[
        "constraint",
        "violates",
        "integrity",
        "ORA-00001",
        "ORA-01400",
        "ORA-02291",
        "ORA-01438",
        "ORA-12899",
        "ORA-01722",
        "ORA-01858",
        "invalid input",
        "value too long",
        "out of range",
    ];
    let lower = message.to_lowercase();
    MARKERS
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
}
