//! Client and skill resolution.
//!
//! Transactions are keyed by a legacy *skill* identifier stored in a column
//! named `CLIENT_ID`. Callers speak in client ids, so every transaction read
//! first resolves the client's skills from the configuration backend. Nothing
//! here is cached; mappings are read per request.

use crate::backends::{Backend, Row, fetch_bounded};
use crate::builder::SqlBuilder;
use crate::catalog::TableName;
use crate::config::EngineConfig;
use crate::dialect::{DbLink, TableRef};
use crate::error::{ContactGateError, Result};
use crate::filter::{Filter, FilterValue, Operator, SqlValue};
use crate::guardrails::{Guardrails, Projection, QuerySpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier of a client in the configuration backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(i64);

impl ClientId {
    /// Wraps a positive client id.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for zero or negative ids.
    pub fn new(id: i64) -> Result<Self> {
        if id > 0 {
            Ok(Self(id))
        } else {
            Err(ContactGateError::invalid_argument(
                "client_id",
                "must be a positive integer",
            ))
        }
    }

    /// Raw id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Legacy skill identifier, stored as `CLIENT_ID` on transaction tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillId(i64);

impl SkillId {
    /// Wraps a skill id.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Database links of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLinks {
    /// Client the links belong to
    pub client_id: ClientId,
    /// Link to the client's dialing database (current transactions, contacts)
    pub dialing: DbLink,
    /// Link to the reporting database holding archives, when configured
    pub reporting: Option<DbLink>,
}

impl ClientLinks {
    /// Link used for archive tables; falls back to the dialing link.
    pub const fn archive_link(&self) -> &DbLink {
        match &self.reporting {
            Some(link) => link,
            None => &self.dialing,
        }
    }
}

/// Reads a client's links from the configured client table.
///
/// # Errors
/// Returns `UnknownClient` when no row exists, a configuration error when the
/// row has no usable dialing link, or any backend error.
pub async fn resolve_client(
    backend: &dyn Backend,
    config: &EngineConfig,
    client_id: ClientId,
) -> Result<ClientLinks> {
    let spec = QuerySpec::new(TableName::Client.as_str())
        .with_filters(vec![id_filter("client_id", client_id.get())])
        .with_columns(Projection::Columns(vec![
            "client_id".into(),
            "dialing_db".into(),
            "reporting_db".into(),
        ]))
        .with_limit(Some(1));
    let query = Guardrails::new(&config.limits).validate_select(
        spec,
        &[TableName::Client],
        "resolve_client",
    )?;
    let table = TableRef::from_qualified(&config.client_table)?;
    let built = SqlBuilder::new(backend.dialect()).select(&query, &table);

    let rows = fetch_bounded(backend, &config.limits, &built).await?;
    let row = rows.first().ok_or(ContactGateError::UnknownClient {
        client_id: client_id.get(),
    })?;

    let dialing = text_field(row, "dialing_db")
        .ok_or_else(|| {
            ContactGateError::configuration(format!("client {client_id} has no dialing link"))
        })
        .and_then(|link| DbLink::new(&link))?;
    let reporting = text_field(row, "reporting_db")
        .map(|link| DbLink::new(&link))
        .transpose()?;

    tracing::debug!(
        "Client {} resolved to dialing link {} (reporting: {})",
        client_id,
        dialing,
        reporting.as_ref().map_or("none", DbLink::as_str)
    );
    Ok(ClientLinks {
        client_id,
        dialing,
        reporting,
    })
}

/// Reads the ordered skill ids of a client.
///
/// One row past `max_in_values` is requested so a client with too many
/// skills is reported by the membership check instead of being cut short.
///
/// # Errors
/// Returns `UnknownClient` when the client owns no skills, or any backend
/// error.
pub async fn resolve_skills(
    backend: &dyn Backend,
    config: &EngineConfig,
    client_id: ClientId,
) -> Result<Vec<SkillId>> {
    let spec = QuerySpec::new(TableName::SkillXClient.as_str())
        .with_filters(vec![id_filter("client_id", client_id.get())])
        .with_columns(Projection::Columns(vec!["skill_id".into()]))
        .with_limit(Some(
            i64::from(config.limits.max_in_values)
                .saturating_add(1)
                .min(i64::from(config.limits.max_rows)),
        ));
    let query = Guardrails::new(&config.limits).validate_select(
        spec,
        &[TableName::SkillXClient],
        "resolve_skills",
    )?;
    let (schema, name) = TableName::SkillXClient.spec().physical;
    let built = SqlBuilder::new(backend.dialect()).select(&query, &TableRef::local(schema, name));

    let rows = fetch_bounded(backend, &config.limits, &built).await?;
    let mut skills: Vec<SkillId> = rows
        .iter()
        .filter_map(|row| integer_field(row, "skill_id"))
        .map(SkillId::new)
        .collect();
    skills.dedup();

    if skills.is_empty() {
        return Err(ContactGateError::UnknownClient {
            client_id: client_id.get(),
        });
    }
    tracing::debug!("Client {} owns {} skills", client_id, skills.len());
    Ok(skills)
}

/// Removes caller `client_id` filters from transaction filters.
///
/// On transaction tables `client_id` physically holds skills, so a caller
/// filter on it can only restate the tool's client; the skill membership
/// predicate replaces it.
///
/// # Errors
/// Returns `InvalidArgument` when a `client_id` filter names another client
/// or uses anything but equality.
pub fn take_client_filter(filters: &mut Vec<Filter>, client_id: ClientId) -> Result<()> {
    let mut error = None;
    filters.retain(|filter| {
        if filter.column != "client_id" {
            return true;
        }
        let matches = filter.operator == Operator::Eq
            && match &filter.value {
                FilterValue::Single(SqlValue::Int(id)) => *id == client_id.get(),
                FilterValue::Single(SqlValue::Text(id)) => {
                    id.trim().parse::<i64>().ok() == Some(client_id.get())
                }
                _ => false,
            };
        if !matches {
            error = Some(ContactGateError::invalid_argument(
                "client_id",
                format!("transaction filters may only restate client {client_id}; filter on skill_id instead"),
            ));
        }
        false
    });
    error.map_or(Ok(()), Err)
}

/// Membership predicate restricting transactions to `skills`.
pub fn skill_filter(skills: &[SkillId]) -> Filter {
    Filter::new(
        "skill_id",
        Operator::In,
        FilterValue::List(skills.iter().map(|s| SqlValue::Int(s.get())).collect()),
    )
}

fn id_filter(column: &str, id: i64) -> Filter {
    Filter::new(column, Operator::Eq, FilterValue::Single(SqlValue::Int(id)))
}

fn text_field(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Reads an integer column that a driver may have returned as a number or
/// as text.
pub(crate) fn integer_field(row: &Row, column: &str) -> Option<i64> {
    match row.get(column)? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::normalize_filters;
    use serde_json::json;

    #[test]
    fn test_client_id_must_be_positive() {
        assert!(ClientId::new(150_723).is_ok());
        assert_eq!(ClientId::new(0).unwrap_err().kind(), "InvalidArgument");
        assert!(ClientId::new(-4).is_err());
    }

    #[test]
    fn test_take_client_filter_restating_client() {
        let client = ClientId::new(150_723).unwrap();
        let mut filters =
            normalize_filters(json!({"client_id": 150_723, "outcome": "FAILED"}).as_object())
                .unwrap();
        take_client_filter(&mut filters, client).unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].column, "outcome");

        let mut filters = normalize_filters(json!({"client_id": "150723"}).as_object()).unwrap();
        assert!(take_client_filter(&mut filters, client).is_ok());
        assert!(filters.is_empty());
    }

    #[test]
    fn test_take_client_filter_other_client_rejected() {
        let client = ClientId::new(150_723).unwrap();
        let mut filters = normalize_filters(json!({"client_id": 99}).as_object()).unwrap();
        let err = take_client_filter(&mut filters, client).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");

        let mut filters =
            normalize_filters(json!({"client_id": [">", 150_723]}).as_object()).unwrap();
        assert!(take_client_filter(&mut filters, client).is_err());
    }

    #[test]
    fn test_skill_filter() {
        let filter = skill_filter(&[SkillId::new(10), SkillId::new(11)]);
        assert_eq!(filter.column, "skill_id");
        assert_eq!(filter.operator, Operator::In);
        assert_eq!(
            filter.value,
            FilterValue::List(vec![SqlValue::Int(10), SqlValue::Int(11)])
        );
    }

    #[test]
    fn test_archive_link_fallback() {
        let links = ClientLinks {
            client_id: ClientId::new(1).unwrap(),
            dialing: DbLink::new("DIAL1").unwrap(),
            reporting: None,
        };
        assert_eq!(links.archive_link().as_str(), "DIAL1");

        let links = ClientLinks {
            reporting: Some(DbLink::new("REP1").unwrap()),
            ..links
        };
        assert_eq!(links.archive_link().as_str(), "REP1");
    }

    #[test]
    fn test_integer_field_accepts_number_and_text() {
        let row = json!({"a": 5, "b": "6", "c": 7.0, "d": null});
        let row = row.as_object().unwrap();
        assert_eq!(integer_field(row, "a"), Some(5));
        assert_eq!(integer_field(row, "b"), Some(6));
        assert_eq!(integer_field(row, "c"), Some(7));
        assert_eq!(integer_field(row, "d"), None);
        assert_eq!(integer_field(row, "missing"), None);
    }
}
