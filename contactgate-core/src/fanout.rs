//! Transaction fan-out across the current table and monthly archives.
//!
//! A transaction query runs unchanged against `TRANSACTION` and the `N`
//! previous monthly archives `TRANSACTION_MMYY`. Every table is asked for the
//! global top `offset + limit` rows in the requested order, so merging the
//! per-table results and cutting the window again gives the exact answer.
//! A failing table is reported alongside the surviving rows; only a fan-out
//! where every table fails is an error.

use crate::backends::{Backend, Row, fetch_bounded};
use crate::builder::SqlBuilder;
use crate::catalog::{SortDirection, TableName};
use crate::config::QueryLimits;
use crate::dialect::{Dialect, TableRef};
use crate::error::{ContactGateError, Result};
use crate::guardrails::{OrderBy, ValidatedQuery};
use crate::skills::ClientLinks;
use chrono::{Datelike, Months, NaiveDate};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::time::Instant;

/// A table that could not be read during a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFailure {
    /// Table as `SCHEMA.TABLE@LINK`
    pub table: String,
    /// Error kind, as returned by `ContactGateError::kind`
    pub kind: String,
    /// Error message (no parameter values)
    pub message: String,
}

/// Merged rows plus the tables that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanoutResult {
    /// Rows in global order, cut to the requested window
    pub rows: Vec<Row>,
    /// Tables that failed; empty on full success
    pub failures: Vec<TableFailure>,
}

impl FanoutResult {
    /// True when every table answered.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// `MMYY` suffixes of the `count` calendar months before `today`'s month,
/// most recent first.
pub fn archive_suffixes(today: NaiveDate, count: u8) -> Vec<String> {
    let first_of_month = today.with_day(1).unwrap_or(today);
    (1..=u32::from(count))
        .filter_map(|back| first_of_month.checked_sub_months(Months::new(back)))
        .map(|month| month.format("%m%y").to_string())
        .collect()
}

/// Tables a transaction query for `links` must read: the current table on
/// the dialing link, then the archives on the reporting link.
pub fn transaction_tables(
    links: &ClientLinks,
    dialect: Dialect,
    today: NaiveDate,
    archive_count: u8,
) -> Vec<TableRef> {
    let (schema, name) = TableName::Transaction.spec().physical;
    let current = TableRef::local(schema, name).via(dialect, &links.dialing);
    let archives = archive_suffixes(today, archive_count)
        .into_iter()
        .map(|suffix| {
            TableRef::local(schema, format!("{name}_{suffix}")).via(dialect, links.archive_link())
        });
    std::iter::once(current).chain(archives).collect()
}

/// Runs `query` against every table concurrently and merges the results.
///
/// # Errors
/// Returns `PartialFanoutFailure` listing every table when all of them fail.
pub async fn run_fanout(
    backend: &dyn Backend,
    limits: &QueryLimits,
    query: &ValidatedQuery,
    tables: &[TableRef],
) -> Result<FanoutResult> {
    let limit = query.limit() as usize;
    let offset = query.offset() as usize;
    let order_by = query.order_by().to_vec();

    let mut per_table = query
        .clone()
        .with_window(query.limit().saturating_add(query.offset()), 0);
    let added_columns = per_table.project_order_columns();

    let builder = SqlBuilder::new(backend.dialect());
    let statements: Vec<(String, _)> = tables
        .iter()
        .map(|table| (table.to_string(), builder.select(&per_table, table)))
        .collect();

    let started = Instant::now();
    let outcomes: Vec<(String, Result<Vec<Row>>)> = stream::iter(statements.iter().map(
        |(table, built)| async move { (table.clone(), fetch_bounded(backend, limits, built).await) },
    ))
    .buffered(tables.len().max(1))
    .collect()
    .await;

    let mut rows = Vec::new();
    let mut failures = Vec::new();
    for (table, outcome) in outcomes {
        match outcome {
            Ok(table_rows) => {
                tracing::info!("Read {} rows from {}", table_rows.len(), table);
                rows.extend(table_rows);
            }
            Err(e) => {
                tracing::warn!("Fan-out read failed on {}: {}", table, e);
                failures.push(TableFailure {
                    table,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    if !tables.is_empty() && failures.len() == tables.len() {
        return Err(ContactGateError::PartialFanoutFailure { failures });
    }

    let mut rows = merge_rows(rows, &order_by, offset, limit);
    if !added_columns.is_empty() {
        for row in &mut rows {
            for column in &added_columns {
                row.remove(column);
            }
        }
    }

    tracing::info!(
        "Fan-out over {} tables returned {} rows ({} failed) in {}ms",
        tables.len(),
        rows.len(),
        failures.len(),
        started.elapsed().as_millis()
    );
    Ok(FanoutResult { rows, failures })
}

/// Sorts rows by `order_by` and cuts the `offset`/`limit` window.
///
/// The sort is stable, so rows equal on every key keep table order. NULLs
/// sort after every value, matching both backends' default.
pub fn merge_rows(mut rows: Vec<Row>, order_by: &[OrderBy], offset: usize, limit: usize) -> Vec<Row> {
    rows.sort_by(|a, b| {
        order_by
            .iter()
            .map(|term| {
                let ordering = compare_values(a.get(&term.column), b.get(&term.column));
                match term.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    rows.into_iter().skip(offset).take(limit).collect()
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_present(a, b),
    }
}

fn compare_present(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

const fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
