//! Parameterized SQL generation.
//!
//! The builder turns validated requests into `(sql, params)` pairs for one
//! [`Dialect`]. Identifiers come from the catalog and are always quoted;
//! every value becomes a placeholder. Logical column names are translated to
//! physical ones here and aliased back in projections, so result rows always
//! carry logical names.

use crate::catalog::TableSpec;
use crate::dialect::{Dialect, TableRef};
use crate::filter::{Filter, FilterValue, Operator, SqlValue};
use crate::guardrails::{OrderBy, ValidatedBulkInsert, ValidatedInsert, ValidatedQuery};
use serde::Serialize;

/// Bind parameter budget per bulk insert statement.
const POSTGRES_PARAM_BUDGET: usize = 32_000;
const ORACLE_PARAM_BUDGET: usize = 4_000;

/// A statement ready for a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltQuery {
    /// SQL text containing only placeholders
    pub sql: String,
    /// Values in placeholder order
    pub params: Vec<SqlValue>,
    /// Key column of an `INSERT ... RETURNING` statement
    pub returning: Option<String>,
}

impl BuiltQuery {
    fn new(sql: String, params: Vec<SqlValue>) -> Self {
        Self {
            sql,
            params,
            returning: None,
        }
    }
}

/// Collects bind values and hands out placeholders.
struct Binds {
    dialect: Dialect,
    values: Vec<SqlValue>,
}

impl Binds {
    const fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    /// NULL is written as a literal: an untyped bind would take the driver's
    /// default type and fail to coerce into non-text columns.
    fn bind(&mut self, value: SqlValue) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }
}

/// SQL builder for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct SqlBuilder {
    dialect: Dialect,
}

impl SqlBuilder {
    /// Creates a builder for `dialect`.
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Dialect this builder writes.
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Builds a paged `SELECT`.
    pub fn select(&self, query: &ValidatedQuery, table: &TableRef) -> BuiltQuery {
        let spec = query.table();
        let mut binds = Binds::new(self.dialect);

        let columns = query
            .columns()
            .iter()
            .map(|column| self.projection(spec, None, column, column))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("SELECT {columns} FROM {}", self.dialect.render_table(table));
        sql.push_str(&self.where_clause(spec, None, query.filters(), &mut binds));
        sql.push_str(&self.order_clause(spec, None, query.order_by()));
        sql.push_str(&self.pagination(query.limit(), query.offset(), &mut binds));

        tracing::debug!("Built {} select on {}: {}", self.dialect, table, sql);
        BuiltQuery::new(sql, binds.values)
    }

    /// Builds `SELECT COUNT(*)` over the query's filters, ignoring paging.
    pub fn count(&self, query: &ValidatedQuery, table: &TableRef) -> BuiltQuery {
        let spec = query.table();
        let mut binds = Binds::new(self.dialect);

        let mut sql = format!(
            "SELECT COUNT(*) AS {} FROM {}",
            self.dialect.quote_identifier("count"),
            self.dialect.render_table(table)
        );
        sql.push_str(&self.where_clause(spec, None, query.filters(), &mut binds));

        tracing::debug!("Built {} count on {}: {}", self.dialect, table, sql);
        BuiltQuery::new(sql, binds.values)
    }

    /// Builds the contact/details join.
    ///
    /// Projected columns are prefixed `contact_` and `details_`; paging and
    /// ordering come from the contact query.
    pub fn select_contacts_with_details(
        &self,
        contact: &ValidatedQuery,
        details: &ValidatedQuery,
        contact_table: &TableRef,
        details_table: &TableRef,
    ) -> BuiltQuery {
        let contact_spec = contact.table();
        let details_spec = details.table();
        let mut binds = Binds::new(self.dialect);

        let columns = contact
            .columns()
            .iter()
            .map(|c| self.projection(contact_spec, Some("c"), c, &format!("contact_{c}")))
            .chain(
                details
                    .columns()
                    .iter()
                    .map(|c| self.projection(details_spec, Some("d"), c, &format!("details_{c}"))),
            )
            .collect::<Vec<_>>()
            .join(", ");

        let key = self.dialect.quote_identifier(contact_spec.primary_key);
        let mut sql = format!(
            "SELECT {columns} FROM {} c LEFT JOIN {} d ON c.{key} = d.{key}",
            self.dialect.render_table(contact_table),
            self.dialect.render_table(details_table),
        );

        let mut predicates = self.predicates(contact_spec, Some("c"), contact.filters(), &mut binds);
        predicates.extend(self.predicates(details_spec, Some("d"), details.filters(), &mut binds));
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        sql.push_str(&self.order_clause(contact_spec, Some("c"), contact.order_by()));
        sql.push_str(&self.pagination(contact.limit(), contact.offset(), &mut binds));

        tracing::debug!("Built {} contact/details join: {}", self.dialect, sql);
        BuiltQuery::new(sql, binds.values)
    }

    /// Builds a single-row insert returning the table's primary key.
    pub fn insert_returning(&self, insert: &ValidatedInsert, table: &TableRef) -> BuiltQuery {
        let spec = insert.table();
        let mut binds = Binds::new(self.dialect);

        let placeholders = insert
            .values()
            .iter()
            .map(|value| binds.bind(value.clone()))
            .collect::<Vec<_>>()
            .join(", ");
        let out = self.dialect.placeholder(binds.values.len() + 1);

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders}){}",
            self.dialect.render_table(table),
            self.column_list(spec, insert.columns()),
            self.dialect.render_returning(spec.primary_key, &out),
        );

        tracing::debug!("Built {} insert on {}: {}", self.dialect, table, sql);
        BuiltQuery {
            sql,
            params: binds.values,
            returning: Some(spec.primary_key.to_string()),
        }
    }

    /// Builds multi-row inserts, chunked so no statement exceeds the
    /// dialect's bind budget. Returns no statements for an empty insert.
    pub fn bulk_insert(&self, insert: &ValidatedBulkInsert, table: &TableRef) -> Vec<BuiltQuery> {
        let spec = insert.table();
        let width = insert.columns().len().max(1);
        let budget = match self.dialect {
            Dialect::Postgres => POSTGRES_PARAM_BUDGET,
            Dialect::Oracle => ORACLE_PARAM_BUDGET,
        };
        let rows_per_statement = (budget / width).max(1);
        let target = self.dialect.render_table(table);
        let columns = self.column_list(spec, insert.columns());

        let statements: Vec<BuiltQuery> = insert
            .rows()
            .chunks(rows_per_statement)
            .map(|chunk| {
                let mut binds = Binds::new(self.dialect);
                let tuples: Vec<String> = chunk
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|value| binds.bind(value.clone()))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .collect();

                // Oracle links reject multi-table INSERT ALL, so rows are
                // unioned from DUAL instead of using a VALUES list.
                let sql = match self.dialect {
                    Dialect::Postgres => format!(
                        "INSERT INTO {target} ({columns}) VALUES ({})",
                        tuples.join("), (")
                    ),
                    Dialect::Oracle => format!(
                        "INSERT INTO {target} ({columns}) SELECT {} FROM DUAL",
                        tuples.join(" FROM DUAL UNION ALL SELECT ")
                    ),
                };
                BuiltQuery::new(sql, binds.values)
            })
            .collect();

        tracing::debug!(
            "Built {} bulk insert on {}: {} rows in {} statements",
            self.dialect,
            table,
            insert.rows().len(),
            statements.len()
        );
        statements
    }

    fn column(&self, spec: &TableSpec, alias: Option<&str>, logical: &str) -> String {
        let quoted = self.dialect.quote_identifier(spec.physical_column(logical));
        match alias {
            Some(alias) => format!("{alias}.{quoted}"),
            None => quoted,
        }
    }

    fn projection(
        &self,
        spec: &TableSpec,
        alias: Option<&str>,
        logical: &str,
        output: &str,
    ) -> String {
        let column = self.column(spec, alias, logical);
        if alias.is_none() && spec.physical_column(logical) == output {
            column
        } else {
            format!("{column} AS {}", self.dialect.quote_identifier(output))
        }
    }

    fn column_list(&self, spec: &TableSpec, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.column(spec, None, c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn where_clause(
        &self,
        spec: &TableSpec,
        alias: Option<&str>,
        filters: &[Filter],
        binds: &mut Binds,
    ) -> String {
        let predicates = self.predicates(spec, alias, filters, binds);
        if predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", predicates.join(" AND "))
        }
    }

    fn predicates(
        &self,
        spec: &TableSpec,
        alias: Option<&str>,
        filters: &[Filter],
        binds: &mut Binds,
    ) -> Vec<String> {
        filters
            .iter()
            .map(|filter| self.predicate(&self.column(spec, alias, &filter.column), filter, binds))
            .collect()
    }

    fn predicate(&self, column: &str, filter: &Filter, binds: &mut Binds) -> String {
        match (&filter.value, filter.operator) {
            (_, Operator::IsNull) => format!("{column} IS NULL"),
            (_, Operator::IsNotNull) => format!("{column} IS NOT NULL"),
            (FilterValue::List(values), op) => {
                let not = if op == Operator::NotIn { "NOT " } else { "" };
                let placeholders = values
                    .iter()
                    .map(|v| binds.bind(v.clone()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{column} {not}IN ({placeholders})")
            }
            (FilterValue::Range(low, high), _) => {
                let low = binds.bind(low.clone());
                let high = binds.bind(high.clone());
                format!("{column} BETWEEN {low} AND {high}")
            }
            (FilterValue::Single(value), op) => {
                let ph = binds.bind(value.clone());
                match op {
                    Operator::Like => format!("{column} LIKE {ph}"),
                    Operator::NotLike => format!("{column} NOT LIKE {ph}"),
                    Operator::ILike => self.dialect.render_case_insensitive_like(column, &ph, false),
                    Operator::NotILike => {
                        self.dialect.render_case_insensitive_like(column, &ph, true)
                    }
                    _ => format!("{column} {} {ph}", op.comparison_sql().unwrap_or("=")),
                }
            }
            // Guardrails::check_filter only admits a missing operand on null checks
            (FilterValue::None, _) => "1 = 0".to_string(),
        }
    }

    fn order_clause(&self, spec: &TableSpec, alias: Option<&str>, order_by: &[OrderBy]) -> String {
        if order_by.is_empty() {
            return String::new();
        }
        let terms = order_by
            .iter()
            .map(|term| {
                format!(
                    "{} {}",
                    self.column(spec, alias, &term.column),
                    term.direction.as_sql()
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(" ORDER BY {terms}")
    }

    fn pagination(&self, limit: u32, offset: u32, binds: &mut Binds) -> String {
        self.dialect
            .render_pagination(limit, offset, |value| binds.bind(SqlValue::Int(value)))
    }
}
