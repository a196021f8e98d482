//! Guardrail validation.
//!
//! The validator is the only way to obtain a [`ValidatedQuery`],
//! [`ValidatedInsert`] or [`ValidatedBulkInsert`], and the SQL builder accepts
//! nothing else. Every identifier that can reach SQL text is checked against
//! the catalog here, and every numeric limit is enforced before a backend is
//! touched.
//!
//! # Security Guarantees
//! - Tables and columns come from compiled-in allow-lists only
//! - Limits are rejected when exceeded, never silently clamped
//! - Mutation and schema keywords are refused in string filter values

use crate::backends::Row;
use crate::catalog::{
    AM_OPTIONS, CONTACT_SOURCES, DISALLOWED_KEYWORDS, Operation, SortDirection, TableName,
    TableSpec,
};
use crate::config::{LimitName, QueryLimits};
use crate::error::{ContactGateError, Result};
use crate::filter::{Filter, FilterValue, Operator, SqlValue};
use serde_json::Value;

/// Columns requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every allow-listed column
    #[default]
    All,
    /// An explicit list
    Columns(Vec<String>),
}

impl Projection {
    /// Parses `"*"`, a column name, a comma separated string or a list.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for any other JSON shape.
    pub fn parse(field: &str, value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(Self::All),
            Some(Value::String(s)) if s.trim() == "*" => Ok(Self::All),
            Some(Value::String(s)) => Ok(Self::Columns(
                s.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Some(Value::Array(items)) => {
                let columns = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            ContactGateError::invalid_argument(field, "column names must be strings")
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                if columns.iter().any(|c| c.trim() == "*") {
                    return Ok(Self::All);
                }
                Ok(Self::Columns(columns))
            }
            Some(_) => Err(ContactGateError::invalid_argument(
                field,
                "expected \"*\", a column name or a list of column names",
            )),
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Lowercase logical column
    pub column: String,
    /// Direction
    pub direction: SortDirection,
}

impl OrderBy {
    /// Creates an ordering term.
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    /// Parses `"col"`, `"col DESC"`, a comma separated string of those, or a
    /// list of those.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for unknown directions or other shapes.
    pub fn parse_list(value: Option<&Value>) -> Result<Vec<Self>> {
        let terms: Vec<String> = match value {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ContactGateError::invalid_argument("order_by", "terms must be strings")
                    })
                })
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(ContactGateError::invalid_argument(
                    "order_by",
                    "expected \"column [ASC|DESC]\" or a list of those",
                ));
            }
        };

        terms
            .iter()
            .map(|term| term.trim())
            .filter(|term| !term.is_empty())
            .map(Self::parse_term)
            .collect()
    }

    fn parse_term(term: &str) -> Result<Self> {
        let mut parts = term.split_whitespace();
        let column = parts.next().unwrap_or_default().to_lowercase();
        let direction = match parts.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => SortDirection::Asc,
            Some("DESC") => SortDirection::Desc,
            Some(other) => {
                return Err(ContactGateError::invalid_argument(
                    "order_by",
                    format!("unknown direction '{other}' for column '{column}'"),
                ));
            }
        };
        if parts.next().is_some() {
            return Err(ContactGateError::invalid_argument(
                "order_by",
                format!("term '{term}' has too many parts"),
            ));
        }
        Ok(Self::new(column, direction))
    }
}

/// An unvalidated read request.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    /// Table name as given by the caller
    pub table: String,
    /// Normalized filters
    pub filters: Vec<Filter>,
    /// Requested columns
    pub columns: Projection,
    /// Requested row limit
    pub limit: Option<i64>,
    /// Requested offset
    pub offset: Option<i64>,
    /// Requested ordering
    pub order_by: Vec<OrderBy>,
    /// Filters the tool adds after validation, counted against the filter
    /// budget up front
    pub reserved_filters: usize,
}

impl QuerySpec {
    /// Creates a request for `table` with defaults everywhere else.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Sets the filters.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn with_columns(mut self, columns: Projection) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: Option<i64>) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub fn with_order_by(mut self, order_by: Vec<OrderBy>) -> Self {
        self.order_by = order_by;
        self
    }

    /// Reserves filter slots for predicates added with
    /// [`Guardrails::add_filter`].
    #[must_use]
    pub const fn with_reserved_filters(mut self, count: usize) -> Self {
        self.reserved_filters = count;
        self
    }
}

/// A read request that passed every guardrail.
///
/// Only [`Guardrails`] constructs this type.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    table: &'static TableSpec,
    filters: Vec<Filter>,
    columns: Vec<String>,
    limit: u32,
    offset: u32,
    order_by: Vec<OrderBy>,
}

impl ValidatedQuery {
    /// Catalog entry of the target table.
    pub const fn table(&self) -> &'static TableSpec {
        self.table
    }

    /// Filters, all on allow-listed columns.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Projected logical columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row limit.
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Row offset.
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Ordering, ending with the primary key.
    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Adds ordering columns missing from the projection and returns them,
    /// so rows from several tables can be merged in order.
    pub(crate) fn project_order_columns(&mut self) -> Vec<String> {
        let missing: Vec<String> = self
            .order_by
            .iter()
            .map(|term| term.column.clone())
            .filter(|column| !self.columns.contains(column))
            .collect();
        self.columns.extend(missing.iter().cloned());
        missing
    }

    /// Replaces the paging window, used when each fan-out table must return
    /// the global top rows.
    pub(crate) const fn with_window(mut self, limit: u32, offset: u32) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// An insert that passed every guardrail.
#[derive(Debug, Clone)]
pub struct ValidatedInsert {
    table: &'static TableSpec,
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl ValidatedInsert {
    /// Catalog entry of the target table.
    pub const fn table(&self) -> &'static TableSpec {
        self.table
    }

    /// Logical insert columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Value written to `column`, if any.
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }
}

/// A multi-row insert that passed every guardrail.
#[derive(Debug, Clone)]
pub struct ValidatedBulkInsert {
    table: &'static TableSpec,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl ValidatedBulkInsert {
    /// Catalog entry of the target table.
    pub const fn table(&self) -> &'static TableSpec {
        self.table
    }

    /// Logical insert columns shared by every row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row values in column order.
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }
}

/// The guardrail validator.
#[derive(Debug, Clone, Copy)]
pub struct Guardrails<'a> {
    limits: &'a QueryLimits,
}

impl<'a> Guardrails<'a> {
    /// Creates a validator over the configured limits.
    pub const fn new(limits: &'a QueryLimits) -> Self {
        Self { limits }
    }

    /// Validates a read request.
    ///
    /// `allowed` lists the tables the calling tool may read; `operation`
    /// names the tool in `ForbiddenTable` errors.
    ///
    /// # Errors
    /// Returns `ForbiddenTable`, `ForbiddenColumn`, `LimitExceeded`,
    /// `DisallowedKeyword`, `MalformedFilter` or `InvalidArgument`; nothing
    /// has been sent to a backend when any of these is returned.
    pub fn validate_select(
        &self,
        spec: QuerySpec,
        allowed: &[TableName],
        operation: &str,
    ) -> Result<ValidatedQuery> {
        let table = Self::resolve_table(&spec.table, allowed, Operation::Select, operation)?;

        self.check_filter_count(spec.filters.len() + spec.reserved_filters)?;
        let filters = spec
            .filters
            .into_iter()
            .map(|filter| self.check_filter(table, filter))
            .collect::<Result<Vec<_>>>()?;

        let columns = Self::check_projection(table, &spec.columns)?;
        let (limit, offset) = self.check_window(spec.limit, spec.offset)?;
        let order_by = Self::check_order_by(table, spec.order_by)?;

        Ok(ValidatedQuery {
            table,
            filters,
            columns,
            limit,
            offset,
            order_by,
        })
    }

    /// Adds a filter to an already validated query.
    ///
    /// The filter goes through the same column, membership size, keyword and
    /// operand checks as caller filters, and counts against `max_filters`.
    ///
    /// # Errors
    /// Returns `ForbiddenColumn`, `LimitExceeded`, `DisallowedKeyword` or
    /// `MalformedFilter`; the query is left unchanged.
    pub fn add_filter(&self, query: &mut ValidatedQuery, filter: Filter) -> Result<()> {
        self.check_filter_count(query.filters.len() + 1)?;
        let filter = self.check_filter(query.table, filter)?;
        query.filters.push(filter);
        Ok(())
    }

    /// Validates the two halves of the contact/details join.
    ///
    /// The filter budget is shared by both sides; paging and ordering come
    /// from the contact side only.
    ///
    /// # Errors
    /// As [`Guardrails::validate_select`].
    pub fn validate_join(
        &self,
        contact: QuerySpec,
        details: QuerySpec,
    ) -> Result<(ValidatedQuery, ValidatedQuery)> {
        self.check_filter_count(contact.filters.len() + details.filters.len())?;
        let operation = "select_contacts_with_details";
        let contact = self.validate_select(contact, &[TableName::Contact], operation)?;
        let details = self.validate_select(details, &[TableName::ContactDetails], operation)?;
        Ok((contact, details))
    }

    /// Validates a single-row insert.
    ///
    /// # Errors
    /// Returns `ForbiddenTable` when the table does not accept inserts,
    /// `ForbiddenColumn` for columns off the insert allow-list, and
    /// `InvalidArgument` for nested values.
    pub fn validate_insert(
        &self,
        table: TableName,
        row: &serde_json::Map<String, Value>,
    ) -> Result<ValidatedInsert> {
        let spec = Self::insert_table(table)?;
        let mut entries: Vec<(String, &Value)> = row
            .iter()
            .map(|(column, value)| (column.trim().to_lowercase(), value))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut columns = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        for (column, value) in entries {
            if !spec.is_insertable(&column) {
                return Err(ContactGateError::forbidden_column(spec.name.as_str(), column));
            }
            values.push(insert_value(&column, value)?);
            columns.push(column);
        }
        if columns.is_empty() {
            return Err(ContactGateError::invalid_argument(
                "data",
                "insert needs at least one column",
            ));
        }
        Ok(ValidatedInsert {
            table: spec,
            columns,
            values,
        })
    }

    /// Validates a multi-row insert of `columns` taken from each row.
    ///
    /// Columns missing from a row are written as NULL.
    ///
    /// # Errors
    /// Returns `ForbiddenTable`, `ForbiddenColumn`, `LimitExceeded` when more
    /// than `max_rows` rows are given, or `InvalidArgument` for nested values.
    pub fn validate_bulk_insert(
        &self,
        table: TableName,
        columns: &[&str],
        rows: &[Row],
    ) -> Result<ValidatedBulkInsert> {
        let spec = Self::insert_table(table)?;
        if let Some(column) = columns.iter().find(|c| !spec.is_insertable(c)) {
            return Err(ContactGateError::forbidden_column(spec.name.as_str(), *column));
        }
        if rows.len() > self.limits.max_rows as usize {
            return Err(ContactGateError::limit_exceeded(
                LimitName::MaxRows,
                rows.len() as u64,
                self.limits.max_rows,
            ));
        }

        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| row.get(*column).map_or(Ok(SqlValue::Null), |v| insert_value(column, v)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ValidatedBulkInsert {
            table: spec,
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
        })
    }

    /// Validates a campaign payload for `client_id`.
    ///
    /// The tool-level client id is authoritative: a `client_id` inside the
    /// payload must agree with it and is otherwise filled in.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a non-positive client id, a disagreeing
    /// payload client id, or an unknown `am_option`/`contact_source`, and
    /// `ForbiddenColumn` for columns off the campaign allow-list.
    pub fn validate_campaign(
        &self,
        client_id: i64,
        data: &serde_json::Map<String, Value>,
    ) -> Result<ValidatedInsert> {
        if client_id <= 0 {
            return Err(ContactGateError::invalid_argument(
                "client_id",
                "must be a positive integer",
            ));
        }

        let mut payload = serde_json::Map::with_capacity(data.len() + 1);
        for (column, value) in data {
            let column = column.trim().to_lowercase();
            let value = match column.as_str() {
                "client_id" => {
                    if value.as_i64() != Some(client_id) {
                        return Err(ContactGateError::invalid_argument(
                            "client_id",
                            "campaign data client_id must match the requested client",
                        ));
                    }
                    continue;
                }
                "am_option" => Value::String(enum_value("am_option", value, AM_OPTIONS)?),
                "contact_source" => {
                    Value::String(enum_value("contact_source", value, CONTACT_SOURCES)?)
                }
                _ => value.clone(),
            };
            payload.insert(column, value);
        }
        payload.insert("client_id".to_string(), Value::from(client_id));

        self.validate_insert(TableName::Campaign, &payload)
    }

    fn resolve_table(
        name: &str,
        allowed: &[TableName],
        kind: Operation,
        operation: &str,
    ) -> Result<&'static TableSpec> {
        check_keywords("table", name)?;
        let table = TableName::parse(name)
            .filter(|t| allowed.contains(t))
            .ok_or_else(|| ContactGateError::forbidden_table(name, operation))?;
        let spec = table.spec();
        if !spec.allows(kind) {
            return Err(ContactGateError::forbidden_table(name, kind.to_string()));
        }
        Ok(spec)
    }

    fn insert_table(table: TableName) -> Result<&'static TableSpec> {
        let spec = table.spec();
        if spec.allows(Operation::Insert) {
            Ok(spec)
        } else {
            Err(ContactGateError::forbidden_table(
                table.as_str(),
                Operation::Insert.to_string(),
            ))
        }
    }

    fn check_filter_count(&self, count: usize) -> Result<()> {
        if count > self.limits.max_filters as usize {
            return Err(ContactGateError::limit_exceeded(
                LimitName::MaxFilters,
                count as u64,
                self.limits.max_filters,
            ));
        }
        Ok(())
    }

    /// Checks one filter and returns it with numeric-column operands
    /// converted from text.
    fn check_filter(&self, table: &TableSpec, filter: Filter) -> Result<Filter> {
        check_column(table, &filter.column)?;

        if let FilterValue::List(values) = &filter.value
            && values.len() > self.limits.max_in_values as usize
        {
            return Err(ContactGateError::limit_exceeded(
                LimitName::MaxInValues,
                values.len() as u64,
                self.limits.max_in_values,
            ));
        }

        for value in filter.value.values() {
            if let Some(text) = value.as_text() {
                check_keywords(&filter.column, text)?;
            }
        }

        let arity_ok = match filter.operator {
            Operator::IsNull | Operator::IsNotNull => matches!(filter.value, FilterValue::None),
            Operator::In | Operator::NotIn => {
                matches!(&filter.value, FilterValue::List(v) if !v.is_empty())
            }
            Operator::Between => matches!(filter.value, FilterValue::Range(..)),
            _ => matches!(filter.value, FilterValue::Single(_)),
        };
        if !arity_ok {
            return Err(ContactGateError::malformed_filter(
                &filter.column,
                "operand does not match the operator",
            ));
        }

        if !table.is_numeric(&filter.column) || filter.operator.is_pattern() {
            return Ok(filter);
        }
        let Filter {
            column,
            operator,
            value,
        } = filter;
        match value.try_map(SqlValue::into_numeric) {
            Some(value) => Ok(Filter::new(column, operator, value)),
            None => Err(ContactGateError::malformed_filter(column, "expects a number")),
        }
    }

    fn check_projection(table: &TableSpec, projection: &Projection) -> Result<Vec<String>> {
        match projection {
            Projection::All => Ok(table.columns.all()),
            Projection::Columns(columns) if columns.is_empty() => Ok(table.columns.all()),
            Projection::Columns(columns) => columns
                .iter()
                .map(|column| {
                    let column = column.trim().to_lowercase();
                    check_column(table, &column)?;
                    Ok(column)
                })
                .collect(),
        }
    }

    fn check_window(&self, limit: Option<i64>, offset: Option<i64>) -> Result<(u32, u32)> {
        let limit = match limit {
            None => self.limits.default_limit,
            Some(l) if l < 1 => {
                return Err(ContactGateError::invalid_argument(
                    "limit",
                    "must be at least 1",
                ));
            }
            Some(l) if l > i64::from(self.limits.max_rows) => {
                return Err(ContactGateError::limit_exceeded(
                    LimitName::MaxRows,
                    l.unsigned_abs(),
                    self.limits.max_rows,
                ));
            }
            Some(l) => u32::try_from(l).unwrap_or(self.limits.max_rows),
        };

        let offset = match offset {
            None => 0,
            Some(o) if o < 0 => {
                return Err(ContactGateError::invalid_argument(
                    "offset",
                    "cannot be negative",
                ));
            }
            Some(o) if o > i64::from(self.limits.max_offset) => {
                return Err(ContactGateError::limit_exceeded(
                    LimitName::MaxOffset,
                    o.unsigned_abs(),
                    self.limits.max_offset,
                ));
            }
            Some(o) => u32::try_from(o).unwrap_or(self.limits.max_offset),
        };

        Ok((limit, offset))
    }

    fn check_order_by(table: &TableSpec, order_by: Vec<OrderBy>) -> Result<Vec<OrderBy>> {
        let mut terms = Vec::with_capacity(order_by.len() + 1);
        for term in order_by {
            check_column(table, &term.column)?;
            if !terms.iter().any(|t: &OrderBy| t.column == term.column) {
                terms.push(term);
            }
        }
        if !terms.iter().any(|t| t.column == table.primary_key) {
            terms.push(OrderBy::new(table.primary_key, table.default_order));
        }
        Ok(terms)
    }
}

fn check_column(table: &TableSpec, column: &str) -> Result<()> {
    check_keywords(column, column)?;
    if table.has_column(column) {
        Ok(())
    } else {
        Err(ContactGateError::forbidden_column(table.name.as_str(), column))
    }
}

/// Rejects text containing a mutation or schema keyword as a whole word.
///
/// Words are runs of ASCII letters, digits and underscores, so `create_date`
/// and `UPDATED` pass while `x; DROP TABLE y` does not.
///
/// # Errors
/// Returns `DisallowedKeyword` naming the keyword and `field`.
pub fn check_keywords(field: &str, text: &str) -> Result<()> {
    let hit = text
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            DISALLOWED_KEYWORDS
                .iter()
                .find(|keyword| token.eq_ignore_ascii_case(keyword))
        });
    match hit {
        Some(keyword) => Err(ContactGateError::DisallowedKeyword {
            keyword: (*keyword).to_string(),
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

fn insert_value(column: &str, value: &Value) -> Result<SqlValue> {
    let scalar = SqlValue::from_json(value).ok_or_else(|| {
        ContactGateError::invalid_argument(column, "insert values must be scalars")
    })?;
    if is_temporal_column(column) {
        Ok(scalar.into_temporal())
    } else {
        Ok(scalar)
    }
}

fn is_temporal_column(column: &str) -> bool {
    column.contains("date") || column.ends_with("_time") || column.ends_with("dob")
}

fn enum_value(field: &str, value: &Value, accepted: &[&str]) -> Result<String> {
    value
        .as_str()
        .map(str::to_ascii_uppercase)
        .filter(|v| accepted.contains(&v.as_str()))
        .ok_or_else(|| {
            ContactGateError::invalid_argument(
                field,
                format!("must be one of {}", accepted.join(", ")),
            )
        })
}
