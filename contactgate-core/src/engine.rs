//! The query engine: read tools over both backends.
//!
//! Every tool follows the same pipeline. Arguments are normalized into
//! filters, validated by [`Guardrails`], rendered by [`SqlBuilder`] for the
//! target dialect, executed under the backend timeout and redacted before
//! they are returned. Validation always completes before the first backend
//! call, so a rejected request never reaches a database.
//!
//! The write tools live in [`crate::campaign`].

use crate::backends::{Backend, Row, fetch_bounded};
use crate::builder::SqlBuilder;
use crate::catalog::TableName;
use crate::config::EngineConfig;
use crate::dialect::{Dialect, TableRef, detect_dialect};
use crate::error::{ContactGateError, Result};
use crate::fanout::{FanoutResult, run_fanout, transaction_tables};
use crate::filter::{Filter, FilterValue, Operator, SqlValue, normalize_filters};
use crate::guardrails::{Guardrails, OrderBy, Projection, QuerySpec};
use crate::requests::{
    CampaignQueryRequest, ClientQueryRequest, ContactDetailsRequest, ContactsWithDetailsRequest,
    CountRecordsRequest, SelectRecordsRequest,
};
use crate::security::redact_rows;
use crate::skills::{
    ClientId, integer_field, resolve_client, resolve_skills, skill_filter, take_client_filter,
};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Tables `select_records` and `count_records` may read.
const PRIMARY_TABLES: &[TableName] = &[TableName::Contact, TableName::ContactDetails];

/// Source of the current local time.
///
/// Archive names and default campaign filenames depend on the date, so tests
/// substitute a [`FixedClock`].
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;

    /// Current local date.
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Wall clock in the server's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock stopped at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// A contact and its detail rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContactWithDetails {
    /// The contact, if it exists
    pub contact: Option<Row>,
    /// Detail rows keyed by the same `lvaccount_id`
    pub details: Vec<Row>,
}

/// Guardrailed access to the primary and configuration backends.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct QueryEngine {
    pub(crate) primary: Arc<dyn Backend>,
    pub(crate) configuration: Arc<dyn Backend>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine")
            .field("primary", &self.primary.dialect())
            .field("configuration", &self.configuration.dialect())
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}

impl QueryEngine {
    /// Creates an engine over two backends.
    ///
    /// # Errors
    /// Returns a configuration error when `config` does not validate or a
    /// backend is wired to the wrong role.
    pub fn new(
        primary: Arc<dyn Backend>,
        configuration: Arc<dyn Backend>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        if primary.dialect() != Dialect::Postgres || configuration.dialect() != Dialect::Oracle {
            return Err(ContactGateError::configuration(format!(
                "expected a postgres primary and an oracle configuration backend, got {} and {}",
                primary.dialect(),
                configuration.dialect()
            )));
        }
        Ok(Self {
            primary,
            configuration,
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tests both backend connections concurrently.
    ///
    /// # Errors
    /// Returns the first backend failure.
    pub async fn test_connections(&self) -> Result<()> {
        futures::try_join!(
            self.primary.test_connection(),
            self.configuration.test_connection()
        )?;
        Ok(())
    }

    pub(crate) fn guardrails(&self) -> Guardrails<'_> {
        Guardrails::new(&self.config.limits)
    }

    /// Backend that executes statements written in `dialect`.
    pub(crate) fn backend_for(&self, dialect: Dialect) -> &dyn Backend {
        match dialect {
            Dialect::Postgres => self.primary.as_ref(),
            Dialect::Oracle => self.configuration.as_ref(),
        }
    }

    fn contact_table(&self) -> Result<TableRef> {
        TableRef::from_qualified(&self.config.contact_table)
    }

    fn primary_table(&self, table: TableName) -> Result<TableRef> {
        if table == TableName::Contact {
            return self.contact_table();
        }
        let (schema, name) = table.spec().physical;
        Ok(TableRef::local(schema, name))
    }

    /// Reads rows from a primary-backend table.
    ///
    /// # Errors
    /// Returns any guardrail or backend error.
    pub async fn select_records(&self, request: SelectRecordsRequest) -> Result<Vec<Row>> {
        tracing::info!("select_records received for table {}", request.table);
        let spec = QuerySpec::new(request.table)
            .with_filters(normalize_filters(request.filters.as_ref())?)
            .with_columns(Projection::parse("columns", request.columns.as_ref())?)
            .with_limit(request.limit)
            .with_offset(request.offset)
            .with_order_by(OrderBy::parse_list(request.order_by.as_ref())?);
        let query = self
            .guardrails()
            .validate_select(spec, PRIMARY_TABLES, "select_records")?;

        let table = self.primary_table(query.table().name)?;
        let built = SqlBuilder::new(self.primary.dialect()).select(&query, &table);
        let rows = fetch_bounded(self.primary.as_ref(), &self.config.limits, &built).await?;

        tracing::info!("select_records returned {} rows from {}", rows.len(), table);
        Ok(redact_rows(rows))
    }

    /// Counts rows of a primary-backend table matching the filters.
    ///
    /// # Errors
    /// Returns any guardrail or backend error.
    pub async fn count_records(&self, request: CountRecordsRequest) -> Result<u64> {
        tracing::info!("count_records received for table {}", request.table);
        let spec =
            QuerySpec::new(request.table).with_filters(normalize_filters(request.filters.as_ref())?);
        let query = self
            .guardrails()
            .validate_select(spec, PRIMARY_TABLES, "count_records")?;

        let table = self.primary_table(query.table().name)?;
        let built = SqlBuilder::new(self.primary.dialect()).count(&query, &table);
        let rows = fetch_bounded(self.primary.as_ref(), &self.config.limits, &built).await?;

        let count = rows
            .first()
            .and_then(|row| integer_field(row, "count"))
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Reads one contact and its detail rows concurrently.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a non-scalar key, `MalformedFilter` for
    /// text that is not a number, or any backend error.
    pub async fn get_contact_with_details(
        &self,
        request: ContactDetailsRequest,
    ) -> Result<ContactWithDetails> {
        let key = SqlValue::from_json(&request.primary_id)
            .filter(|value| !value.is_null())
            .ok_or_else(|| {
                ContactGateError::invalid_argument("primaryId", "must be a string or number")
            })?;
        tracing::info!("get_contact_with_details received");

        let by_key = |table: TableName, limit: i64| {
            QuerySpec::new(table.as_str())
                .with_filters(vec![Filter::new(
                    "lvaccount_id",
                    Operator::Eq,
                    FilterValue::Single(key.clone()),
                )])
                .with_limit(Some(limit))
        };
        let guardrails = self.guardrails();
        let contact = guardrails.validate_select(
            by_key(TableName::Contact, 1),
            PRIMARY_TABLES,
            "get_contact_with_details",
        )?;
        let details = guardrails.validate_select(
            by_key(
                TableName::ContactDetails,
                i64::from(self.config.limits.default_limit),
            ),
            PRIMARY_TABLES,
            "get_contact_with_details",
        )?;

        let builder = SqlBuilder::new(self.primary.dialect());
        let contact_sql = builder.select(&contact, &self.contact_table()?);
        let details_sql = builder.select(&details, &self.primary_table(TableName::ContactDetails)?);

        let limits = &self.config.limits;
        let (contact_rows, detail_rows) = futures::try_join!(
            fetch_bounded(self.primary.as_ref(), limits, &contact_sql),
            fetch_bounded(self.primary.as_ref(), limits, &details_sql),
        )?;

        Ok(ContactWithDetails {
            contact: redact_rows(contact_rows).into_iter().next(),
            details: redact_rows(detail_rows),
        })
    }

    /// Reads contacts left-joined to their details.
    ///
    /// Output columns are prefixed `contact_` and `details_`.
    ///
    /// # Errors
    /// Returns any guardrail or backend error.
    pub async fn select_contacts_with_details(
        &self,
        request: ContactsWithDetailsRequest,
    ) -> Result<Vec<Row>> {
        tracing::info!("select_contacts_with_details received");
        let contact = QuerySpec::new(TableName::Contact.as_str())
            .with_filters(normalize_filters(request.contact_filters.as_ref())?)
            .with_columns(Projection::parse(
                "contactColumns",
                request.contact_columns.as_ref(),
            )?)
            .with_limit(request.limit)
            .with_offset(request.offset)
            .with_order_by(OrderBy::parse_list(request.order_by.as_ref())?);
        let details = QuerySpec::new(TableName::ContactDetails.as_str())
            .with_filters(normalize_filters(request.details_filters.as_ref())?)
            .with_columns(Projection::parse(
                "detailsColumns",
                request.details_columns.as_ref(),
            )?);
        let (contact, details) = self.guardrails().validate_join(contact, details)?;

        let built = SqlBuilder::new(self.primary.dialect()).select_contacts_with_details(
            &contact,
            &details,
            &self.contact_table()?,
            &self.primary_table(TableName::ContactDetails)?,
        );
        let rows = fetch_bounded(self.primary.as_ref(), &self.config.limits, &built).await?;

        tracing::info!("select_contacts_with_details returned {} rows", rows.len());
        Ok(redact_rows(rows))
    }

    /// Reads a client's transactions from the current table and its
    /// archives.
    ///
    /// Rows are restricted to the client's skills. A `client_id` filter may
    /// only restate `clientId`; use `skill_id` to narrow to one skill.
    ///
    /// # Errors
    /// Returns guardrail errors before any backend call, `UnknownClient`,
    /// or `PartialFanoutFailure` when every table fails.
    pub async fn select_transactions(&self, request: ClientQueryRequest) -> Result<FanoutResult> {
        tracing::info!("select_transactions received for client {}", request.client_id);
        let client_id = ClientId::new(request.client_id)?;
        let mut filters = normalize_filters(request.filters.as_ref())?;
        take_client_filter(&mut filters, client_id)?;

        let spec = QuerySpec::new(TableName::Transaction.as_str())
            .with_filters(filters)
            .with_columns(Projection::parse("columns", request.columns.as_ref())?)
            .with_limit(request.limit)
            .with_order_by(OrderBy::parse_list(request.order_by.as_ref())?)
            .with_reserved_filters(1);
        let guardrails = self.guardrails();
        let mut query =
            guardrails.validate_select(spec, &[TableName::Transaction], "select_transactions")?;

        let configuration = self.configuration.as_ref();
        let (links, skills) = futures::try_join!(
            resolve_client(configuration, &self.config, client_id),
            resolve_skills(configuration, &self.config, client_id),
        )?;
        guardrails.add_filter(&mut query, skill_filter(&skills))?;

        let dialect = detect_dialect(&links.dialing, &self.config);
        let tables = transaction_tables(
            &links,
            dialect,
            self.clock.today(),
            self.config.archive_count,
        );
        let mut result = run_fanout(
            self.backend_for(dialect),
            &self.config.limits,
            &query,
            &tables,
        )
        .await?;

        result.rows = redact_rows(result.rows);
        Ok(result)
    }

    /// Reads contacts from the client's dialing database.
    ///
    /// # Errors
    /// Returns guardrail errors before any backend call, `UnknownClient`,
    /// or any backend error.
    pub async fn select_contact(&self, request: ClientQueryRequest) -> Result<Vec<Row>> {
        tracing::info!("select_contact received for client {}", request.client_id);
        let client_id = ClientId::new(request.client_id)?;
        let spec = QuerySpec::new(TableName::Contact.as_str())
            .with_filters(normalize_filters(request.filters.as_ref())?)
            .with_columns(Projection::parse("columns", request.columns.as_ref())?)
            .with_limit(request.limit)
            .with_order_by(OrderBy::parse_list(request.order_by.as_ref())?);
        let query =
            self.guardrails()
                .validate_select(spec, &[TableName::Contact], "select_contact")?;

        let links = resolve_client(self.configuration.as_ref(), &self.config, client_id).await?;
        let dialect = detect_dialect(&links.dialing, &self.config);
        let table = self.contact_table()?.via(dialect, &links.dialing);

        let backend = self.backend_for(dialect);
        let built = SqlBuilder::new(dialect).select(&query, &table);
        let rows = fetch_bounded(backend, &self.config.limits, &built).await?;

        tracing::info!("select_contact returned {} rows from {}", rows.len(), table);
        Ok(redact_rows(rows))
    }

    /// Reads campaigns from the configuration backend.
    ///
    /// # Errors
    /// Returns any guardrail or backend error.
    pub async fn select_campaigns(&self, request: CampaignQueryRequest) -> Result<Vec<Row>> {
        tracing::info!("select_campaigns received");
        let spec = QuerySpec::new(TableName::Campaign.as_str())
            .with_filters(normalize_filters(request.filters.as_ref())?)
            .with_columns(Projection::parse("columns", request.columns.as_ref())?)
            .with_limit(request.limit)
            .with_order_by(OrderBy::parse_list(request.order_by.as_ref())?);
        let query =
            self.guardrails()
                .validate_select(spec, &[TableName::Campaign], "select_campaigns")?;

        let (schema, name) = TableName::Campaign.spec().physical;
        let built = SqlBuilder::new(self.configuration.dialect())
            .select(&query, &TableRef::local(schema, name));
        let rows =
            fetch_bounded(self.configuration.as_ref(), &self.config.limits, &built).await?;

        tracing::info!("select_campaigns returned {} rows", rows.len());
        Ok(redact_rows(rows))
    }
}
