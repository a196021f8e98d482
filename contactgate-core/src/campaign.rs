//! Campaign creation and transaction requeue.
//!
//! `create_campaign_from_query` is a three step saga across two databases:
//!
//! 1. read the matching transactions (fan-out, capped at `MAX_ROWS`)
//! 2. insert the campaign row on the configuration backend
//! 3. insert the transactions, re-keyed to the campaign, on the dialing
//!    database in one backend transaction
//!
//! There is no transaction spanning both backends. When step 3 fails the
//! campaign from step 2 stays, and the caller receives its key together
//! with the error instead of a bare failure.
//!
//! Step 1 reads every [`REQUEUE_COLUMNS`] column from the current table and
//! each monthly archive. An archive lacking one of them fails as a table of
//! the fan-out, and the requeue stops with `PartialFanoutFailure` naming that
//! archive before anything is written. Set `archive_count` to 0 for clients
//! whose archives do not carry the request columns.

use crate::backends::{Row, batch_bounded, insert_bounded};
use crate::builder::SqlBuilder;
use crate::catalog::{REQUEUE_COLUMNS, TableName};
use crate::dialect::{DbLink, Dialect, TableRef, detect_dialect};
use crate::engine::QueryEngine;
use crate::error::{ContactGateError, Result};
use crate::fanout::{run_fanout, transaction_tables};
use crate::filter::{Filter, FilterValue, Operator, SqlValue, normalize_filters};
use crate::guardrails::{Projection, QuerySpec, ValidatedInsert};
use crate::requests::{CampaignFromQueryRequest, CreateCampaignRequest};
use crate::skills::{
    ClientId, SkillId, resolve_client, resolve_skills, skill_filter, take_client_filter,
};
use serde::Serialize;
use serde_json::{Map, Value};

/// Key of a newly created campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCreated {
    /// Generated `campaign_id`
    pub campaign_key: i64,
}

/// Result of `create_campaign_from_query` once the campaign row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CampaignOutcome {
    /// Campaign and every transaction were inserted
    #[serde(rename_all = "camelCase")]
    Created {
        /// Generated `campaign_id`
        campaign_key: i64,
        /// Transactions inserted for the campaign
        inserted_count: u64,
    },
    /// Campaign exists but its transactions were not inserted
    #[serde(rename_all = "camelCase")]
    PartiallyInserted {
        /// Generated `campaign_id`
        campaign_key: i64,
        /// Why the transaction insert failed
        error: String,
    },
}

impl CampaignOutcome {
    /// Key of the campaign, created in both outcomes.
    pub const fn campaign_key(&self) -> i64 {
        match self {
            Self::Created { campaign_key, .. } | Self::PartiallyInserted { campaign_key, .. } => {
                *campaign_key
            }
        }
    }

    /// Converts a partial insertion into `PartialCampaignInsertion`.
    ///
    /// # Errors
    /// Returns `PartialCampaignInsertion` for [`CampaignOutcome::PartiallyInserted`].
    pub fn into_result(self) -> Result<(i64, u64)> {
        match self {
            Self::Created {
                campaign_key,
                inserted_count,
            } => Ok((campaign_key, inserted_count)),
            Self::PartiallyInserted {
                campaign_key,
                error,
            } => Err(ContactGateError::PartialCampaignInsertion {
                campaign_key,
                error,
            }),
        }
    }
}

impl QueryEngine {
    /// Creates a campaign for a client.
    ///
    /// # Errors
    /// Returns guardrail errors for the payload, `UnknownClient`, or
    /// `InsertRejected` when the backend refuses the row.
    pub async fn create_campaign(&self, request: CreateCampaignRequest) -> Result<CampaignCreated> {
        tracing::info!("create_campaign received for client {}", request.client_id);
        let client_id = ClientId::new(request.client_id)?;
        let insert = self
            .guardrails()
            .validate_campaign(client_id.get(), &request.data)?;

        resolve_client(self.configuration.as_ref(), &self.config, client_id).await?;
        let campaign_key = self.insert_campaign(&insert).await?;

        tracing::info!("Created campaign {} for client {}", campaign_key, client_id);
        Ok(CampaignCreated { campaign_key })
    }

    /// Creates a campaign and requeues the client's matching transactions
    /// into it.
    ///
    /// Nothing is written when the read matches no rows or any table of the
    /// fan-out fails.
    ///
    /// # Errors
    /// Returns guardrail errors before any backend call, `UnknownClient`,
    /// `PartialFanoutFailure` when any table could not be read,
    /// `NoMatchingRecords`, or `InsertRejected` for the campaign row. A
    /// failure after the campaign row exists is reported as
    /// [`CampaignOutcome::PartiallyInserted`].
    pub async fn create_campaign_from_query(
        &self,
        request: CampaignFromQueryRequest,
    ) -> Result<CampaignOutcome> {
        tracing::info!(
            "create_campaign_from_query received for client {}",
            request.client_id
        );
        let client_id = ClientId::new(request.client_id)?;
        let guardrails = self.guardrails();

        let mut filters = normalize_filters(request.query_filters.as_ref())?;
        take_client_filter(&mut filters, client_id)?;
        let requested_skill = single_skill(&filters);

        let limit = request
            .max_records
            .unwrap_or_else(|| i64::from(self.config.limits.max_rows));
        let spec = QuerySpec::new(TableName::Transaction.as_str())
            .with_filters(filters)
            .with_columns(Projection::Columns(
                REQUEUE_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            ))
            .with_limit(Some(limit))
            .with_reserved_filters(1);
        let mut query = guardrails.validate_select(
            spec,
            &[TableName::Transaction],
            "create_campaign_from_query",
        )?;
        guardrails.validate_campaign(client_id.get(), &request.campaign_data)?;

        // Step 1: read
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
        let read = run_fanout(
            self.backend_for(dialect),
            &self.config.limits,
            &query,
            &tables,
        )
        .await?;
        if !read.is_complete() {
            tracing::warn!(
                "Requeue read for client {} incomplete; {} tables failed, nothing written",
                client_id,
                read.failures.len()
            );
            return Err(ContactGateError::PartialFanoutFailure {
                failures: read.failures,
            });
        }
        if read.rows.is_empty() {
            tracing::info!("Requeue read for client {} matched no rows", client_id);
            return Err(ContactGateError::NoMatchingRecords);
        }
        tracing::info!(
            "Requeue read for client {} matched {} rows",
            client_id,
            read.rows.len()
        );

        // Step 2: campaign row
        let skill = requested_skill.or_else(|| skills.first().copied());
        let data = self.campaign_defaults(request.campaign_data, skill);
        let insert = guardrails.validate_campaign(client_id.get(), &data)?;
        let campaign_key = self.insert_campaign(&insert).await?;
        tracing::info!("Created campaign {} for client {}", campaign_key, client_id);

        // Step 3: transactions
        match self
            .insert_requeued(campaign_key, read.rows, dialect, &links.dialing)
            .await
        {
            Ok(inserted_count) => {
                tracing::info!(
                    "Inserted {} transactions for campaign {}",
                    inserted_count,
                    campaign_key
                );
                Ok(CampaignOutcome::Created {
                    campaign_key,
                    inserted_count,
                })
            }
            Err(e) => {
                tracing::error!(
                    "Campaign {} created but transaction insert failed: {}",
                    campaign_key,
                    e
                );
                Ok(CampaignOutcome::PartiallyInserted {
                    campaign_key,
                    error: e.to_string(),
                })
            }
        }
    }

    async fn insert_campaign(&self, insert: &ValidatedInsert) -> Result<i64> {
        let (schema, name) = TableName::Campaign.spec().physical;
        let built = SqlBuilder::new(self.configuration.dialect())
            .insert_returning(insert, &TableRef::local(schema, name));
        insert_bounded(self.configuration.as_ref(), &self.config.limits, &built).await
    }

    async fn insert_requeued(
        &self,
        campaign_key: i64,
        mut rows: Vec<Row>,
        dialect: Dialect,
        dialing: &DbLink,
    ) -> Result<u64> {
        for row in &mut rows {
            row.insert("campaign_id".to_string(), Value::from(campaign_key));
        }
        let columns: Vec<&str> = REQUEUE_COLUMNS
            .iter()
            .copied()
            .chain(std::iter::once("campaign_id"))
            .collect();
        let insert = self
            .guardrails()
            .validate_bulk_insert(TableName::Transaction, &columns, &rows)?;

        let (schema, name) = TableName::Transaction.spec().physical;
        let target = TableRef::local(schema, name).via(dialect, dialing);
        let statements = SqlBuilder::new(dialect).bulk_insert(&insert, &target);
        batch_bounded(self.backend_for(dialect), &self.config.limits, &statements).await
    }

    /// Fills `skill_id` and `filename` when the caller left them out.
    fn campaign_defaults(
        &self,
        mut data: Map<String, Value>,
        skill: Option<SkillId>,
    ) -> Map<String, Value> {
        let has = |data: &Map<String, Value>, column: &str| {
            data.keys().any(|k| k.trim().eq_ignore_ascii_case(column))
        };
        if !has(&data, "skill_id")
            && let Some(skill) = skill
        {
            data.insert("skill_id".to_string(), Value::from(skill.get()));
        }
        if !has(&data, "filename") {
            let filename = self
                .clock
                .now()
                .format("auto_campaign_%Y%m%d_%H%M%S")
                .to_string();
            data.insert("filename".to_string(), Value::String(filename));
        }
        data
    }
}

/// The skill named by a single `skill_id = n` filter, if there is one.
fn single_skill(filters: &[Filter]) -> Option<SkillId> {
    let mut ids = filters
        .iter()
        .filter(|f| f.column == "skill_id" && f.operator == Operator::Eq)
        .filter_map(|f| match &f.value {
            FilterValue::Single(SqlValue::Int(id)) => Some(*id),
            FilterValue::Single(SqlValue::Text(id)) => id.trim().parse().ok(),
            _ => None,
        });
    match (ids.next(), ids.next()) {
        (Some(id), None) => Some(SkillId::new(id)),
        _ => None,
    }
}
