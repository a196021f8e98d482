//! Tool argument payloads.
//!
//! Arguments arrive as JSON objects. Field names are camelCase, with the
//! snake_case spelling accepted as an alias; unknown fields are rejected so
//! a misspelled `limt` cannot silently fall back to the default limit.

use crate::error::{ContactGateError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Decodes tool arguments, mapping shape errors to `InvalidArgument`.
///
/// A missing or `null` payload decodes as an empty object.
///
/// # Errors
/// Returns `InvalidArgument` naming the first offending field.
pub fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(arguments)
        .map_err(|e| ContactGateError::invalid_argument("arguments", e.to_string()))
}

/// Arguments of `select_records`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SelectRecordsRequest {
    /// Logical table name
    pub table: String,
    /// Column to filter specification
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
    /// `"*"`, a column name or a list of names
    #[serde(default)]
    pub columns: Option<Value>,
    /// Row limit
    #[serde(default)]
    pub limit: Option<i64>,
    /// Row offset
    #[serde(default)]
    pub offset: Option<i64>,
    /// `"column [ASC|DESC]"` terms
    #[serde(default, alias = "order_by")]
    pub order_by: Option<Value>,
}

/// Arguments of `count_records`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CountRecordsRequest {
    /// Logical table name
    pub table: String,
    /// Column to filter specification
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
}

/// Arguments of `get_contact_with_details`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContactDetailsRequest {
    /// Contact key (`lvaccount_id`), as text or number
    #[serde(alias = "primary_id", alias = "lvaccount_id")]
    pub primary_id: Value,
}

/// Arguments of `select_contacts_with_details`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContactsWithDetailsRequest {
    /// Filters on contact columns
    #[serde(default, alias = "contact_filters")]
    pub contact_filters: Option<Map<String, Value>>,
    /// Filters on detail columns
    #[serde(default, alias = "details_filters")]
    pub details_filters: Option<Map<String, Value>>,
    /// Contact projection
    #[serde(default, alias = "contact_columns")]
    pub contact_columns: Option<Value>,
    /// Details projection
    #[serde(default, alias = "details_columns")]
    pub details_columns: Option<Value>,
    /// Row limit
    #[serde(default)]
    pub limit: Option<i64>,
    /// Row offset
    #[serde(default)]
    pub offset: Option<i64>,
    /// Ordering on contact columns
    #[serde(default, alias = "order_by")]
    pub order_by: Option<Value>,
}

/// Arguments of the client-scoped reads `select_transactions` and
/// `select_contact`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientQueryRequest {
    /// Client whose links and skills scope the read
    #[serde(alias = "client_id")]
    pub client_id: i64,
    /// Column to filter specification
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
    /// Projection
    #[serde(default)]
    pub columns: Option<Value>,
    /// Row limit
    #[serde(default)]
    pub limit: Option<i64>,
    /// Ordering
    #[serde(default, alias = "order_by")]
    pub order_by: Option<Value>,
}

/// Arguments of `select_campaigns`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CampaignQueryRequest {
    /// Column to filter specification
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
    /// Projection
    #[serde(default)]
    pub columns: Option<Value>,
    /// Row limit
    #[serde(default)]
    pub limit: Option<i64>,
    /// Ordering
    #[serde(default, alias = "order_by")]
    pub order_by: Option<Value>,
}

/// Arguments of `create_campaign`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCampaignRequest {
    /// Owning client
    #[serde(alias = "client_id")]
    pub client_id: i64,
    /// Campaign columns
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Arguments of `create_campaign_from_query`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CampaignFromQueryRequest {
    /// Owning client
    #[serde(alias = "client_id")]
    pub client_id: i64,
    /// Transaction filters selecting the rows to requeue
    #[serde(default, alias = "query_filters")]
    pub query_filters: Option<Map<String, Value>>,
    /// Campaign columns
    #[serde(default, alias = "campaign_data")]
    pub campaign_data: Map<String, Value>,
    /// Cap on requeued rows, at most `MAX_ROWS`
    #[serde(default, alias = "max_records")]
    pub max_records: Option<i64>,
}
