//! The tool surface.
//!
//! A tool call is a name and a JSON object of arguments. [`ToolRouter`]
//! decodes the arguments, runs the matching [`QueryEngine`] operation and
//! encodes the result. Errors become `{"error": {"kind", "message", ...}}`
//! through [`ToolRouter::respond`].

use crate::engine::QueryEngine;
use crate::error::{ContactGateError, Result};
use crate::requests::parse_arguments;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Instant;

/// Tools callers may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// `select_records`
    SelectRecords,
    /// `count_records`
    CountRecords,
    /// `get_contact_with_details`
    GetContactWithDetails,
    /// `select_contacts_with_details`
    SelectContactsWithDetails,
    /// `select_transactions`
    SelectTransactions,
    /// `select_contact`
    SelectContact,
    /// `select_campaigns`
    SelectCampaigns,
    /// `create_campaign`
    CreateCampaign,
    /// `create_campaign_from_query`
    CreateCampaignFromQuery,
}

impl ToolName {
    /// Every tool, in listing order.
    pub const ALL: [Self; 9] = [
        Self::SelectRecords,
        Self::CountRecords,
        Self::GetContactWithDetails,
        Self::SelectContactsWithDetails,
        Self::SelectTransactions,
        Self::SelectContact,
        Self::SelectCampaigns,
        Self::CreateCampaign,
        Self::CreateCampaignFromQuery,
    ];

    /// Wire name of the tool.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SelectRecords => "select_records",
            Self::CountRecords => "count_records",
            Self::GetContactWithDetails => "get_contact_with_details",
            Self::SelectContactsWithDetails => "select_contacts_with_details",
            Self::SelectTransactions => "select_transactions",
            Self::SelectContact => "select_contact",
            Self::SelectCampaigns => "select_campaigns",
            Self::CreateCampaign => "create_campaign",
            Self::CreateCampaignFromQuery => "create_campaign_from_query",
        }
    }

    /// One-line description for tool listings.
    pub const fn description(self) -> &'static str {
        match self {
            Self::SelectRecords => "Read rows from contact or contact_details",
            Self::CountRecords => "Count rows of contact or contact_details matching filters",
            Self::GetContactWithDetails => "Read one contact and its details by primaryId",
            Self::SelectContactsWithDetails => "Read contacts left-joined to their details",
            Self::SelectTransactions => {
                "Read a client's transactions across the current table and archives"
            }
            Self::SelectContact => "Read contacts from a client's dialing database",
            Self::SelectCampaigns => "Read campaigns from the configuration database",
            Self::CreateCampaign => "Create a campaign for a client",
            Self::CreateCampaignFromQuery => {
                "Create a campaign and requeue matching transactions into it"
            }
        }
    }

    /// True for tools that write.
    pub const fn is_write(self) -> bool {
        matches!(self, Self::CreateCampaign | Self::CreateCampaignFromQuery)
    }

    /// Looks a tool up by wire name.
    ///
    /// # Errors
    /// Returns `UnknownTool` for any other name.
    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == name.trim())
            .ok_or_else(|| ContactGateError::UnknownTool {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatches tool calls to an engine.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    engine: QueryEngine,
}

impl ToolRouter {
    /// Creates a router over `engine`.
    pub const fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    /// Engine behind the router.
    pub const fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Runs one tool call.
    ///
    /// # Errors
    /// Returns `UnknownTool`, `InvalidArgument` for undecodable arguments,
    /// or whatever the tool returns.
    pub async fn handle_tool_call(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = ToolName::parse(name)?;
        let started = Instant::now();
        let result = self.dispatch(tool, arguments).await;
        match &result {
            Ok(_) => tracing::info!(
                "Tool {} completed in {}ms",
                tool,
                started.elapsed().as_millis()
            ),
            Err(e) => tracing::warn!(
                "Tool {} failed after {}ms: {} ({})",
                tool,
                started.elapsed().as_millis(),
                e,
                e.kind()
            ),
        }
        result
    }

    /// Runs one tool call and renders failures as error payloads.
    pub async fn respond(&self, name: &str, arguments: Value) -> Value {
        self.handle_tool_call(name, arguments)
            .await
            .unwrap_or_else(|e| e.to_response())
    }

    async fn dispatch(&self, tool: ToolName, arguments: Value) -> Result<Value> {
        let engine = &self.engine;
        match tool {
            ToolName::SelectRecords => {
                encode(engine.select_records(parse_arguments(arguments)?).await?)
            }
            ToolName::CountRecords => {
                encode(engine.count_records(parse_arguments(arguments)?).await?)
            }
            ToolName::GetContactWithDetails => {
                encode(engine.get_contact_with_details(parse_arguments(arguments)?).await?)
            }
            ToolName::SelectContactsWithDetails => encode(
                engine
                    .select_contacts_with_details(parse_arguments(arguments)?)
                    .await?,
            ),
            ToolName::SelectTransactions => {
                encode(engine.select_transactions(parse_arguments(arguments)?).await?)
            }
            ToolName::SelectContact => {
                encode(engine.select_contact(parse_arguments(arguments)?).await?)
            }
            ToolName::SelectCampaigns => {
                encode(engine.select_campaigns(parse_arguments(arguments)?).await?)
            }
            ToolName::CreateCampaign => {
                encode(engine.create_campaign(parse_arguments(arguments)?).await?)
            }
            ToolName::CreateCampaignFromQuery => encode(
                engine
                    .create_campaign_from_query(parse_arguments(arguments)?)
                    .await?,
            ),
        }
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| ContactGateError::serialization("tool response", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::parse(tool.as_str()).unwrap(), tool);
            assert!(!tool.description().is_empty());
        }
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolName::parse("drop_everything").unwrap_err();
        assert_eq!(err.kind(), "UnknownTool");
        assert_eq!(err.to_response()["error"]["kind"], "UnknownTool");
    }

    #[test]
    fn test_write_tools() {
        let writes: Vec<ToolName> = ToolName::ALL.into_iter().filter(|t| t.is_write()).collect();
        assert_eq!(
            writes,
            vec![ToolName::CreateCampaign, ToolName::CreateCampaignFromQuery]
        );
    }
}
