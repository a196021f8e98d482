//! Core engine for contactgate.
//!
//! contactgate exposes a small set of tool calls over two relational
//! backends: a PostgreSQL *primary* store of contacts and an Oracle
//! *configuration* store of clients, skills and campaigns, which also
//! reaches each client's dialing and reporting databases through database
//! links. Callers describe what they want declaratively; this crate turns
//! that into dialect-correct parameterized SQL under hard limits and masks
//! sensitive columns on the way out.
//!
//! # Security Guarantees
//! - Values only ever reach a backend as bound parameters
//! - Tables and columns come from compiled-in allow-lists
//! - Limits are rejected, never clamped, and checked before any backend call
//! - Sensitive columns are redacted in every returned row
//! - Credentials are zeroized and never logged
//!
//! # Architecture
//! A tool call flows through the filter normalizer ([`filter`]), the
//! guardrail validator ([`guardrails`]), the SQL builder ([`builder`]) and
//! one backend call or a transaction fan-out ([`fanout`]) before redaction
//! ([`security`]). [`engine::QueryEngine`] wires the steps together and
//! [`tools::ToolRouter`] exposes them by name.

pub mod backends;
pub mod builder;
pub mod campaign;
pub mod catalog;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod filter;
pub mod guardrails;
pub mod logging;
pub mod requests;
pub mod security;
pub mod skills;
pub mod tools;

// Re-export commonly used types
pub use backends::{Backend, BackendRole, Row};
pub use builder::{BuiltQuery, SqlBuilder};
pub use campaign::{CampaignCreated, CampaignOutcome};
pub use catalog::TableName;
pub use config::{ConnectionConfig, EngineConfig, LimitName, QueryLimits};
pub use dialect::{DbLink, Dialect, TableRef};
pub use engine::{Clock, ContactWithDetails, FixedClock, QueryEngine, SystemClock};
pub use error::{ContactGateError, Result};
pub use fanout::{FanoutResult, TableFailure};
pub use filter::{Filter, FilterValue, Operator, SqlValue};
pub use guardrails::{Guardrails, OrderBy, Projection, QuerySpec};
pub use skills::{ClientId, SkillId};
pub use tools::{ToolName, ToolRouter};

#[cfg(feature = "postgresql")]
pub use backends::postgres::PostgresBackend;

#[cfg(feature = "oracle")]
pub use backends::oracle::OracleBackend;
