//! Shared fixtures for engine tests: a scripted in-memory backend.
//!
//! `ScriptedBackend` answers each statement from a list of
//! `(SQL fragment, reply)` pairs, first match wins, and records every
//! statement it receives so tests can assert on SQL text and bound values.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use contactgate_core::{
    Backend, BackendRole, BuiltQuery, ContactGateError, Dialect, EngineConfig, FixedClock,
    QueryEngine, Result, Row,
};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Reply {
    Rows(Vec<Row>),
    Fail(String),
    Reject(String),
}

/// In-memory backend replaying scripted replies.
#[derive(Debug)]
pub struct ScriptedBackend {
    role: BackendRole,
    dialect: Dialect,
    script: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<BuiltQuery>>,
    next_key: i64,
}

impl ScriptedBackend {
    pub fn new(role: BackendRole, dialect: Dialect) -> Self {
        Self {
            role,
            dialect,
            script: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_key: 9001,
        }
    }

    pub fn primary() -> Self {
        Self::new(BackendRole::Primary, Dialect::Postgres)
    }

    pub fn configuration() -> Self {
        Self::new(BackendRole::Configuration, Dialect::Oracle)
    }

    /// Answers statements containing `fragment` with `rows`.
    pub fn on(self, fragment: &str, rows: Vec<Row>) -> Self {
        self.push(fragment, Reply::Rows(rows))
    }

    /// Fails statements containing `fragment` as a query error.
    pub fn fail_on(self, fragment: &str, message: &str) -> Self {
        self.push(fragment, Reply::Fail(message.to_string()))
    }

    /// Rejects writes containing `fragment`.
    pub fn reject_on(self, fragment: &str, message: &str) -> Self {
        self.push(fragment, Reply::Reject(message.to_string()))
    }

    /// Key returned by `insert_returning`.
    pub fn with_key(mut self, key: i64) -> Self {
        self.next_key = key;
        self
    }

    fn push(self, fragment: &str, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .push((fragment.to_string(), reply));
        self
    }

    fn reply_for(&self, sql: &str) -> Option<Reply> {
        self.script
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, reply)| reply.clone())
    }

    /// Records a statement after checking that its placeholders appear in
    /// bind order, which is how Oracle matches positional binds.
    fn record(&self, query: &BuiltQuery) {
        let out_bind = usize::from(self.dialect == Dialect::Oracle && query.returning.is_some());
        let expected: Vec<usize> = (1..=query.params.len() + out_bind).collect();
        assert_eq!(
            placeholder_order(&query.sql),
            expected,
            "placeholders out of bind order: {}",
            query.sql
        );
        self.calls.lock().unwrap().push(query.clone());
    }

    /// Every statement received, in order.
    pub fn calls(&self) -> Vec<BuiltQuery> {
        self.calls.lock().unwrap().clone()
    }

    /// Statements whose SQL contains `fragment`.
    pub fn calls_matching(&self, fragment: &str) -> Vec<BuiltQuery> {
        self.calls()
            .into_iter()
            .filter(|call| call.sql.contains(fragment))
            .collect()
    }

    fn failure(&self, message: &str) -> ContactGateError {
        ContactGateError::query_failed(self.role, message, std::io::Error::other(message.to_string()))
    }
}

/// Placeholder numbers in the order they appear in `sql`.
pub fn placeholder_order(sql: &str) -> Vec<usize> {
    let pattern = Regex::new(r"[:$](\d+)").unwrap();
    pattern
        .captures_iter(sql)
        .map(|c| c[1].parse().unwrap())
        .collect()
}

/// Rows a scripted multi-row insert carries.
fn inserted_rows(statement: &BuiltQuery) -> u64 {
    let rows = match statement.sql.matches(" FROM DUAL").count() {
        0 => statement.sql.matches("), (").count() + 1,
        n => n,
    };
    rows as u64
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn role(&self) -> BackendRole {
        self.role
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_all(&self, query: &BuiltQuery) -> Result<Vec<Row>> {
        self.record(query);
        match self.reply_for(&query.sql) {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(message) | Reply::Reject(message)) => Err(self.failure(&message)),
            None => Ok(Vec::new()),
        }
    }

    async fn insert_returning(&self, query: &BuiltQuery) -> Result<i64> {
        self.record(query);
        match self.reply_for(&query.sql) {
            Some(Reply::Reject(message)) => Err(ContactGateError::insert_rejected(message)),
            Some(Reply::Fail(message)) => Err(self.failure(&message)),
            _ => Ok(self.next_key),
        }
    }

    async fn execute_batch(&self, statements: &[BuiltQuery]) -> Result<u64> {
        let mut affected = 0;
        for statement in statements {
            self.record(statement);
            match self.reply_for(&statement.sql) {
                Some(Reply::Reject(message)) => {
                    return Err(ContactGateError::insert_rejected(message));
                }
                Some(Reply::Fail(message)) => return Err(self.failure(&message)),
                _ => affected += inserted_rows(statement),
            }
        }
        Ok(affected)
    }
}

/// Converts a `json!` object into a row.
pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

/// 2026-02-18 09:30:00, so the previous archive month is `0126`.
pub fn clock() -> Arc<FixedClock> {
    let at = NaiveDate::from_ymd_opt(2026, 2, 18)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    Arc::new(FixedClock(at))
}

/// Builds an engine over the two scripted backends.
pub fn engine(
    primary: &Arc<ScriptedBackend>,
    configuration: &Arc<ScriptedBackend>,
    config: EngineConfig,
) -> QueryEngine {
    QueryEngine::new(primary.clone(), configuration.clone(), config)
        .unwrap()
        .with_clock(clock())
}

/// Client lookup fragment on the configuration backend.
pub const CLIENT_SQL: &str = "FROM \"LVOUSR\".\"CLIENT\" ";
/// Skill lookup fragment on the configuration backend.
pub const SKILLS_SQL: &str = "FROM \"LVOUSR\".\"SKILLXCLIENT\"";
/// Current transaction table on the `DIAL1` link.
pub const CURRENT_SQL: &str = "FROM \"LVOUSR\".\"TRANSACTION\"@DIAL1";
/// January archive on the `RPT1` link.
pub const ARCHIVE_SQL: &str = "FROM \"LVOUSR\".\"TRANSACTION_0126\"@RPT1";
/// Campaign insert on the configuration backend.
pub const CAMPAIGN_INSERT_SQL: &str = "INSERT INTO \"LVOUSR\".\"CAMPAIGN\"";
/// Requeue insert on the `DIAL1` link.
pub const REQUEUE_INSERT_SQL: &str = "INSERT INTO \"LVOUSR\".\"TRANSACTION\"@DIAL1";

/// Configuration backend knowing one client on `DIAL1`/`RPT1` with skills
/// 10 and 11.
pub fn configuration_for(client_id: i64) -> ScriptedBackend {
    ScriptedBackend::configuration()
        .on(
            CLIENT_SQL,
            vec![row(serde_json::json!({
                "client_id": client_id,
                "dialing_db": "DIAL1",
                "reporting_db": "RPT1"
            }))],
        )
        .on(
            SKILLS_SQL,
            vec![
                row(serde_json::json!({"skill_id": 10})),
                row(serde_json::json!({"skill_id": 11})),
            ],
        )
}
