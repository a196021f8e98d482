//! Tool calls by name, end to end through `ToolRouter`.

#![allow(clippy::unwrap_used)]

mod common;

use common::{ARCHIVE_SQL, CURRENT_SQL, ScriptedBackend, configuration_for, engine, row};
use contactgate_core::{EngineConfig, ToolRouter};
use serde_json::json;
use std::sync::Arc;

fn router(configuration: ScriptedBackend) -> (ToolRouter, Arc<ScriptedBackend>) {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(configuration);
    let engine = engine(
        &primary,
        &configuration,
        EngineConfig::new().with_archive_count(1),
    );
    (ToolRouter::new(engine), configuration)
}

#[tokio::test]
async fn test_select_transactions_response_shape() {
    let (router, _) = router(
        configuration_for(150_723)
            .on(
                CURRENT_SQL,
                vec![row(json!({"acct_transaction_id": 2, "outcome": "FAILED"}))],
            )
            .fail_on(ARCHIVE_SQL, "ORA-00942: table or view does not exist"),
    );

    let response = router
        .respond(
            "select_transactions",
            json!({"clientId": 150_723, "filters": {"outcome": "FAILED"}, "limit": 25}),
        )
        .await;

    assert_eq!(response["rows"][0]["acct_transaction_id"], json!(2));
    assert_eq!(
        response["failures"][0]["table"],
        json!("LVOUSR.TRANSACTION_0126@RPT1")
    );
}

#[tokio::test]
async fn test_errors_rendered_as_payloads() {
    let (router, configuration) = router(configuration_for(150_723));

    let response = router
        .respond("select_transactions", json!({"clientId": 150_723, "limit": 50_000}))
        .await;
    assert_eq!(response["error"]["kind"], json!("LimitExceeded"));
    assert_eq!(response["error"]["limit"], json!("MAX_ROWS"));

    let response = router.respond("drop_table", json!({})).await;
    assert_eq!(response["error"]["kind"], json!("UnknownTool"));

    let response = router
        .respond("select_records", json!({"table": "contact", "limt": 5}))
        .await;
    assert_eq!(response["error"]["kind"], json!("InvalidArgument"));

    assert!(configuration.calls().is_empty());
}

#[tokio::test]
async fn test_create_campaign_from_query_response() {
    let (router, _) = router(
        configuration_for(150_747)
            .on(
                CURRENT_SQL,
                vec![row(json!({"acct_transaction_id": 1, "account": "A-1", "skill_id": 10}))],
            )
            .on(ARCHIVE_SQL, vec![])
            .with_key(9001),
    );

    let response = router
        .handle_tool_call(
            "create_campaign_from_query",
            json!({"client_id": 150_747, "query_filters": {"outcome": "FAILED"}}),
        )
        .await
        .unwrap();

    assert_eq!(response, json!({"campaignKey": 9001, "insertedCount": 1}));
}

#[tokio::test]
async fn test_count_records_response() {
    let primary = Arc::new(ScriptedBackend::primary().on("COUNT(*)", vec![row(json!({"count": "17"}))]));
    let configuration = Arc::new(ScriptedBackend::configuration());
    let router = ToolRouter::new(engine(&primary, &configuration, EngineConfig::new()));

    let response = router
        .handle_tool_call("count_records", json!({"table": "contact"}))
        .await
        .unwrap();
    assert_eq!(response, json!(17));
}
