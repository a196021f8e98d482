//! Campaign creation and transaction requeue against scripted backends.

#![allow(clippy::unwrap_used)]

mod common;

use common::{
    ARCHIVE_SQL, CAMPAIGN_INSERT_SQL, CURRENT_SQL, REQUEUE_INSERT_SQL, ScriptedBackend,
    configuration_for, engine, row,
};
use contactgate_core::requests::parse_arguments;
use contactgate_core::{CampaignOutcome, ContactGateError, EngineConfig, Row, SqlValue};
use serde_json::json;
use std::sync::Arc;

fn failed_transaction(id: i64, skill: i64) -> Row {
    row(json!({
        "acct_transaction_id": id,
        "account": format!("A-{id}"),
        "skill_id": skill,
        "patient_firstname": "Ana",
        "patient_ssn": "123-45-6789",
        "patient_dob": "1980-01-01",
        "outcome": "FAILED"
    }))
}

fn requeue_backend() -> ScriptedBackend {
    configuration_for(150_747)
        .on(
            CURRENT_SQL,
            vec![failed_transaction(300, 10), failed_transaction(200, 11)],
        )
        .on(ARCHIVE_SQL, vec![failed_transaction(250, 10)])
        .with_key(9001)
}

fn position(calls: &[contactgate_core::BuiltQuery], fragment: &str) -> usize {
    calls
        .iter()
        .position(|call| call.sql.contains(fragment))
        .unwrap()
}

#[tokio::test]
async fn test_create_campaign_from_query_requeues_every_row() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(requeue_backend());
    let engine = engine(
        &primary,
        &configuration,
        EngineConfig::new().with_archive_count(1),
    );

    let request = parse_arguments(json!({
        "clientId": 150_747,
        "queryFilters": {"outcome": "FAILED"},
        "campaignData": {"am_option": "NO_AM", "b_active": 1}
    }))
    .unwrap();
    let outcome = engine.create_campaign_from_query(request).await.unwrap();

    assert_eq!(
        outcome,
        CampaignOutcome::Created {
            campaign_key: 9001,
            inserted_count: 3
        }
    );

    // Campaign row carries the defaults and the tool client id
    let campaign = &configuration.calls_matching(CAMPAIGN_INSERT_SQL)[0];
    assert!(campaign.sql.contains("RETURNING \"CAMPAIGN_ID\" INTO :"));
    assert!(campaign.params.contains(&SqlValue::Int(150_747)));
    assert!(campaign.params.contains(&SqlValue::Int(10)));
    assert!(
        campaign
            .params
            .contains(&SqlValue::Text("auto_campaign_20260218_093000".into()))
    );
    assert!(campaign.params.contains(&SqlValue::Text("NO_AM".into())));

    // Transactions are re-keyed to the campaign and copied unredacted
    let inserts = configuration.calls_matching(REQUEUE_INSERT_SQL);
    assert_eq!(inserts.len(), 1);
    let insert = &inserts[0];
    assert!(insert.sql.contains("FROM DUAL UNION ALL SELECT"));
    assert!(insert.sql.contains("\"CAMPAIGN_ID\""));
    assert!(insert.sql.contains("\"CLIENT_ID\""));
    assert!(!insert.sql.contains("\"ACCT_TRANSACTION_ID\""));
    assert!(!insert.sql.contains("\"OUTCOME\""));
    assert_eq!(
        insert
            .params
            .iter()
            .filter(|p| **p == SqlValue::Int(9001))
            .count(),
        3
    );
    assert!(insert.params.contains(&SqlValue::Text("123-45-6789".into())));

    // Read, then campaign, then transactions
    let calls = configuration.calls();
    assert!(position(&calls, CURRENT_SQL) < position(&calls, CAMPAIGN_INSERT_SQL));
    assert!(position(&calls, CAMPAIGN_INSERT_SQL) < position(&calls, REQUEUE_INSERT_SQL));
    assert!(primary.calls().is_empty());
}

#[tokio::test]
async fn test_skill_filter_selects_campaign_skill() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(requeue_backend());
    let engine = engine(&primary, &configuration, EngineConfig::new());

    let request = parse_arguments(json!({
        "clientId": 150_747,
        "queryFilters": {"outcome": "FAILED", "skill_id": 11}
    }))
    .unwrap();
    engine.create_campaign_from_query(request).await.unwrap();

    let campaign = &configuration.calls_matching(CAMPAIGN_INSERT_SQL)[0];
    assert!(campaign.params.contains(&SqlValue::Int(11)));
    assert!(!campaign.params.contains(&SqlValue::Int(10)));
}

#[tokio::test]
async fn test_no_matching_records_writes_nothing() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(configuration_for(150_747));
    let engine = engine(&primary, &configuration, EngineConfig::new());

    let request = parse_arguments(json!({
        "clientId": 150_747,
        "queryFilters": {"outcome": "FAILED"}
    }))
    .unwrap();
    let err = engine.create_campaign_from_query(request).await.unwrap_err();

    assert_eq!(err.kind(), "NoMatchingRecords");
    assert!(configuration.calls_matching("INSERT").is_empty());
}

#[tokio::test]
async fn test_incomplete_read_writes_nothing() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(
        configuration_for(150_747)
            .on(CURRENT_SQL, vec![failed_transaction(300, 10)])
            .fail_on(ARCHIVE_SQL, "ORA-00942: table or view does not exist"),
    );
    let engine = engine(
        &primary,
        &configuration,
        EngineConfig::new().with_archive_count(1),
    );

    let request = parse_arguments(json!({"clientId": 150_747})).unwrap();
    let err = engine.create_campaign_from_query(request).await.unwrap_err();

    assert_eq!(err.kind(), "PartialFanoutFailure");
    assert!(configuration.calls_matching("INSERT").is_empty());
}

#[tokio::test]
async fn test_archive_missing_requeue_column_names_the_archive() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(
        configuration_for(150_747)
            .on(CURRENT_SQL, vec![failed_transaction(300, 10)])
            .fail_on(ARCHIVE_SQL, "ORA-00904: \"EXTRA_20\": invalid identifier"),
    );
    let engine = engine(
        &primary,
        &configuration,
        EngineConfig::new().with_archive_count(1),
    );

    let request = parse_arguments(json!({"clientId": 150_747})).unwrap();
    let err = engine.create_campaign_from_query(request).await.unwrap_err();

    assert!(matches!(
        &err,
        ContactGateError::PartialFanoutFailure { failures }
            if failures.len() == 1
                && failures[0].table == "LVOUSR.TRANSACTION_0126@RPT1"
                && failures[0].message.contains("ORA-00904")
    ));
    assert!(configuration.calls_matching(CAMPAIGN_INSERT_SQL).is_empty());
    assert!(configuration.calls_matching(REQUEUE_INSERT_SQL).is_empty());
}

#[tokio::test]
async fn test_rejected_requeue_reports_partial_insertion() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(requeue_backend().reject_on(
        REQUEUE_INSERT_SQL,
        "ORA-02291: integrity constraint violated - parent key not found",
    ));
    let engine = engine(&primary, &configuration, EngineConfig::new());

    let request = parse_arguments(json!({"clientId": 150_747})).unwrap();
    let outcome = engine.create_campaign_from_query(request).await.unwrap();

    assert_eq!(outcome.campaign_key(), 9001);
    assert!(matches!(
        &outcome,
        CampaignOutcome::PartiallyInserted { error, .. } if error.contains("ORA-02291")
    ));
    let err = outcome.into_result().unwrap_err();
    assert_eq!(err.to_response()["error"]["campaign_key"], json!(9001));
}

#[tokio::test]
async fn test_rejected_campaign_stops_requeue() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(
        requeue_backend().reject_on(CAMPAIGN_INSERT_SQL, "ORA-01400: cannot insert NULL"),
    );
    let engine = engine(&primary, &configuration, EngineConfig::new());

    let request = parse_arguments(json!({"clientId": 150_747})).unwrap();
    let err = engine.create_campaign_from_query(request).await.unwrap_err();

    assert_eq!(err.kind(), "InsertRejected");
    assert!(configuration.calls_matching(REQUEUE_INSERT_SQL).is_empty());
}

#[tokio::test]
async fn test_invalid_requests_rejected_before_reading() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(requeue_backend());
    let engine = engine(&primary, &configuration, EngineConfig::new());
    let full_budget: serde_json::Map<String, serde_json::Value> = (1..=20)
        .map(|i| (format!("extra_{i}"), json!("x")))
        .collect();

    let cases = [
        (json!({"clientId": 150_747, "maxRecords": 10_001}), "LimitExceeded"),
        (
            json!({"clientId": 150_747, "queryFilters": full_budget}),
            "LimitExceeded",
        ),
        (
            json!({"clientId": 150_747, "campaignData": {"am_option": "SOMETIMES"}}),
            "InvalidArgument",
        ),
        (
            json!({"clientId": 150_747, "campaignData": {"client_id": 150_723}}),
            "InvalidArgument",
        ),
        (
            json!({"clientId": 150_747, "campaignData": {"campaign_id": 1}}),
            "ForbiddenColumn",
        ),
        (
            json!({"clientId": 150_747, "queryFilters": {"client_id": 150_723}}),
            "InvalidArgument",
        ),
    ];

    for (arguments, kind) in cases {
        let request = parse_arguments(arguments.clone()).unwrap();
        let err = engine.create_campaign_from_query(request).await.unwrap_err();
        assert_eq!(err.kind(), kind, "for {arguments}");
    }
    assert!(configuration.calls().is_empty());
}

#[tokio::test]
async fn test_create_campaign() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(configuration_for(150_747).with_key(77));
    let engine = engine(&primary, &configuration, EngineConfig::new());

    let request = parse_arguments(json!({
        "clientId": 150_747,
        "data": {"filename": "spring_recall.csv", "skill_id": 10}
    }))
    .unwrap();
    let created = engine.create_campaign(request).await.unwrap();

    assert_eq!(created.campaign_key, 77);
    let campaign = &configuration.calls_matching(CAMPAIGN_INSERT_SQL)[0];
    assert!(
        campaign
            .params
            .contains(&SqlValue::Text("spring_recall.csv".into()))
    );
    assert!(campaign.params.contains(&SqlValue::Int(150_747)));
}

#[tokio::test]
async fn test_create_campaign_for_unknown_client() {
    let primary = Arc::new(ScriptedBackend::primary());
    let configuration = Arc::new(ScriptedBackend::configuration());
    let engine = engine(&primary, &configuration, EngineConfig::new());

    let request = parse_arguments(json!({"clientId": 5, "data": {"filename": "x.csv"}})).unwrap();
    let err = engine.create_campaign(request).await.unwrap_err();

    assert_eq!(err.kind(), "UnknownClient");
    assert!(configuration.calls_matching("INSERT").is_empty());
}
