//! Integration tests for recording and querying state history.
//!
//! These tests verify:
//! 1. Transitions with identical labels share a stream and read back in time order
//! 2. No-data transitions persist an empty values object
//! 3. Rule-scoped queries add the rule selector last
//! 4. Streams from several rules merge into one timeline
//! 5. Label filters and external labels flow through to the store

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use claw_history::{
    build_selectors, EvalState, HistorianConfig, HistoryQuery, InMemoryLogStore, LogStoreClient,
    Operator, RecordPolicy, RemoteHistorian, RuleMeta, StateTransition, FOLDER_UID_LABEL,
    GROUP_LABEL, ORG_ID_LABEL, RULE_UID_LABEL, STATE_HISTORY_LABEL_KEY,
};

// ============================================================================
// Helpers
// ============================================================================

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn rule(uid: &str) -> RuleMeta {
    RuleMeta {
        org_id: 7,
        uid: uid.to_string(),
        group: "gpu-health".to_string(),
        namespace_uid: "infra".to_string(),
        dashboard_uid: "dash-gpu".to_string(),
        panel_id: 3,
    }
}

fn transition(prev: EvalState, cur: EvalState, secs: i64, node: &str) -> StateTransition {
    StateTransition::new(prev, cur, at(secs)).with_label("node", node)
}

fn historian(config: HistorianConfig) -> RemoteHistorian<InMemoryLogStore> {
    RemoteHistorian::new(Arc::new(InMemoryLogStore::new()), config).unwrap()
}

async fn record(
    historian: &RemoteHistorian<InMemoryLogStore>,
    rule: &RuleMeta,
    transitions: &[StateTransition],
) {
    historian
        .record_states_async(&CancellationToken::new(), rule, transitions)
        .await
        .unwrap()
        .unwrap();
}

fn window() -> HistoryQuery {
    HistoryQuery::new(7).with_range(at(0), at(10_000))
}

// ============================================================================
// Recording and reading back
// ============================================================================

#[tokio::test]
async fn test_identical_labels_share_stream_and_read_in_order() {
    let historian = historian(HistorianConfig::default());
    let r = rule("temp-high");

    record(
        &historian,
        &r,
        &[
            transition(EvalState::Normal, EvalState::Alerting, 100, "gpu-01"),
            transition(EvalState::Alerting, EvalState::Normal, 200, "gpu-01"),
        ],
    )
    .await;
    assert_eq!(historian.client().stream_count(), 1);

    let frame = historian
        .query_states(&CancellationToken::new(), &window())
        .await
        .unwrap();
    assert_eq!(frame.times, vec![at(100), at(200)]);
    assert!(frame.lines[0].contains(r#""current":"Alerting""#));
    assert!(frame.lines[1].contains(r#""current":"Normal""#));
}

#[tokio::test]
async fn test_out_of_order_input_reads_back_ascending() {
    let historian = historian(HistorianConfig::default());
    record(
        &historian,
        &rule("temp-high"),
        &[
            transition(EvalState::Alerting, EvalState::Normal, 200, "gpu-01"),
            transition(EvalState::Normal, EvalState::Alerting, 100, "gpu-01"),
        ],
    )
    .await;
    assert_eq!(historian.client().stream_count(), 1);

    let frame = historian
        .query_states(&CancellationToken::new(), &window())
        .await
        .unwrap();
    assert_eq!(frame.times, vec![at(100), at(200)]);
    assert!(frame.lines[0].contains(r#""current":"Alerting""#));
}

#[tokio::test]
async fn test_no_data_persists_empty_values() {
    let historian = historian(HistorianConfig::default());
    let t = transition(EvalState::Alerting, EvalState::NoData, 50, "gpu-02").with_value("A", 1.0);
    record(&historian, &rule("temp-high"), &[t]).await;

    let frame = historian
        .query_states(&CancellationToken::new(), &window())
        .await
        .unwrap();
    assert_eq!(frame.len(), 1);
    assert!(frame.lines[0].contains(r#""values":{}"#));
}

#[tokio::test]
async fn test_rule_selector_is_last() {
    let query = window().with_rule("temp-high").with_label("node", "gpu-01");
    let selectors = build_selectors(&query).unwrap();

    assert_eq!(selectors.len(), 2 + 1 + 1);
    assert_eq!(selectors[0].label(), ORG_ID_LABEL);
    assert_eq!(selectors[1].label(), STATE_HISTORY_LABEL_KEY);
    let last = selectors.last().unwrap();
    assert_eq!(last.label(), RULE_UID_LABEL);
    assert_eq!(last.op(), Operator::Eq);
    assert_eq!(last.value(), "temp-high");
}

#[tokio::test]
async fn test_rule_scoped_query_filters_other_rules() {
    let historian = historian(HistorianConfig::default());
    record(
        &historian,
        &rule("temp-high"),
        &[transition(EvalState::Normal, EvalState::Alerting, 10, "gpu-01")],
    )
    .await;
    record(
        &historian,
        &rule("mem-high"),
        &[transition(EvalState::Normal, EvalState::Alerting, 20, "gpu-01")],
    )
    .await;

    let frame = historian
        .query_states(&CancellationToken::new(), &window().with_rule("mem-high"))
        .await
        .unwrap();
    assert_eq!(frame.len(), 1);
    assert_eq!(frame.rule_uid.as_deref(), Some("mem-high"));
    assert!(frame.labels[0].contains(r#""ruleUID":"mem-high""#));
}

// ============================================================================
// Merging across streams
// ============================================================================

#[tokio::test]
async fn test_interleaved_streams_merge_by_time() {
    let historian = historian(HistorianConfig::default());
    let r = rule("temp-high");

    record(
        &historian,
        &r,
        &[
            transition(EvalState::Normal, EvalState::Alerting, 10, "gpu-01"),
            transition(EvalState::Normal, EvalState::Pending, 15, "gpu-02"),
            transition(EvalState::Alerting, EvalState::Normal, 30, "gpu-01"),
        ],
    )
    .await;
    record(
        &historian,
        &r,
        &[
            transition(EvalState::Pending, EvalState::Alerting, 20, "gpu-02"),
            transition(EvalState::Normal, EvalState::Alerting, 25, "gpu-03"),
        ],
    )
    .await;
    assert_eq!(historian.client().stream_count(), 3);

    let frame = historian
        .query_states(&CancellationToken::new(), &window())
        .await
        .unwrap();
    assert_eq!(frame.times, vec![at(10), at(15), at(20), at(25), at(30)]);

    let nodes: Vec<String> = frame
        .labels
        .iter()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["node"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(nodes, vec!["gpu-01", "gpu-02", "gpu-02", "gpu-03", "gpu-01"]);
}

#[tokio::test]
async fn test_rows_outside_window_are_excluded() {
    let historian = historian(HistorianConfig::default());
    record(
        &historian,
        &rule("temp-high"),
        &[
            transition(EvalState::Normal, EvalState::Alerting, 10, "gpu-01"),
            transition(EvalState::Alerting, EvalState::Normal, 500, "gpu-01"),
        ],
    )
    .await;

    let query = HistoryQuery::new(7).with_range(at(0), at(500));
    let frame = historian
        .query_states(&CancellationToken::new(), &query)
        .await
        .unwrap();
    assert_eq!(frame.times, vec![at(10)]);
}

// ============================================================================
// Labels and configuration
// ============================================================================

#[tokio::test]
async fn test_stored_labels_carry_identity_and_external_labels() {
    let config = HistorianConfig::default()
        .with_external_label("cluster", "eu-west")
        .with_external_label(GROUP_LABEL, "overridden");
    let historian = historian(config);
    let t = transition(EvalState::Normal, EvalState::Alerting, 5, "gpu-01")
        .with_label("__private__", "hidden");
    record(&historian, &rule("temp-high"), &[t]).await;

    let result = historian.client().query(&[], 0, i64::MAX).await.unwrap();
    let labels = &result.streams()[0].stream;
    assert_eq!(labels.get("cluster"), Some("eu-west"));
    assert_eq!(labels.get(GROUP_LABEL), Some("gpu-health"));
    assert_eq!(labels.get(FOLDER_UID_LABEL), Some("infra"));
    assert_eq!(labels.get(ORG_ID_LABEL), Some("7"));
    assert_eq!(labels.get("__private__"), None);

    let frame = historian
        .query_states(
            &CancellationToken::new(),
            &window().with_label("cluster", "eu-west"),
        )
        .await
        .unwrap();
    assert_eq!(frame.len(), 1);

    let frame = historian
        .query_states(
            &CancellationToken::new(),
            &window().with_label("cluster", "us-east"),
        )
        .await
        .unwrap();
    assert!(frame.is_empty());
}

#[tokio::test]
async fn test_policy_from_config_filters_transitions() {
    let config = HistorianConfig::default().with_policy(RecordPolicy::new().exclude(EvalState::Pending));
    let historian = historian(config);
    record(
        &historian,
        &rule("temp-high"),
        &[
            transition(EvalState::Normal, EvalState::Pending, 1, "gpu-01"),
            transition(EvalState::Pending, EvalState::Alerting, 2, "gpu-01"),
            transition(EvalState::Alerting, EvalState::Alerting, 3, "gpu-01"),
        ],
    )
    .await;

    assert_eq!(historian.client().row_count(), 1);
}

#[tokio::test]
async fn test_unreachable_store_reports_failure() {
    let historian = historian(HistorianConfig::default());
    historian.client().stop();

    let outcome = historian
        .record_states_async(
            &CancellationToken::new(),
            &rule("temp-high"),
            &[transition(EvalState::Normal, EvalState::Alerting, 1, "gpu-01")],
        )
        .await
        .unwrap();
    let err = outcome.unwrap_err();
    assert!(err.to_string().starts_with("failed to save state history batch"));

    let err = historian
        .query_states(&CancellationToken::new(), &window())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("log store query failed"));
}
