// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Map-action scripts end to end: stored script, bus command, sagas out.

mod common;

use common::*;
use serde_json::json;

use atlas_core::bus::Envelope;
use atlas_core::topic;
use atlas_services::field::Field;
use atlas_services::map_actions::{MapActionCommand, MapActionScript};
use atlas_services::map_actions::processor::{NO_MATCH, NO_SCRIPT};

fn henesys_script() -> MapActionScript {
    serde_json::from_value(json!({
        "scriptName": "go_henesys",
        "scriptType": "onUserEnter",
        "rules": [
            {
                "id": "veteran",
                "conditions": [
                    {"type": "map_id", "operator": "=", "value": 100000000},
                    {"type": "level", "operator": ">=", "value": 30},
                    {"type": "item", "operator": ">=", "value": 1, "referenceId": "4031013"}
                ],
                "operations": [
                    {"type": "drop_message", "params": {"message": "Welcome back"}}
                ]
            },
            {
                "id": "newcomer",
                "operations": [
                    {"type": "show_intro", "params": {"path": "Effect/Direction1.img/henesys"}},
                    {"type": "unlock_ui"}
                ]
            }
        ]
    }))
    .unwrap()
}

fn henesys() -> Field {
    Field::new(0, 1, 100000000)
}

#[tokio::test]
async fn test_first_matching_rule_submits_one_saga_per_operation() {
    let ctx = ServicesContext::new();
    ctx.state
        .map_actions
        .create(&ctx.tenant, henesys_script())
        .await
        .unwrap();

    let result = ctx
        .state
        .map_actions
        .process(&ctx.tenant, &henesys(), 7, "go_henesys", "onUserEnter")
        .await
        .unwrap();
    assert_eq!(result.matched_rule, "veteran");
    assert_eq!(result.submitted, 1);

    // Both remote conditions went out in a single validation call.
    let calls = ctx.validator.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, 7);
    assert_eq!(calls[0].1.len(), 2);

    let sent = ctx.sent();
    assert_eq!(kinds(&sent), vec!["CREATE"]);
    assert_eq!(sent[0].topic, topic::COMMAND_TOPIC_SAGA);
    assert_eq!(sent[0].key, "7");
    assert_eq!(sent[0].value["body"]["steps"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_validation_falls_through_to_next_rule() {
    let ctx = ServicesContext::new();
    ctx.state
        .map_actions
        .create(&ctx.tenant, henesys_script())
        .await
        .unwrap();
    *ctx.validator.passes.lock().unwrap() = false;

    let result = ctx
        .state
        .map_actions
        .process(&ctx.tenant, &henesys(), 7, "go_henesys", "onUserEnter")
        .await
        .unwrap();
    assert_eq!(result.matched_rule, "newcomer");
    assert_eq!(result.operations.len(), 2);
    // unlock_ui needs no saga.
    assert_eq!(result.submitted, 1);
    assert_eq!(kinds(&ctx.sent()), vec!["CREATE"]);
}

#[tokio::test]
async fn test_map_condition_is_checked_locally() {
    let ctx = ServicesContext::new();
    ctx.state
        .map_actions
        .create(&ctx.tenant, henesys_script())
        .await
        .unwrap();

    let elsewhere = Field::new(0, 1, 104000000);
    let result = ctx
        .state
        .map_actions
        .process(&ctx.tenant, &elsewhere, 7, "go_henesys", "onUserEnter")
        .await
        .unwrap();
    assert_eq!(result.matched_rule, "newcomer");
    assert!(ctx.validator.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_script_and_no_match() {
    let ctx = ServicesContext::new();
    let result = ctx
        .state
        .map_actions
        .process(&ctx.tenant, &henesys(), 7, "missing", "onUserEnter")
        .await
        .unwrap();
    assert_eq!(result.matched_rule, NO_SCRIPT);

    let mut script = henesys_script();
    script.rules.truncate(1);
    ctx.state.map_actions.create(&ctx.tenant, script).await.unwrap();
    *ctx.validator.passes.lock().unwrap() = false;

    let result = ctx
        .state
        .map_actions
        .process(&ctx.tenant, &henesys(), 7, "go_henesys", "onUserEnter")
        .await
        .unwrap();
    assert_eq!(result.matched_rule, NO_MATCH);
    assert!(ctx.sent().is_empty());
}

#[tokio::test]
async fn test_bus_command_runs_script() {
    let ctx = ServicesContext::new();
    ctx.state
        .map_actions
        .create(&ctx.tenant, henesys_script())
        .await
        .unwrap();

    ctx.deliver(ctx.message(
        topic::COMMAND_TOPIC_MAP_ACTIONS,
        Envelope::for_character(
            0,
            7,
            "EXECUTE",
            MapActionCommand {
                field: henesys(),
                character_id: 7,
                script_name: "go_henesys".to_string(),
                script_type: "onUserEnter".to_string(),
            },
        ),
    ))
    .await;

    assert_eq!(kinds(&ctx.sent()), vec!["CREATE"]);
}

#[tokio::test]
async fn test_scripts_are_tenant_scoped() {
    let ctx = ServicesContext::new();
    ctx.state
        .map_actions
        .create(&ctx.tenant, henesys_script())
        .await
        .unwrap();

    let other = tenant();
    let result = ctx
        .state
        .map_actions
        .process(&other, &henesys(), 7, "go_henesys", "onUserEnter")
        .await
        .unwrap();
    assert_eq!(result.matched_rule, NO_SCRIPT);
}

#[tokio::test]
async fn test_seed_loads_directory_and_reports_bad_files() {
    let ctx = ServicesContext::new();
    let dir = ctx.data_dir().join("map-actions");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("go_henesys.json"),
        serde_json::to_vec(&henesys_script()).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.join("broken.json"), b"{not json").unwrap();

    ctx.state
        .map_actions
        .create(
            &ctx.tenant,
            serde_json::from_value(json!({"scriptName": "stale", "scriptType": "onFirstUserEnter"}))
                .unwrap(),
        )
        .await
        .unwrap();

    let result = ctx.state.map_actions.seed(&ctx.tenant).await.unwrap();
    assert_eq!(result.deleted, 1);
    assert_eq!(result.created, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors.len(), 1);

    let stored = ctx.state.map_actions.store().list(&ctx.tenant).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].script.script_name, "go_henesys");
}
