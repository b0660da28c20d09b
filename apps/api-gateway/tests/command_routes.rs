mod common;

use axum::http::header::AUTHORIZATION;
use common::{admin_token, bearer, setup_test_app, support_token, token};
use core_lib::domain::command::CommandStatus;
use http::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;

const COMMANDS: &str = "/internal/operations/commands";

#[tokio::test]
async fn created_command_is_driven_to_success() {
    let app = setup_test_app();
    let _processor = app.spawn_processor();
    let admin = admin_token();

    let created = app
        .server
        .post(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin))
        .json(&json!({
            "command_type": "REPROCESS_QUEUE",
            "tenant_id": "t-1",
            "parameters": {"queue_name": "leads", "message_count": 5}
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let body = created.json::<Value>();
    assert_eq!(body["status"], "PENDING");
    let command_id = body["command_id"].as_str().unwrap().to_string();

    let mut finished = None;
    for _ in 0..50 {
        let response = app
            .server
            .get(&format!("{}/{}", COMMANDS, command_id))
            .add_header(AUTHORIZATION, bearer(&admin))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let command = response.json::<Value>();
        if command["status"] == "SUCCESS" {
            finished = Some(command);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let command = finished.expect("command never reached SUCCESS");
    assert_eq!(command["tenant_id"], "t-1");
    assert_eq!(command["output"]["reprocessed"], 5);
    assert_eq!(command["error_message"], Value::Null);

    let created_events = app.audit.events_of_type("CommandCreated");
    assert_eq!(created_events.len(), 1);
    assert_eq!(created_events[0].user_id, "admin-1");
}

#[tokio::test]
async fn invalid_command_type_lists_valid_ones() {
    let app = setup_test_app();
    let response = app
        .server
        .post(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin_token()))
        .json(&json!({"command_type": "DROP_TABLES", "parameters": {}}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let message = response.json::<Value>()["message"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(message.starts_with("Invalid command_type. Must be one of: "));
    assert!(message.contains("HEALTH_CHECK"));
}

#[tokio::test]
async fn tenant_scoped_command_requires_tenant() {
    let app = setup_test_app();
    let response = app
        .server
        .post(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin_token()))
        .json(&json!({
            "command_type": "RESET_TOKEN",
            "parameters": {"integration_id": "int-1"}
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "tenant_id is required for RESET_TOKEN"
    );
    assert!(app.audit.events().is_empty());
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let app = setup_test_app();
    let response = app
        .server
        .post(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin_token()))
        .content_type("application/json")
        .text("{not json")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "ValidationFailed");

    let missing_parameters = app
        .server
        .post(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin_token()))
        .json(&json!({"command_type": "HEALTH_CHECK"}))
        .await;
    assert_eq!(missing_parameters.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_cache_is_invalidated_by_create() {
    let app = setup_test_app();
    let admin = admin_token();

    let empty = app
        .server
        .get(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin))
        .await;
    assert_eq!(empty.status_code(), StatusCode::OK);
    assert_eq!(empty.header("x-cache-status"), "MISS");
    assert_eq!(empty.json::<Value>()["total"], 0);

    let cached = app
        .server
        .get(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin))
        .await;
    assert_eq!(cached.header("x-cache-status"), "HIT");

    app.server
        .post(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin))
        .json(&json!({"command_type": "HEALTH_CHECK", "parameters": {}}))
        .await
        .assert_status(StatusCode::CREATED);

    let refreshed = app
        .server
        .get(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin))
        .await;
    assert_eq!(refreshed.header("x-cache-status"), "MISS");
    let body = refreshed.json::<Value>();
    assert_eq!(body["total"], 1);
    assert_eq!(body["commands"][0]["command_type"], "HEALTH_CHECK");
    assert_eq!(body["limit"], 50);
}

#[tokio::test]
async fn list_filters_by_status_and_tenant() {
    let app = setup_test_app();
    let admin = admin_token();
    for tenant in ["t-1", "t-2"] {
        app.store
            .create(
                "RESTART_AGENT".parse().unwrap(),
                Some(tenant.to_string()),
                &json!({"agent_id": "a-1"}),
                "admin-1",
            )
            .await
            .unwrap();
    }

    let for_t1 = app
        .server
        .get(COMMANDS)
        .add_query_param("tenant_id", "t-1")
        .add_query_param("status", "pending")
        .add_header(AUTHORIZATION, bearer(&support_token()))
        .await;
    assert_eq!(for_t1.status_code(), StatusCode::OK);
    let body = for_t1.json::<Value>();
    assert_eq!(body["total"], 1);
    assert_eq!(body["commands"][0]["tenant_id"], "t-1");

    let succeeded = app
        .server
        .get(COMMANDS)
        .add_query_param("status", "SUCCESS")
        .add_header(AUTHORIZATION, bearer(&admin))
        .await;
    assert_eq!(succeeded.json::<Value>()["total"], 0);

    let bad_status = app
        .server
        .get(COMMANDS)
        .add_query_param("status", "DONE")
        .add_header(AUTHORIZATION, bearer(&admin))
        .await;
    assert_eq!(bad_status.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tenant_users_cannot_list_commands_for_other_tenants() {
    let app = setup_test_app();
    let response = app
        .server
        .get(COMMANDS)
        .add_query_param("tenant_id", "t-1")
        .add_header(
            AUTHORIZATION,
            bearer(&token("user-t-2", &["TENANT_USER"], Some("t-2"))),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_command_is_not_found() {
    let app = setup_test_app();
    let response = app
        .server
        .get(&format!("{}/does-not-exist", COMMANDS))
        .add_header(AUTHORIZATION, bearer(&admin_token()))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_execution_is_recorded_as_error() {
    let app = setup_test_app();
    let _processor = app.spawn_processor();
    let admin = admin_token();

    // Without a database the executor cannot touch tenant agents.
    let created = app
        .server
        .post(COMMANDS)
        .add_header(AUTHORIZATION, bearer(&admin))
        .json(&json!({
            "command_type": "RESTART_AGENT",
            "tenant_id": "t-1",
            "parameters": {"agent_id": "a-1"}
        }))
        .await;
    let command_id = created.json::<Value>()["command_id"]
        .as_str()
        .unwrap()
        .to_string();

    let mut status = CommandStatus::Pending;
    for _ in 0..50 {
        status = app.store.get(&command_id).await.unwrap().status;
        if status == CommandStatus::Error {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, CommandStatus::Error);

    let command = app.store.get(&command_id).await.unwrap();
    assert!(command.error_message.is_some());
    assert!(command.output.is_none());
}
