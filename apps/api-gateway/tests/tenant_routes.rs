mod common;

use api_gateway::application::middleware::RateLimits;
use axum::http::header::AUTHORIZATION;
use common::{
    admin_token, bearer, setup_test_app, setup_test_app_with_limits, support_token,
    tenant_user_token,
};
use http::{HeaderName, HeaderValue, StatusCode};
use serde_json::Value;

const FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

#[tokio::test]
async fn tenant_me_is_served_from_cache_on_second_read() {
    let app = setup_test_app();
    let user = tenant_user_token("t-1");

    let first = app
        .server
        .get("/tenant/me")
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);
    assert_eq!(first.header("x-cache-status"), "MISS");
    assert_eq!(first.header("cache-control"), "private, max-age=300");
    let body = first.json::<Value>();
    assert_eq!(body["id"], "t-1");
    assert_eq!(body["name"], "Acme");

    let second = app
        .server
        .get("/tenant/me")
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    assert_eq!(second.status_code(), StatusCode::OK);
    assert_eq!(second.header("x-cache-status"), "HIT");
    assert_eq!(second.json::<Value>()["id"], "t-1");
}

#[tokio::test]
async fn tenant_user_cannot_read_another_tenant() {
    let app = setup_test_app();
    let response = app
        .server
        .get("/tenant/me")
        .add_query_param("tenant_id", "t-2")
        .add_header(AUTHORIZATION, bearer(&tenant_user_token("t-1")))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.json::<Value>()["message"],
        "Forbidden: tenant access denied"
    );
}

#[tokio::test]
async fn internal_users_read_any_tenant() {
    let app = setup_test_app();
    let response = app
        .server
        .get("/tenant/me")
        .add_query_param("tenant_id", "t-2")
        .add_header(AUTHORIZATION, bearer(&support_token()))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["name"], "Globex");
}

#[tokio::test]
async fn internal_user_without_tenant_must_name_one() {
    let app = setup_test_app();
    let response = app
        .server
        .get("/tenant/me")
        .add_header(AUTHORIZATION, bearer(&admin_token()))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Tenant ID is required");
}

#[tokio::test]
async fn unknown_tenant_hides_existence_from_tenant_users() {
    let app = setup_test_app();

    let as_member = app
        .server
        .get("/tenant/me")
        .add_header(AUTHORIZATION, bearer(&tenant_user_token("t-404")))
        .await;
    assert_eq!(as_member.status_code(), StatusCode::FORBIDDEN);

    let as_admin = app
        .server
        .get("/tenant/me")
        .add_query_param("tenant_id", "t-404")
        .add_header(AUTHORIZATION, bearer(&admin_token()))
        .await;
    assert_eq!(as_admin.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(as_admin.json::<Value>()["error"], "NotFound");
}

#[tokio::test]
async fn agents_default_to_active_only() {
    let app = setup_test_app();
    let user = tenant_user_token("t-1");

    let active = app
        .server
        .get("/tenant/agents")
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    assert_eq!(active.status_code(), StatusCode::OK);
    let agents = active.json::<Value>()["agents"].as_array().unwrap().clone();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["id"], "a-1");

    let all = app
        .server
        .get("/tenant/agents")
        .add_query_param("status", "all")
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    assert_eq!(all.status_code(), StatusCode::OK);
    assert_eq!(all.header("x-cache-status"), "MISS");
    assert_eq!(all.json::<Value>()["agents"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn tenant_limit_blocks_after_quota() {
    let app = setup_test_app_with_limits(RateLimits {
        ip_per_minute: 100,
        tenant_per_minute: 2,
    });
    let user = tenant_user_token("t-1");

    for (i, expected) in [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        .into_iter()
        .enumerate()
    {
        // Distinct addresses keep the per-IP counter out of the way.
        let response = app
            .server
            .get("/tenant/me")
            .add_header(AUTHORIZATION, bearer(&user))
            .add_header(
                FORWARDED_FOR,
                HeaderValue::from_str(&format!("10.0.0.{}", i + 1)).unwrap(),
            )
            .await;
        assert_eq!(response.status_code(), expected, "request {}", i + 1);
    }

    let blocked = app
        .server
        .get("/tenant/agents")
        .add_header(AUTHORIZATION, bearer(&user))
        .add_header(FORWARDED_FOR, HeaderValue::from_static("10.0.0.9"))
        .await;
    assert_eq!(blocked.status_code(), StatusCode::TOO_MANY_REQUESTS);
    let body = blocked.json::<Value>();
    assert_eq!(body["error"], "RateLimited");
    assert_eq!(body["message"], "Too many requests for this tenant");

    // Another tenant has its own quota.
    let other = app
        .server
        .get("/tenant/me")
        .add_header(AUTHORIZATION, bearer(&tenant_user_token("t-2")))
        .add_header(FORWARDED_FOR, HeaderValue::from_static("10.0.0.10"))
        .await;
    assert_eq!(other.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn ip_limit_applies_across_tenants() {
    let app = setup_test_app_with_limits(RateLimits {
        ip_per_minute: 1,
        tenant_per_minute: 100,
    });

    let first = app
        .server
        .get("/tenant/me")
        .add_header(AUTHORIZATION, bearer(&tenant_user_token("t-1")))
        .add_header(FORWARDED_FOR, HeaderValue::from_static("203.0.113.7, 10.0.0.1"))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);

    let second = app
        .server
        .get("/tenant/me")
        .add_header(AUTHORIZATION, bearer(&tenant_user_token("t-2")))
        .add_header(FORWARDED_FOR, HeaderValue::from_static("203.0.113.7"))
        .await;
    assert_eq!(second.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        second.json::<Value>()["message"],
        "Too many requests from this IP"
    );
}

#[tokio::test]
async fn internal_tenant_list_filters() {
    let app = setup_test_app();
    let support = support_token();

    let active = app
        .server
        .get("/internal/tenants")
        .add_header(AUTHORIZATION, bearer(&support))
        .await;
    assert_eq!(active.status_code(), StatusCode::OK);
    let body = active.json::<Value>();
    assert_eq!(body["tenants"].as_array().unwrap().len(), 2);
    assert_eq!(body["limit"], 50);
    assert_eq!(body["offset"], 0);

    let all = app
        .server
        .get("/internal/tenants")
        .add_query_param("status", "all")
        .add_header(AUTHORIZATION, bearer(&support))
        .await;
    let ids: Vec<String> = all.json::<Value>()["tenants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&"t-3".to_string()));

    let starter = app
        .server
        .get("/internal/tenants")
        .add_query_param("plan", "starter")
        .add_header(AUTHORIZATION, bearer(&support))
        .await;
    let tenants = starter.json::<Value>()["tenants"].as_array().unwrap().clone();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0]["id"], "t-2");
}

#[tokio::test]
async fn invalid_limit_is_rejected() {
    let app = setup_test_app();
    let response = app
        .server
        .get("/internal/tenants")
        .add_query_param("limit", "lots")
        .add_header(AUTHORIZATION, bearer(&admin_token()))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "ValidationFailed");
}

#[tokio::test]
async fn uppercase_status_shares_the_default_agent_listing() {
    let app = setup_test_app();
    let user = tenant_user_token("t-1");

    let upper = app
        .server
        .get("/tenant/agents")
        .add_query_param("status", "ACTIVE")
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    assert_eq!(upper.status_code(), StatusCode::OK);
    assert_eq!(upper.header("x-cache-status"), "MISS");
    assert_eq!(upper.json::<Value>()["agents"].as_array().unwrap().len(), 1);

    let default = app
        .server
        .get("/tenant/agents")
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    assert_eq!(default.status_code(), StatusCode::OK);
    assert_eq!(default.header("x-cache-status"), "HIT");
    let agents = default.json::<Value>()["agents"].as_array().unwrap().clone();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["id"], "a-1");
}

#[tokio::test]
async fn tenant_list_filters_ignore_case() {
    let app = setup_test_app();
    let support = support_token();

    let suspended = app
        .server
        .get("/internal/tenants")
        .add_query_param("status", "Suspended")
        .add_header(AUTHORIZATION, bearer(&support))
        .await;
    let tenants = suspended.json::<Value>()["tenants"].as_array().unwrap().clone();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0]["id"], "t-3");

    let starter = app
        .server
        .get("/internal/tenants")
        .add_query_param("plan", "STARTER")
        .add_header(AUTHORIZATION, bearer(&support))
        .await;
    let tenants = starter.json::<Value>()["tenants"].as_array().unwrap().clone();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0]["id"], "t-2");
}

#[tokio::test]
async fn separators_in_a_filter_do_not_reuse_another_listing() {
    let app = setup_test_app();
    let support = support_token();

    let smuggled = app
        .server
        .get("/internal/tenants")
        .add_query_param("plan", "professional|search:Acme")
        .add_header(AUTHORIZATION, bearer(&support))
        .await;
    assert_eq!(smuggled.status_code(), StatusCode::OK);
    assert!(smuggled.json::<Value>()["tenants"].as_array().unwrap().is_empty());

    let genuine = app
        .server
        .get("/internal/tenants")
        .add_query_param("plan", "professional")
        .add_query_param("search", "Acme")
        .add_header(AUTHORIZATION, bearer(&support))
        .await;
    assert_eq!(genuine.header("x-cache-status"), "MISS");
    let tenants = genuine.json::<Value>()["tenants"].as_array().unwrap().clone();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0]["id"], "t-1");
}
