#![allow(dead_code)]

use api_gateway::{
    AppState,
    application::middleware::{RateLimits, TokenVerifier},
    create_app,
};
use axum_test::TestServer;
use chrono::Utc;
use core_lib::{
    adapters::{
        InMemoryAuditLogger, InMemoryCache, InMemoryCommandRepository, InMemoryEventBus,
        InMemoryRateLimitStore, InMemoryTenantReadModel, SqlOperationsExecutor,
    },
    domain::tenant::{PlanLimits, TenantAgent, TenantSummary, TenantUsage},
    services::{COMMAND_TOPIC, CacheManager, CommandProcessor, CommandStore, RateLimiter},
};
use http::HeaderValue;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const SECRET: &[u8] = b"integration-test-secret";

pub struct TestApp {
    pub server: TestServer,
    pub store: CommandStore,
    pub repo: InMemoryCommandRepository,
    pub bus: InMemoryEventBus,
    pub audit: InMemoryAuditLogger,
    pub tenants: InMemoryTenantReadModel,
    pub cache: CacheManager,
}

impl TestApp {
    /// Runs a command processor on the in-memory bus, as the gateway does
    /// when no broker is configured.
    pub fn spawn_processor(&self) -> JoinHandle<()> {
        let receiver = self.bus.subscribe(COMMAND_TOPIC);
        let executor = Arc::new(SqlOperationsExecutor::new(None, Arc::new(self.repo.clone())));
        let processor = CommandProcessor::new(self.store.clone(), executor);
        tokio::spawn(async move { processor.run(receiver).await })
    }
}

pub fn setup_test_app() -> TestApp {
    setup_test_app_with_limits(RateLimits::default())
}

pub fn setup_test_app_with_limits(rate_limits: RateLimits) -> TestApp {
    let repo = InMemoryCommandRepository::new();
    let bus = InMemoryEventBus::default();
    let audit = InMemoryAuditLogger::new();
    let tenants = seeded_tenants();
    let store = CommandStore::new(
        Arc::new(repo.clone()),
        Arc::new(audit.clone()),
        Arc::new(bus.clone()),
    );
    let cache = CacheManager::new("test", Arc::new(InMemoryCache::default()));

    let app_state = AppState {
        command_store: store.clone(),
        tenants: Arc::new(tenants.clone()),
        cache: cache.clone(),
        rate_limiter: RateLimiter::new(Arc::new(InMemoryRateLimitStore::new())),
        rate_limits,
        token_verifier: Arc::new(TokenVerifier::hs256(SECRET)),
    };

    let server = TestServer::new(create_app(app_state)).expect("Failed to create TestServer");
    TestApp {
        server,
        store,
        repo,
        bus,
        audit,
        tenants,
        cache,
    }
}

fn tenant(id: &str, name: &str, plan: &str, status: &str) -> TenantSummary {
    TenantSummary {
        id: id.into(),
        name: name.into(),
        segment: "retail".into(),
        plan: plan.into(),
        status: status.into(),
        created_at: Utc::now(),
        limits: PlanLimits::for_plan(plan),
        usage: TenantUsage {
            active_agents: 0,
            active_users: 3,
        },
    }
}

fn agent(id: &str, status: &str) -> TenantAgent {
    TenantAgent {
        id: id.into(),
        name: format!("Agent {}", id),
        segment: "sales".into(),
        status: status.into(),
        activated_at: Some(Utc::now()),
    }
}

fn seeded_tenants() -> InMemoryTenantReadModel {
    let tenants = InMemoryTenantReadModel::new();
    tenants.upsert_tenant(tenant("t-1", "Acme", "professional", "active"));
    tenants.upsert_tenant(tenant("t-2", "Globex", "starter", "active"));
    tenants.upsert_tenant(tenant("t-3", "Initech", "enterprise", "suspended"));
    tenants.add_agent("t-1", agent("a-1", "active"));
    tenants.add_agent("t-1", agent("a-2", "inactive"));
    tenants.add_agent("t-2", agent("a-3", "active"));
    tenants
}

pub fn token(sub: &str, groups: &[&str], tenant_id: Option<&str>) -> String {
    let mut claims = json!({
        "sub": sub,
        "email": format!("{}@example.com", sub),
        "cognito:groups": groups,
        "exp": Utc::now().timestamp() + 3600,
    });
    if let Some(tenant_id) = tenant_id {
        claims["custom:tenant_id"] = json!(tenant_id);
    }
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET))
        .expect("Failed to sign token")
}

pub fn admin_token() -> String {
    token("admin-1", &["INTERNAL_ADMIN"], None)
}

pub fn support_token() -> String {
    token("support-1", &["INTERNAL_SUPPORT"], None)
}

pub fn tenant_user_token(tenant_id: &str) -> String {
    token(&format!("user-{}", tenant_id), &["TENANT_USER"], Some(tenant_id))
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).expect("valid header value")
}
