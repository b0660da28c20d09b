use axum::{
    Json, Router,
    middleware::{self},
    response::IntoResponse,
    routing::get,
};
use core_lib::{
    TenantReadModel,
    services::{CacheManager, CommandStore, RateLimiter},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub mod application;

use application::commands::{handle_create_command, handle_get_command, handle_list_commands};
use application::middleware::{RateLimits, TokenVerifier, require_auth};
use application::query::{handle_get_tenant_agents, handle_get_tenant_me, handle_list_tenants};

// Holds shared dependencies
#[derive(Clone)]
pub struct AppState {
    pub command_store: CommandStore,
    pub tenants: Arc<dyn TenantReadModel>,
    pub cache: CacheManager,
    pub rate_limiter: RateLimiter,
    pub rate_limits: RateLimits,
    pub token_verifier: Arc<TokenVerifier>,
}

pub fn create_app(app_state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/tenant/me", get(handle_get_tenant_me))
        .route("/tenant/agents", get(handle_get_tenant_agents))
        .route("/internal/tenants", get(handle_list_tenants))
        .route(
            "/internal/operations/commands",
            get(handle_list_commands).post(handle_create_command),
        )
        .route(
            "/internal/operations/commands/{command_id}",
            get(handle_get_command),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(authenticated)
        .layer(cors)
        .with_state(app_state)
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
