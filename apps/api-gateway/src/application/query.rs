use axum::{
    Json,
    extract::{Extension, Query, State},
    response::IntoResponse,
};
use core_lib::{
    CoreError,
    domain::tenant::{TenantAgent, TenantFilter, TenantSummary},
    services::{CacheTtl, cache_key},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::authz::{AuthContext, missing_tenant_resource, require_internal, resolve_tenant_scope};
use super::middleware::{ClientIp, rate_limit};
use super::{ApiResult, cache_headers, lowercase_filter, parse_count, read_through};
use crate::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;
const DEFAULT_AGENT_STATUS: &str = "active";
const DEFAULT_TENANT_STATUS: &str = "active";

#[derive(Debug, Default, Deserialize)]
pub struct TenantScopeQuery {
    pub tenant_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TenantListQuery {
    pub status: Option<String>,
    pub plan: Option<String>,
    pub search: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentsResponse {
    pub agents: Vec<TenantAgent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TenantsResponse {
    pub tenants: Vec<TenantSummary>,
    pub limit: usize,
    pub offset: usize,
}

/// Both limiters guard tenant routes: the caller's address first, then the
/// tenant once the scope is known and authorized.
async fn scoped_tenant(
    app_state: &AppState,
    ctx: &AuthContext,
    client_ip: &ClientIp,
    requested: Option<&str>,
) -> Result<String, CoreError> {
    rate_limit::check_ip(&app_state.rate_limiter, app_state.rate_limits, client_ip).await?;
    let tenant_id = resolve_tenant_scope(ctx, requested)?;
    rate_limit::check_tenant(&app_state.rate_limiter, app_state.rate_limits, &tenant_id).await?;
    Ok(tenant_id)
}

// GET /tenant/me
pub async fn handle_get_tenant_me(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    client_ip: ClientIp,
    Query(params): Query<TenantScopeQuery>,
) -> ApiResult<impl IntoResponse> {
    let tenant_id = scoped_tenant(&app_state, &ctx, &client_ip, params.tenant_id.as_deref()).await?;

    let key = cache_key("tenant", &tenant_id, &[]);
    let tenants = app_state.tenants.clone();
    let (tenant, status) = read_through(&app_state.cache, &key, CacheTtl::TENANT_INFO, || async move {
        tenants
            .get_tenant(&tenant_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Tenant not found".into()))
    })
    .await
    .map_err(|e| match e {
        CoreError::NotFound(_) => missing_tenant_resource(&ctx, "Tenant"),
        other => other,
    })?;

    Ok((cache_headers(CacheTtl::TENANT_INFO, status), Json(tenant)))
}

// GET /tenant/agents
pub async fn handle_get_tenant_agents(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    client_ip: ClientIp,
    Query(params): Query<TenantScopeQuery>,
) -> ApiResult<impl IntoResponse> {
    let tenant_id = scoped_tenant(&app_state, &ctx, &client_ip, params.tenant_id.as_deref()).await?;

    let status_filter =
        lowercase_filter(Some(params.status.as_deref().unwrap_or(DEFAULT_AGENT_STATUS)));
    let key = cache_key("tenant_agents", &tenant_id, &[("status", status_filter.clone())]);
    let tenants = app_state.tenants.clone();
    let (response, status) =
        read_through(&app_state.cache, &key, CacheTtl::TENANT_AGENTS, || async move {
            let agents = tenants
                .list_tenant_agents(&tenant_id, status_filter.as_deref())
                .await?;
            Ok::<_, CoreError>(AgentsResponse { agents })
        })
        .await?;

    Ok((cache_headers(CacheTtl::TENANT_AGENTS, status), Json(response)))
}

// GET /internal/tenants
pub async fn handle_list_tenants(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<TenantListQuery>,
) -> ApiResult<impl IntoResponse> {
    require_internal(&ctx, false)?;

    let limit = parse_count("limit", params.limit.as_deref())?
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_LIMIT)
        .min(MAX_LIMIT);
    let offset = parse_count("offset", params.offset.as_deref())?.unwrap_or(0);
    let filter = TenantFilter {
        status: lowercase_filter(Some(
            params.status.as_deref().unwrap_or(DEFAULT_TENANT_STATUS),
        )),
        plan: lowercase_filter(params.plan.as_deref()),
        search: params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        limit,
        offset,
    };

    let key = cache_key(
        "tenants",
        "list",
        &[
            ("status", filter.status.clone()),
            ("plan", filter.plan.clone()),
            ("search", filter.search.clone()),
            ("limit", Some(limit.to_string())),
            ("offset", Some(offset.to_string())),
        ],
    );
    debug!(key = %key, user_id = %ctx.user_id, "Listing tenants");

    let tenants = app_state.tenants.clone();
    let (response, status) =
        read_through(&app_state.cache, &key, CacheTtl::TENANTS_LIST, || async move {
            let tenants = tenants.list_tenants(&filter).await?;
            Ok::<_, CoreError>(TenantsResponse {
                tenants,
                limit,
                offset,
            })
        })
        .await?;

    Ok((cache_headers(CacheTtl::TENANTS_LIST, status), Json(response)))
}
