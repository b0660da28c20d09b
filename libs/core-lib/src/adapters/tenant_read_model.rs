use crate::domain::tenant::{PlanLimits, TenantAgent, TenantFilter, TenantSummary, TenantUsage};
use crate::{CoreError, TenantReadModel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;

const TENANT_SELECT: &str = "SELECT t.id, t.name, t.segment, t.plan, t.status, t.created_at, \
     (SELECT COUNT(*) FROM tenant_agents a WHERE a.tenant_id = t.id AND a.status = 'active') AS active_agents, \
     (SELECT COUNT(*) FROM tenant_users u WHERE u.tenant_id = t.id AND u.status = 'active') AS active_users \
     FROM tenants t";

#[derive(sqlx::FromRow, Debug)]
struct TenantRow {
    id: String,
    name: String,
    segment: String,
    plan: String,
    status: String,
    created_at: DateTime<Utc>,
    active_agents: i64,
    active_users: i64,
}

impl From<TenantRow> for TenantSummary {
    fn from(row: TenantRow) -> Self {
        TenantSummary {
            limits: PlanLimits::for_plan(&row.plan),
            usage: TenantUsage {
                active_agents: row.active_agents as u32,
                active_users: row.active_users as u32,
            },
            id: row.id,
            name: row.name,
            segment: row.segment,
            plan: row.plan,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct AgentRow {
    id: String,
    name: String,
    segment: String,
    status: String,
    activated_at: Option<DateTime<Utc>>,
}

impl From<AgentRow> for TenantAgent {
    fn from(row: AgentRow) -> Self {
        TenantAgent {
            id: row.id,
            name: row.name,
            segment: row.segment,
            status: row.status,
            activated_at: row.activated_at,
        }
    }
}

/// Tenant directory backed by the `tenants`, `tenant_agents` and `tenant_users` tables.
#[derive(Debug, Clone)]
pub struct PostgresTenantReadModel {
    pool: PgPool,
}

impl PostgresTenantReadModel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantReadModel for PostgresTenantReadModel {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<TenantSummary>, CoreError> {
        let query = format!("{TENANT_SELECT} WHERE t.id = $1");
        let row: Option<TenantRow> = sqlx::query_as(&query)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::infra)?;
        Ok(row.map(TenantSummary::from))
    }

    async fn list_tenant_agents(
        &self,
        tenant_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<TenantAgent>, CoreError> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            "SELECT agent_id AS id, name, segment, status, activated_at FROM tenant_agents \
             WHERE tenant_id = $1 AND ($2::text IS NULL OR status = $2) ORDER BY name",
        )
        .bind(tenant_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::infra)?;
        Ok(rows.into_iter().map(TenantAgent::from).collect())
    }

    async fn list_tenants(&self, filter: &TenantFilter) -> Result<Vec<TenantSummary>, CoreError> {
        let query = format!(
            "{TENANT_SELECT} WHERE ($1::text IS NULL OR t.status = $1) \
             AND ($2::text IS NULL OR t.plan = $2) \
             AND ($3::text IS NULL OR t.name ILIKE '%' || $3 || '%') \
             ORDER BY t.name LIMIT $4 OFFSET $5"
        );
        let rows: Vec<TenantRow> = sqlx::query_as(&query)
            .bind(&filter.status)
            .bind(&filter.plan)
            .bind(&filter.search)
            .bind(filter.limit as i64)
            .bind(filter.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::infra)?;
        Ok(rows.into_iter().map(TenantSummary::from).collect())
    }
}

/// Tenant directory held in memory, seeded by the caller. Used in tests and
/// when the gateway runs without a database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTenantReadModel {
    tenants: Arc<DashMap<String, TenantSummary>>,
    agents: Arc<DashMap<String, Vec<TenantAgent>>>,
}

impl InMemoryTenantReadModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_tenant(&self, tenant: TenantSummary) {
        self.tenants.insert(tenant.id.clone(), tenant);
    }

    pub fn add_agent(&self, tenant_id: &str, agent: TenantAgent) {
        self.agents
            .entry(tenant_id.to_string())
            .or_default()
            .push(agent);
    }

    fn active_agent_count(&self, tenant_id: &str) -> u32 {
        self.agents
            .get(tenant_id)
            .map(|agents| agents.iter().filter(|a| a.status == "active").count() as u32)
            .unwrap_or(0)
    }

    fn with_live_usage(&self, mut tenant: TenantSummary) -> TenantSummary {
        tenant.usage.active_agents = self.active_agent_count(&tenant.id);
        tenant
    }
}

#[async_trait]
impl TenantReadModel for InMemoryTenantReadModel {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<TenantSummary>, CoreError> {
        Ok(self
            .tenants
            .get(tenant_id)
            .map(|t| self.with_live_usage(t.value().clone())))
    }

    async fn list_tenant_agents(
        &self,
        tenant_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<TenantAgent>, CoreError> {
        let mut agents: Vec<TenantAgent> = self
            .agents
            .get(tenant_id)
            .map(|agents| {
                agents
                    .iter()
                    .filter(|a| status.is_none_or(|s| a.status == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(agents)
    }

    async fn list_tenants(&self, filter: &TenantFilter) -> Result<Vec<TenantSummary>, CoreError> {
        let mut tenants: Vec<TenantSummary> = self
            .tenants
            .iter()
            .filter(|t| filter.matches(t.value()))
            .map(|t| self.with_live_usage(t.value().clone()))
            .collect();
        tenants.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tenants
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }
}
