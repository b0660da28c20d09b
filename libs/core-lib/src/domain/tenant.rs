use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage ceilings granted by a subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_agents: u32,
    pub max_users: u32,
    pub max_requests_per_month: u64,
}

impl PlanLimits {
    /// Unknown plans fall back to the starter tier.
    pub fn for_plan(plan: &str) -> Self {
        match plan {
            "professional" => PlanLimits {
                max_agents: 10,
                max_users: 20,
                max_requests_per_month: 50_000,
            },
            "enterprise" => PlanLimits {
                max_agents: 50,
                max_users: 100,
                max_requests_per_month: 500_000,
            },
            _ => PlanLimits {
                max_agents: 3,
                max_users: 5,
                max_requests_per_month: 10_000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TenantUsage {
    pub active_agents: u32,
    pub active_users: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSummary {
    pub id: String,
    pub name: String,
    pub segment: String,
    pub plan: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub limits: PlanLimits,
    pub usage: TenantUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantAgent {
    pub id: String,
    pub name: String,
    pub segment: String,
    pub status: String,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Listing filter for the internal tenant directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TenantFilter {
    pub status: Option<String>,
    pub plan: Option<String>,
    pub search: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl TenantFilter {
    /// Whether `tenant` passes every filter except pagination.
    pub fn matches(&self, tenant: &TenantSummary) -> bool {
        if let Some(status) = &self.status {
            if &tenant.status != status {
                return false;
            }
        }
        if let Some(plan) = &self.plan {
            if &tenant.plan != plan {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !tenant
                .name
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}
