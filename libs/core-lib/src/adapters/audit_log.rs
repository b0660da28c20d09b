use crate::domain::audit::AuditEvent;
use crate::{AuditLogger, CoreError};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Writes audit events as structured tracing events under the `audit` target,
/// so they can be routed to a dedicated sink by the subscriber.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn record(&self, event: AuditEvent) -> Result<(), CoreError> {
        info!(
            target: "audit",
            event_type = %event.event_type,
            tenant_id = event.tenant_id.as_deref().unwrap_or("-"),
            user_id = %event.user_id,
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            action = %event.action,
            status = event.status.as_str(),
            details = %event.details,
            "audit event"
        );
        Ok(())
    }
}

/// Appends audit events to the `operational_events` table.
#[derive(Debug, Clone)]
pub struct PostgresAuditLogger {
    pool: PgPool,
}

impl PostgresAuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogger for PostgresAuditLogger {
    async fn record(&self, event: AuditEvent) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO operational_events \
             (event_type, tenant_id, user_id, resource_type, resource_id, action, status, details) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&event.event_type)
        .bind(&event.tenant_id)
        .bind(&event.user_id)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(&event.action)
        .bind(event.status.as_str())
        .bind(&event.details)
        .execute(&self.pool)
        .await
        .map_err(CoreError::infra)?;
        Ok(())
    }
}

/// Keeps every recorded event in memory. Used by tests to assert on the trail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLogger {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

#[async_trait]
impl AuditLogger for InMemoryAuditLogger {
    async fn record(&self, event: AuditEvent) -> Result<(), CoreError> {
        self.events
            .lock()
            .map_err(|_| CoreError::Internal("audit buffer poisoned".into()))?
            .push(event);
        Ok(())
    }
}
