use crate::domain::audit::{AuditEvent, AuditStatus, COMMAND_CREATED};
use crate::domain::command::{
    CommandListFilter, CommandPage, CommandParameters, CommandStatus, CommandType, CommandUpdate,
    OperationalCommand,
};
use crate::{AuditLogger, CommandRepository, CoreError, EventPublisher};
use chrono::Utc;
use prost::Message;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Topic carrying a `CommandChanged` notification after every persisted write.
pub const COMMAND_TOPIC: &str = "command.changed";

pub(crate) const RESOURCE_TYPE: &str = "operational_command";

/// Durable record of operational commands and their lifecycle.
///
/// Every transition is a conditional write keyed on the expected current
/// status, so concurrent or redelivered work can never move a record twice.
#[derive(Clone)]
pub struct CommandStore {
    repository: Arc<dyn CommandRepository>,
    audit: Arc<dyn AuditLogger>,
    publisher: Arc<dyn EventPublisher>,
}

impl CommandStore {
    pub fn new(
        repository: Arc<dyn CommandRepository>,
        audit: Arc<dyn AuditLogger>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            audit,
            publisher,
        }
    }

    /// Validates and persists a new PENDING command, then notifies consumers.
    pub async fn create(
        &self,
        command_type: CommandType,
        tenant_id: Option<String>,
        parameters: &Value,
        created_by: &str,
    ) -> Result<OperationalCommand, CoreError> {
        let params = CommandParameters::parse(command_type, parameters)?;
        let tenant_id = tenant_id.filter(|t| !t.trim().is_empty());
        if command_type.requires_tenant() && tenant_id.is_none() {
            return Err(CoreError::Validation(format!(
                "tenant_id is required for {}",
                command_type
            )));
        }

        let command = OperationalCommand::new(tenant_id, &params, created_by, Utc::now());
        self.repository.insert(&command).await?;
        info!(
            command_id = %command.command_id,
            command_type = %command.command_type,
            tenant_id = command.tenant_id.as_deref().unwrap_or("-"),
            created_by,
            "Operational command created"
        );

        self.audit(AuditEvent {
            event_type: COMMAND_CREATED.to_string(),
            tenant_id: command.tenant_id.clone(),
            user_id: created_by.to_string(),
            resource_type: RESOURCE_TYPE.to_string(),
            resource_id: command.command_id.clone(),
            action: format!("CREATE_{}", command.command_type),
            status: AuditStatus::Success,
            details: json!({
                "command_type": command.command_type,
                "parameters": command.parameters,
            }),
        })
        .await;
        self.notify(&command, proto::command::COMMAND_CREATED).await;
        Ok(command)
    }

    pub async fn get(&self, command_id: &str) -> Result<OperationalCommand, CoreError> {
        self.repository
            .get(command_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("command {}", command_id)))
    }

    /// PENDING -> RUNNING. Fails with `AlreadyProcessing` when another consumer
    /// won the race or the record has already left PENDING.
    pub async fn transition_to_running(
        &self,
        command_id: &str,
    ) -> Result<OperationalCommand, CoreError> {
        let update = CommandUpdate::Start {
            started_at: Utc::now(),
        };
        match self
            .repository
            .conditional_update(command_id, CommandStatus::Pending, update)
            .await?
        {
            Some(updated) => {
                self.notify(&updated, proto::command::COMMAND_STATUS_CHANGED)
                    .await;
                Ok(updated)
            }
            None => {
                // Distinguish a missing record from one already claimed.
                self.get(command_id).await?;
                Err(CoreError::AlreadyProcessing(command_id.to_string()))
            }
        }
    }

    /// RUNNING -> SUCCESS with the executor's output.
    pub async fn complete(
        &self,
        command_id: &str,
        output: Value,
    ) -> Result<OperationalCommand, CoreError> {
        self.finish(
            command_id,
            CommandUpdate::Complete {
                completed_at: Utc::now(),
                output,
            },
        )
        .await
    }

    /// RUNNING -> ERROR with a message already fit for persistence.
    pub async fn fail(
        &self,
        command_id: &str,
        error_message: String,
    ) -> Result<OperationalCommand, CoreError> {
        self.finish(
            command_id,
            CommandUpdate::Fail {
                completed_at: Utc::now(),
                error_message,
            },
        )
        .await
    }

    async fn finish(
        &self,
        command_id: &str,
        update: CommandUpdate,
    ) -> Result<OperationalCommand, CoreError> {
        let target = update.target_status();
        match self
            .repository
            .conditional_update(command_id, CommandStatus::Running, update)
            .await?
        {
            Some(updated) => {
                self.notify(&updated, proto::command::COMMAND_STATUS_CHANGED)
                    .await;
                Ok(updated)
            }
            None => {
                let current = self.get(command_id).await?;
                Err(CoreError::InvalidStateTransition {
                    from: current.status,
                    to: target,
                })
            }
        }
    }

    /// Lists commands newest first. Every filter is applied by the
    /// repository before pagination, so `total` counts all matches.
    pub async fn list(&self, filter: CommandListFilter) -> Result<CommandPage, CoreError> {
        let filter = filter.normalized();
        if filter.is_unfiltered() {
            warn!("Listing commands without status or tenant filter: full scan");
        }

        let page = self.repository.query(&filter).await?;
        debug!(
            total = page.total,
            offset = filter.offset,
            limit = filter.limit,
            "Commands listed"
        );
        Ok(page)
    }

    pub(crate) async fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            warn!("Failed to record audit event: {}", e);
        }
    }

    async fn notify(&self, command: &OperationalCommand, event_type: &str) {
        let payload = command.to_notification().encode_to_vec();
        if let Err(e) = self
            .publisher
            .publish(COMMAND_TOPIC, event_type, &payload)
            .await
        {
            warn!(
                command_id = %command.command_id,
                "Failed to publish command change notification: {}", e
            );
        }
    }
}
