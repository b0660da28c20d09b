use crate::adapters::in_memory_event_bus::InMemoryMessage;
use crate::domain::audit::{AuditEvent, AuditStatus, COMMAND_COMPLETED, COMMAND_FAILED};
use crate::domain::command::{CommandStatus, OperationalCommand};
use crate::services::command_store::{CommandStore, RESOURCE_TYPE};
use crate::{CommandExecutor, CoreError};
use prost::Message;
use proto::command::CommandChanged;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// What happened to one change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Succeeded(OperationalCommand),
    Failed(OperationalCommand),
    /// Not PENDING, already claimed elsewhere, or no longer present.
    Skipped { command_id: String, reason: String },
}

/// Drives commands from PENDING to a terminal state.
///
/// Delivery is at-least-once: the conditional PENDING -> RUNNING write is what
/// guarantees each command executes at most once.
#[derive(Clone)]
pub struct CommandProcessor {
    store: CommandStore,
    executor: Arc<dyn CommandExecutor>,
}

impl CommandProcessor {
    pub fn new(store: CommandStore, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { store, executor }
    }

    /// Handles one encoded `CommandChanged` payload.
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<ProcessOutcome, CoreError> {
        let notification = CommandChanged::decode(payload)
            .map_err(|e| CoreError::Deserialization(format!("CommandChanged: {}", e)))?;
        self.handle_notification(&notification).await
    }

    pub async fn handle_notification(
        &self,
        notification: &CommandChanged,
    ) -> Result<ProcessOutcome, CoreError> {
        let command_id = notification.command_id.as_str();

        // Status changes made by this processor come back around; only PENDING is work.
        let current = match self.store.get(command_id).await {
            Ok(cmd) => cmd,
            Err(CoreError::NotFound(_)) => return Ok(skipped(command_id, "command not found")),
            Err(e) => return Err(e),
        };
        if current.status != CommandStatus::Pending {
            return Ok(skipped(command_id, &format!("status is {}", current.status)));
        }

        let running = match self.store.transition_to_running(command_id).await {
            Ok(cmd) => cmd,
            Err(CoreError::AlreadyProcessing(_)) => {
                debug!(command_id, "Command claimed by another consumer");
                return Ok(skipped(command_id, "already processing"));
            }
            Err(e) => return Err(e),
        };
        info!(
            command_id,
            command_type = %running.command_type,
            "Processing operational command"
        );

        // The outcome is audited even when the terminal write itself fails.
        match self.executor.execute(&running).await {
            Ok(output) => match self.store.complete(command_id, output).await {
                Ok(done) => {
                    self.audit_outcome(&done, COMMAND_COMPLETED, AuditStatus::Success, None)
                        .await;
                    info!(command_id, "Command executed successfully");
                    Ok(ProcessOutcome::Succeeded(done))
                }
                Err(e) => {
                    error!(command_id, "Failed to record command success: {}", e);
                    self.audit_outcome(&running, COMMAND_COMPLETED, AuditStatus::Failure, Some(&e))
                        .await;
                    Err(e)
                }
            },
            Err(e) => {
                error!(command_id, "Command execution failed: {}", e);
                let message = e.public_message();
                match self.store.fail(command_id, message.clone()).await {
                    Ok(failed) => {
                        self.audit_outcome(&failed, COMMAND_FAILED, AuditStatus::Failure, None)
                            .await;
                        Ok(ProcessOutcome::Failed(failed))
                    }
                    Err(write_error) => {
                        error!(command_id, "Failed to record command failure: {}", write_error);
                        let mut unrecorded = running;
                        unrecorded.error_message = Some(message);
                        self.audit_outcome(
                            &unrecorded,
                            COMMAND_FAILED,
                            AuditStatus::Failure,
                            Some(&write_error),
                        )
                        .await;
                        Err(write_error)
                    }
                }
            }
        }
    }

    /// Consumes the in-memory bus until every sender is gone. Errors are logged
    /// per message and never stop the loop.
    pub async fn run(&self, receiver: broadcast::Receiver<InMemoryMessage>) {
        let mut stream = BroadcastStream::new(receiver);
        info!("Command processor listening for notifications");
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => {
                    if let Err(e) = self.handle_payload(&message.payload).await {
                        error!(event_type = %message.event_type, "Failed to process notification: {}", e);
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    warn!(missed, "Command processor lagged behind; notifications dropped");
                }
            }
        }
        info!("Command processor stopped: notification channel closed");
    }

    /// `write_error` is set when the terminal status could not be persisted.
    async fn audit_outcome(
        &self,
        command: &OperationalCommand,
        event_type: &str,
        status: AuditStatus,
        write_error: Option<&CoreError>,
    ) {
        let mut details = json!({
            "command_type": command.command_type,
            "error_message": command.error_message,
        });
        if let Some(e) = write_error {
            details["write_error"] = json!(e.kind());
        }
        self.store
            .audit(AuditEvent {
                event_type: event_type.to_string(),
                tenant_id: command.tenant_id.clone(),
                user_id: command.created_by.clone(),
                resource_type: RESOURCE_TYPE.to_string(),
                resource_id: command.command_id.clone(),
                action: format!("EXECUTE_{}", command.command_type),
                status,
                details,
            })
            .await;
    }
}

fn skipped(command_id: &str, reason: &str) -> ProcessOutcome {
    debug!(command_id, reason, "Skipping notification");
    ProcessOutcome::Skipped {
        command_id: command_id.to_string(),
        reason: reason.to_string(),
    }
}
