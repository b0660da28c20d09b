use crate::CoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Records become eligible for physical deletion this long after creation.
pub const RETENTION_DAYS: i64 = 90;

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

/// Longest error message persisted on a failed command.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

// --- Command type ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    ReprocessQueue,
    ResetToken,
    RestartAgent,
    HealthCheck,
}

impl CommandType {
    pub const ALL: [CommandType; 4] = [
        CommandType::ReprocessQueue,
        CommandType::ResetToken,
        CommandType::RestartAgent,
        CommandType::HealthCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::ReprocessQueue => "REPROCESS_QUEUE",
            CommandType::ResetToken => "RESET_TOKEN",
            CommandType::RestartAgent => "RESTART_AGENT",
            CommandType::HealthCheck => "HEALTH_CHECK",
        }
    }

    /// Whether the action operates on a specific tenant's resources.
    pub fn requires_tenant(&self) -> bool {
        matches!(self, CommandType::ResetToken | CommandType::RestartAgent)
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = CommandType::ALL.iter().map(|t| t.as_str()).collect();
                CoreError::Validation(format!(
                    "Invalid command_type. Must be one of: {}",
                    valid.join(", ")
                ))
            })
    }
}

// --- Status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Running => "RUNNING",
            CommandStatus::Success => "SUCCESS",
            CommandStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Success | CommandStatus::Error)
    }

    /// The only legal moves are PENDING -> RUNNING and RUNNING -> SUCCESS | ERROR.
    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (CommandStatus::Pending, CommandStatus::Running)
                | (CommandStatus::Running, CommandStatus::Success)
                | (CommandStatus::Running, CommandStatus::Error)
        )
    }

    pub fn to_proto(self) -> proto::command::Status {
        match self {
            CommandStatus::Pending => proto::command::Status::Pending,
            CommandStatus::Running => proto::command::Status::Running,
            CommandStatus::Success => proto::command::Status::Success,
            CommandStatus::Error => proto::command::Status::Error,
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(CommandStatus::Pending),
            "RUNNING" => Ok(CommandStatus::Running),
            "SUCCESS" => Ok(CommandStatus::Success),
            "ERROR" => Ok(CommandStatus::Error),
            other => Err(CoreError::Validation(format!(
                "Invalid status '{}'. Must be one of: PENDING, RUNNING, SUCCESS, ERROR",
                other
            ))),
        }
    }
}

// --- Parameters ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReprocessQueueParams {
    pub queue_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetTokenParams {
    pub integration_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestartAgentParams {
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckParams {}

/// Typed parameters, one schema per command type.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandParameters {
    ReprocessQueue(ReprocessQueueParams),
    ResetToken(ResetTokenParams),
    RestartAgent(RestartAgentParams),
    HealthCheck(HealthCheckParams),
}

impl CommandParameters {
    /// Validates raw JSON against the schema registered for `command_type`.
    pub fn parse(command_type: CommandType, raw: &Value) -> Result<Self, CoreError> {
        if !raw.is_object() {
            return Err(CoreError::Validation(
                "parameters must be an object".into(),
            ));
        }
        let invalid = |e: serde_json::Error| {
            CoreError::Validation(format!("Invalid parameters for {}: {}", command_type, e))
        };
        let params = match command_type {
            CommandType::ReprocessQueue => {
                let p: ReprocessQueueParams =
                    serde_json::from_value(raw.clone()).map_err(invalid)?;
                require_non_empty("queue_name", &p.queue_name)?;
                CommandParameters::ReprocessQueue(p)
            }
            CommandType::ResetToken => {
                let p: ResetTokenParams = serde_json::from_value(raw.clone()).map_err(invalid)?;
                require_non_empty("integration_id", &p.integration_id)?;
                CommandParameters::ResetToken(p)
            }
            CommandType::RestartAgent => {
                let p: RestartAgentParams =
                    serde_json::from_value(raw.clone()).map_err(invalid)?;
                require_non_empty("agent_id", &p.agent_id)?;
                CommandParameters::RestartAgent(p)
            }
            CommandType::HealthCheck => {
                let p: HealthCheckParams = serde_json::from_value(raw.clone()).map_err(invalid)?;
                CommandParameters::HealthCheck(p)
            }
        };
        Ok(params)
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            CommandParameters::ReprocessQueue(_) => CommandType::ReprocessQueue,
            CommandParameters::ResetToken(_) => CommandType::ResetToken,
            CommandParameters::RestartAgent(_) => CommandType::RestartAgent,
            CommandParameters::HealthCheck(_) => CommandType::HealthCheck,
        }
    }

    pub fn to_value(&self) -> Value {
        let value = match self {
            CommandParameters::ReprocessQueue(p) => serde_json::to_value(p),
            CommandParameters::ResetToken(p) => serde_json::to_value(p),
            CommandParameters::RestartAgent(p) => serde_json::to_value(p),
            CommandParameters::HealthCheck(p) => serde_json::to_value(p),
        };
        // Plain structs of strings and integers always serialize.
        value.unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

// --- Record ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalCommand {
    pub command_id: String,
    pub created_at: DateTime<Utc>,
    pub tenant_id: Option<String>,
    pub command_type: CommandType,
    pub status: CommandStatus,
    pub created_by: String,
    pub parameters: Value,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error_message: Option<String>,
    /// Epoch seconds after which the record may be physically deleted.
    pub expires_at: i64,
}

impl OperationalCommand {
    /// Builds a fresh PENDING record from already-validated parameters.
    pub fn new(
        tenant_id: Option<String>,
        parameters: &CommandParameters,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            command_id: Uuid::new_v4().to_string(),
            created_at: now,
            tenant_id,
            command_type: parameters.command_type(),
            status: CommandStatus::Pending,
            created_by: created_by.to_string(),
            parameters: parameters.to_value(),
            started_at: None,
            completed_at: None,
            output: None,
            error_message: None,
            expires_at: (now + Duration::days(RETENTION_DAYS)).timestamp(),
        }
    }

    /// Applies a lifecycle update, refusing anything but a legal forward move.
    pub fn apply(&mut self, update: &CommandUpdate) -> Result<(), CoreError> {
        let next = update.target_status();
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        match update {
            CommandUpdate::Start { started_at } => {
                self.started_at = Some(*started_at);
            }
            CommandUpdate::Complete {
                completed_at,
                output,
            } => {
                self.completed_at = Some(*completed_at);
                self.output = Some(output.clone());
            }
            CommandUpdate::Fail {
                completed_at,
                error_message,
            } => {
                self.completed_at = Some(*completed_at);
                self.error_message = Some(error_message.clone());
            }
        }
        self.status = next;
        Ok(())
    }

    pub fn typed_parameters(&self) -> Result<CommandParameters, CoreError> {
        CommandParameters::parse(self.command_type, &self.parameters)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }

    pub fn to_notification(&self) -> proto::command::CommandChanged {
        proto::command::CommandChanged {
            command_id: self.command_id.clone(),
            status: self.status.to_proto() as i32,
            tenant_id: self.tenant_id.clone(),
            command_type: self.command_type.as_str().to_string(),
            changed_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A single lifecycle transition with the fields it writes.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandUpdate {
    Start {
        started_at: DateTime<Utc>,
    },
    Complete {
        completed_at: DateTime<Utc>,
        output: Value,
    },
    Fail {
        completed_at: DateTime<Utc>,
        error_message: String,
    },
}

impl CommandUpdate {
    pub fn target_status(&self) -> CommandStatus {
        match self {
            CommandUpdate::Start { .. } => CommandStatus::Running,
            CommandUpdate::Complete { .. } => CommandStatus::Success,
            CommandUpdate::Fail { .. } => CommandStatus::Error,
        }
    }

    /// Status the record must currently hold for this update to apply.
    pub fn required_status(&self) -> CommandStatus {
        match self {
            CommandUpdate::Start { .. } => CommandStatus::Pending,
            CommandUpdate::Complete { .. } | CommandUpdate::Fail { .. } => CommandStatus::Running,
        }
    }
}

// --- Listing ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandListFilter {
    pub status: Option<CommandStatus>,
    pub command_type: Option<CommandType>,
    pub tenant_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl CommandListFilter {
    /// Clamps `limit` into `1..=MAX_LIST_LIMIT`, zero meaning the default.
    pub fn normalized(mut self) -> Self {
        if self.limit == 0 {
            self.limit = DEFAULT_LIST_LIMIT;
        }
        if self.limit > MAX_LIST_LIMIT {
            self.limit = MAX_LIST_LIMIT;
        }
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.status.is_none() && self.tenant_id.is_none()
    }

    pub fn matches(&self, command: &OperationalCommand) -> bool {
        self.status.is_none_or(|s| command.status == s)
            && self.command_type.is_none_or(|t| command.command_type == t)
            && self
                .tenant_id
                .as_deref()
                .is_none_or(|t| command.tenant_id.as_deref() == Some(t))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandPage {
    pub commands: Vec<OperationalCommand>,
    pub total: usize,
}

// --- Execution errors ---

/// Failure reported by a command executor.
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("{0}")]
    InvalidParameters(String),
    #[error("{0}")]
    TargetNotFound(String),
    #[error("dependency unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

impl ExecutionError {
    /// Message safe to persist on the command record: infrastructure details are
    /// dropped and the text is bounded.
    pub fn public_message(&self) -> String {
        let message = match self {
            ExecutionError::Unavailable(_) => {
                "A required dependency was unavailable while executing the command".to_string()
            }
            other => other.to_string(),
        };
        truncate_chars(&message, MAX_ERROR_MESSAGE_LEN)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
