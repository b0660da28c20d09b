use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COMMAND_CREATED: &str = "command_created";
pub const COMMAND_COMPLETED: &str = "command_completed";
pub const COMMAND_FAILED: &str = "command_failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
        }
    }
}

/// A security or operational event handed to the audit sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,
    pub tenant_id: Option<String>,
    pub user_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub status: AuditStatus,
    pub details: Value,
}
