use async_trait::async_trait;
use std::{error::Error as StdError, time::Duration};

// Declare modules
pub mod adapters;
pub mod domain;
pub mod services;

use domain::audit::AuditEvent;
use domain::command::{
    CommandListFilter, CommandPage, CommandStatus, CommandUpdate, ExecutionError,
    OperationalCommand,
};
use domain::tenant::{TenantAgent, TenantFilter, TenantSummary};

// Common error type for the core library
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Command {0} is already being processed")]
    AlreadyProcessing(String),
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: CommandStatus,
        to: CommandStatus,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] Box<dyn StdError + Send + Sync>),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable kind, used in error envelopes and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Unauthenticated(_) => "Unauthenticated",
            CoreError::Forbidden(_) => "Forbidden",
            CoreError::Validation(_) => "ValidationFailed",
            CoreError::NotFound(_) => "NotFound",
            CoreError::RateLimited(_) => "RateLimited",
            CoreError::AlreadyProcessing(_) => "AlreadyProcessing",
            CoreError::InvalidStateTransition { .. } => "InvalidStateTransition",
            CoreError::Serialization(_)
            | CoreError::Deserialization(_)
            | CoreError::Infrastructure(_)
            | CoreError::Configuration(_)
            | CoreError::Internal(_) => "Internal",
        }
    }

    pub(crate) fn infra<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        CoreError::Infrastructure(Box::new(err))
    }
}

// Port for publishing events to a message bus
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError>;
}

// Port for the key-value backend behind the cache manager
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>)
        -> Result<(), CoreError>;
    async fn delete(&self, key: &str) -> Result<(), CoreError>;

    async fn exists(&self, key: &str) -> Result<bool, CoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Removes every entry whose key starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CoreError>;

    /// Removes every entry owned by this cache.
    async fn clear(&self) -> Result<(), CoreError>;
}

// Port for the fixed-window counter store behind the rate limiter
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increments the counter for `key`, starting a fresh window of
    /// length `window` when none exists or the previous one has elapsed.
    /// Returns the count after the increment.
    async fn increment_with_expiry(&self, key: &str, window: Duration) -> Result<u64, CoreError>;

    async fn reset(&self, key: &str) -> Result<(), CoreError>;

    async fn clear(&self) -> Result<(), CoreError>;
}

// Port for durable storage of operational commands
#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn insert(&self, command: &OperationalCommand) -> Result<(), CoreError>;

    async fn get(&self, command_id: &str) -> Result<Option<OperationalCommand>, CoreError>;

    /// Applies `update` only if the stored status equals `expected`, as a single
    /// atomic operation. Returns the updated record, or `None` when the record is
    /// missing or its status did not match.
    async fn conditional_update(
        &self,
        command_id: &str,
        expected: CommandStatus,
        update: CommandUpdate,
    ) -> Result<Option<OperationalCommand>, CoreError>;

    /// Records matching every filter in `filter`, newest first, with `offset`
    /// and `limit` applied by the backend. `total` counts all matches before
    /// pagination.
    async fn query(&self, filter: &CommandListFilter) -> Result<CommandPage, CoreError>;
}

// Port for the append-only audit sink
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), CoreError>;
}

// Port for the component that actually performs an operational command
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        command: &OperationalCommand,
    ) -> Result<serde_json::Value, ExecutionError>;
}

// Port for tenant-facing read queries (authoritative source behind the cache)
#[async_trait]
pub trait TenantReadModel: Send + Sync {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<TenantSummary>, CoreError>;

    /// Agents contracted by the tenant; `status` of `None` returns every agent.
    async fn list_tenant_agents(
        &self,
        tenant_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<TenantAgent>, CoreError>;

    async fn list_tenants(&self, filter: &TenantFilter) -> Result<Vec<TenantSummary>, CoreError>;
}
