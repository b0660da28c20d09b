use crate::domain::command::{
    CommandListFilter, CommandPage, CommandStatus, CommandUpdate, OperationalCommand,
};
use crate::{CommandRepository, CoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

const COLUMNS: &str = "command_id, created_at, tenant_id, command_type, status, created_by, \
     parameters, started_at, completed_at, output, error_message, expires_at";

// Mirrors the operational_commands table
#[derive(sqlx::FromRow, Debug)]
struct CommandRow {
    command_id: String,
    created_at: DateTime<Utc>,
    tenant_id: Option<String>,
    command_type: String,
    status: String,
    created_by: String,
    parameters: Value,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    output: Option<Value>,
    error_message: Option<String>,
    expires_at: i64,
}

impl TryFrom<CommandRow> for OperationalCommand {
    type Error = CoreError;

    fn try_from(row: CommandRow) -> Result<Self, Self::Error> {
        let decode = |field: &str, e: CoreError| {
            CoreError::Deserialization(format!(
                "command {} has unreadable {}: {}",
                row.command_id, field, e
            ))
        };
        let command_type = row
            .command_type
            .parse()
            .map_err(|e| decode("command_type", e))?;
        let status = row.status.parse().map_err(|e| decode("status", e))?;
        Ok(OperationalCommand {
            command_id: row.command_id,
            created_at: row.created_at,
            tenant_id: row.tenant_id,
            command_type,
            status,
            created_by: row.created_by,
            parameters: row.parameters,
            started_at: row.started_at,
            completed_at: row.completed_at,
            output: row.output,
            error_message: row.error_message,
            expires_at: row.expires_at,
        })
    }
}

/// PostgreSQL implementation of the CommandRepository port using sqlx.
///
/// Postgres has no native TTL, so `expires_at` is enforced by `purge_expired`,
/// which the gateway runs on a maintenance interval.
#[derive(Debug, Clone)]
pub struct PostgresCommandRepository {
    pool: PgPool,
}

impl PostgresCommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn purge_expired(&self) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM operational_commands WHERE expires_at <= $1")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(CoreError::infra)?;
        info!(removed = result.rows_affected(), "Expired commands purged");
        Ok(result.rows_affected())
    }
}

/// Appends the WHERE clause for `filter`, binding each present field.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &CommandListFilter) {
    let mut separator = " WHERE ";
    if let Some(status) = filter.status {
        builder.push(separator).push("status = ").push_bind(status.as_str());
        separator = " AND ";
    }
    if let Some(command_type) = filter.command_type {
        builder
            .push(separator)
            .push("command_type = ")
            .push_bind(command_type.as_str());
        separator = " AND ";
    }
    if let Some(tenant_id) = &filter.tenant_id {
        builder
            .push(separator)
            .push("tenant_id = ")
            .push_bind(tenant_id.clone());
    }
}

#[async_trait]
impl CommandRepository for PostgresCommandRepository {
    async fn insert(&self, command: &OperationalCommand) -> Result<(), CoreError> {
        let query = format!(
            "INSERT INTO operational_commands ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        sqlx::query(&query)
            .bind(&command.command_id)
            .bind(command.created_at)
            .bind(&command.tenant_id)
            .bind(command.command_type.as_str())
            .bind(command.status.as_str())
            .bind(&command.created_by)
            .bind(&command.parameters)
            .bind(command.started_at)
            .bind(command.completed_at)
            .bind(&command.output)
            .bind(&command.error_message)
            .bind(command.expires_at)
            .execute(&self.pool)
            .await
            .map_err(CoreError::infra)?;
        Ok(())
    }

    async fn get(&self, command_id: &str) -> Result<Option<OperationalCommand>, CoreError> {
        let query = format!("SELECT {COLUMNS} FROM operational_commands WHERE command_id = $1");
        let row: Option<CommandRow> = sqlx::query_as(&query)
            .bind(command_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::infra)?;
        row.map(OperationalCommand::try_from).transpose()
    }

    async fn conditional_update(
        &self,
        command_id: &str,
        expected: CommandStatus,
        update: CommandUpdate,
    ) -> Result<Option<OperationalCommand>, CoreError> {
        if update.required_status() != expected {
            return Err(CoreError::InvalidStateTransition {
                from: expected,
                to: update.target_status(),
            });
        }

        // The status predicate in WHERE makes check-and-write a single atomic statement.
        let (assignments, timestamp) = match &update {
            CommandUpdate::Start { started_at } => ("started_at = $4", *started_at),
            CommandUpdate::Complete { completed_at, .. } => {
                ("completed_at = $4, output = $5", *completed_at)
            }
            CommandUpdate::Fail { completed_at, .. } => {
                ("completed_at = $4, error_message = $5", *completed_at)
            }
        };
        let query = format!(
            "UPDATE operational_commands SET status = $3, {assignments} \
             WHERE command_id = $1 AND status = $2 RETURNING {COLUMNS}"
        );

        let q = sqlx::query_as::<_, CommandRow>(&query)
            .bind(command_id)
            .bind(expected.as_str())
            .bind(update.target_status().as_str())
            .bind(timestamp);
        let q = match update {
            CommandUpdate::Start { .. } => q,
            CommandUpdate::Complete { output, .. } => q.bind(output),
            CommandUpdate::Fail { error_message, .. } => q.bind(error_message),
        };

        let row = q
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::infra)?;
        row.map(OperationalCommand::try_from).transpose()
    }

    async fn query(&self, filter: &CommandListFilter) -> Result<CommandPage, CoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM operational_commands");
        push_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(CoreError::infra)?;

        let mut page =
            QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM operational_commands"));
        push_filters(&mut page, filter);
        page.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);
        let rows: Vec<CommandRow> = page
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::infra)?;

        let commands = rows
            .into_iter()
            .map(OperationalCommand::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CommandPage {
            commands,
            total: total as usize,
        })
    }
}
