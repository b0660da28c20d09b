use axum::{
    Json,
    extract::{Extension, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use core_lib::{
    CoreError,
    domain::command::{CommandStatus, CommandType},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::COMMAND_LIST_CACHE_PREFIX;
use crate::AppState;
use crate::application::ApiResult;
use crate::application::authz::{AuthContext, require_internal};

#[derive(Debug, Deserialize)]
pub struct CreateCommandRequest {
    pub command_type: Option<String>,
    pub tenant_id: Option<String>,
    pub parameters: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCommandResponse {
    pub command_id: String,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

// POST /internal/operations/commands
pub async fn handle_create_command(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    payload: Result<Json<CreateCommandRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    require_internal(&ctx, true)?;

    let Json(request) = payload.map_err(|e| CoreError::Validation(e.body_text()))?;
    let command_type: CommandType = request.command_type.as_deref().unwrap_or_default().parse()?;
    let parameters = request
        .parameters
        .ok_or_else(|| CoreError::Validation("parameters must be an object".into()))?;

    let command = app_state
        .command_store
        .create(command_type, request.tenant_id, &parameters, &ctx.user_id)
        .await?;
    app_state.cache.invalidate_prefix(COMMAND_LIST_CACHE_PREFIX).await;

    info!(
        command_id = %command.command_id,
        command_type = %command.command_type,
        user_id = %ctx.user_id,
        "Command accepted"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateCommandResponse {
            command_id: command.command_id,
            status: command.status,
            created_at: command.created_at,
            message: "Command created. Processing has started.".into(),
        }),
    ))
}
