use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    response::IntoResponse,
};
use core_lib::{
    CoreError,
    domain::command::{CommandListFilter, CommandStatus, CommandType, OperationalCommand},
    services::{CacheTtl, cache_key},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::application::authz::{AuthContext, require_internal, require_tenant_access};
use crate::application::{ApiResult, cache_headers, filter_value, parse_count, read_through};

#[derive(Debug, Default, Deserialize)]
pub struct CommandListQuery {
    pub status: Option<String>,
    pub command_type: Option<String>,
    pub tenant_id: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl CommandListQuery {
    fn into_filter(self) -> Result<CommandListFilter, CoreError> {
        let status = filter_value(self.status.as_deref())
            .map(|s| s.to_ascii_uppercase().parse::<CommandStatus>())
            .transpose()?;
        let command_type = filter_value(self.command_type.as_deref())
            .map(str::parse::<CommandType>)
            .transpose()?;
        let tenant_id = self
            .tenant_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(CommandListFilter {
            status,
            command_type,
            tenant_id,
            limit: parse_count("limit", self.limit.as_deref())?.unwrap_or(0),
            offset: parse_count("offset", self.offset.as_deref())?.unwrap_or(0),
        }
        .normalized())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandListResponse {
    pub commands: Vec<OperationalCommand>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

// GET /internal/operations/commands
pub async fn handle_list_commands(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<CommandListQuery>,
) -> ApiResult<impl IntoResponse> {
    require_internal(&ctx, false)?;
    let filter = params.into_filter()?;
    if let Some(tenant_id) = &filter.tenant_id {
        require_tenant_access(&ctx, tenant_id)?;
    }

    let key = cache_key(
        "commands",
        "list",
        &[
            ("status", filter.status.map(|s| s.to_string())),
            ("command_type", filter.command_type.map(|t| t.to_string())),
            ("tenant_id", filter.tenant_id.clone()),
            ("limit", Some(filter.limit.to_string())),
            ("offset", Some(filter.offset.to_string())),
        ],
    );

    let store = app_state.command_store.clone();
    let (response, status) =
        read_through(&app_state.cache, &key, CacheTtl::COMMANDS_LIST, || async move {
            let (limit, offset) = (filter.limit, filter.offset);
            let page = store.list(filter).await?;
            Ok::<_, CoreError>(CommandListResponse {
                commands: page.commands,
                total: page.total,
                limit,
                offset,
            })
        })
        .await?;

    Ok((cache_headers(CacheTtl::COMMANDS_LIST, status), Json(response)))
}

// GET /internal/operations/commands/{command_id}
pub async fn handle_get_command(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(command_id): Path<String>,
) -> ApiResult<Json<OperationalCommand>> {
    require_internal(&ctx, false)?;
    let command = app_state.command_store.get(&command_id).await?;
    if let Some(tenant_id) = &command.tenant_id {
        require_tenant_access(&ctx, tenant_id)?;
    }
    Ok(Json(command))
}
