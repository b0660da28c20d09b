use core_lib::CoreError;
use serde::Serialize;
use std::collections::BTreeSet;

pub const INTERNAL_ADMIN: &str = "INTERNAL_ADMIN";
pub const INTERNAL_SUPPORT: &str = "INTERNAL_SUPPORT";
pub const TENANT_ADMIN: &str = "TENANT_ADMIN";

const TENANT_ACCESS_DENIED: &str = "Forbidden: tenant access denied";

/// Identity of the caller, resolved once per request from token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub groups: BTreeSet<String>,
    pub tenant_id: Option<String>,
    pub is_internal: bool,
}

impl AuthContext {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        groups: BTreeSet<String>,
        tenant_id: Option<String>,
    ) -> Self {
        let is_internal = groups.contains(INTERNAL_ADMIN) || groups.contains(INTERNAL_SUPPORT);
        Self {
            user_id: user_id.into(),
            email: email.into(),
            groups,
            tenant_id,
            is_internal,
        }
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

/// Passes for platform operators. With `admin_only`, only `INTERNAL_ADMIN` passes.
pub fn require_internal(ctx: &AuthContext, admin_only: bool) -> Result<(), CoreError> {
    if !ctx.is_internal {
        return Err(CoreError::Forbidden("Internal access required".into()));
    }
    if admin_only && !ctx.has_group(INTERNAL_ADMIN) {
        return Err(CoreError::Forbidden("Admin access required".into()));
    }
    Ok(())
}

/// Tenant isolation boundary: internal users reach every tenant, everyone
/// else only their own.
pub fn require_tenant_access(ctx: &AuthContext, tenant_id: &str) -> Result<(), CoreError> {
    if ctx.is_internal {
        return Ok(());
    }
    match ctx.tenant_id.as_deref() {
        Some(own) if own == tenant_id => Ok(()),
        _ => Err(CoreError::Forbidden(TENANT_ACCESS_DENIED.into())),
    }
}

/// Gate for tenant-side mutations. Plain tenant members are read-only.
pub fn require_tenant_write(ctx: &AuthContext) -> Result<(), CoreError> {
    if ctx.is_internal || ctx.has_group(TENANT_ADMIN) {
        Ok(())
    } else {
        Err(CoreError::Forbidden("Tenant write access required".into()))
    }
}

/// Picks the tenant a tenant-scoped request targets and checks access to it.
///
/// An explicit `requested` tenant wins, falling back to the caller's own
/// tenant. Tenant users asking for anyone else's tenant are refused.
pub fn resolve_tenant_scope(
    ctx: &AuthContext,
    requested: Option<&str>,
) -> Result<String, CoreError> {
    let tenant_id = requested
        .filter(|t| !t.trim().is_empty())
        .or(ctx.tenant_id.as_deref())
        .ok_or_else(|| CoreError::Validation("Tenant ID is required".into()))?;
    require_tenant_access(ctx, tenant_id)?;
    Ok(tenant_id.to_string())
}

/// Error for a tenant resource that does not exist. Non-internal callers get
/// the same answer as for a foreign tenant, so absence is not observable.
pub fn missing_tenant_resource(ctx: &AuthContext, what: &str) -> CoreError {
    if ctx.is_internal {
        CoreError::NotFound(format!("{} not found", what))
    } else {
        CoreError::Forbidden(TENANT_ACCESS_DENIED.into())
    }
}
