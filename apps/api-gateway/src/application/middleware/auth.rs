use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use core_lib::CoreError;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::AppState;
use crate::application::ApiError;
use crate::application::authz::AuthContext;

/// Groups as the identity provider sends them: a comma-separated string or a
/// list, depending on the token flavour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum GroupsClaim {
    Joined(String),
    List(Vec<String>),
}

impl GroupsClaim {
    pub fn into_set(self) -> BTreeSet<String> {
        let raw = match self {
            GroupsClaim::Joined(joined) => joined.split(',').map(str::to_string).collect(),
            GroupsClaim::List(list) => list,
        };
        raw.into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect()
    }
}

/// Claims bundle carried by a verified bearer token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClaims {
    pub sub: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "cognito:username")]
    pub username: Option<String>,
    #[serde(rename = "cognito:groups", alias = "groups")]
    pub groups: Option<GroupsClaim>,
    #[serde(rename = "custom:tenant_id", alias = "tenant_id")]
    pub tenant_id: Option<String>,
}

/// Turns a claims bundle into the per-request `AuthContext`.
pub fn resolve(claims: &RawClaims) -> Result<AuthContext, CoreError> {
    let user_id = non_blank(claims.sub.as_deref())
        .ok_or_else(|| CoreError::Unauthenticated("User ID not found in token".into()))?;
    let email = non_blank(claims.email.as_deref())
        .or_else(|| non_blank(claims.username.as_deref()))
        .ok_or_else(|| CoreError::Unauthenticated("Email not found in token".into()))?;
    let groups = claims
        .groups
        .clone()
        .map(GroupsClaim::into_set)
        .unwrap_or_default();
    let tenant_id = non_blank(claims.tenant_id.as_deref()).map(str::to_string);

    Ok(AuthContext::new(user_id, email, groups, tenant_id))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Verifies HS256 bearer tokens issued for this platform.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn hs256(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // Identity-provider tokens carry a client-specific audience we do not pin.
        validation.validate_aud = false;
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<RawClaims, CoreError> {
        decode::<RawClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                CoreError::Unauthenticated("Invalid or expired token".into())
            })
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that authenticates the bearer token and stores the resolved
/// `AuthContext` in the request extensions.
pub async fn require_auth(
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(req.headers()) else {
        warn!("Authentication failed: missing or malformed Authorization header");
        return Err(CoreError::Unauthenticated(
            "Missing or invalid authentication token".into(),
        )
        .into());
    };

    let claims = app_state.token_verifier.verify(token)?;
    let ctx = resolve(&claims)?;
    debug!(
        user_id = %ctx.user_id,
        tenant_id = ctx.tenant_id.as_deref().unwrap_or("-"),
        groups = ?ctx.groups,
        "Request authenticated"
    );

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
