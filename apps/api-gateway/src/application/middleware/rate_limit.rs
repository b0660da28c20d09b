use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use core_lib::{CoreError, services::RateLimiter};
use std::{convert::Infallible, net::SocketAddr, time::Duration};

/// Length of every rate-limit window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Requests per window, per client address and per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub ip_per_minute: u64,
    pub tenant_per_minute: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            ip_per_minute: 100,
            tenant_per_minute: 100,
        }
    }
}

/// Address of the calling client: the first `X-Forwarded-For` hop when behind
/// a proxy, otherwise the peer address of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    fn from_parts(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let ip = match (forwarded, peer) {
            (Some(hop), _) => hop.to_string(),
            (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
            (None, None) => "unknown".to_string(),
        };
        ClientIp(ip)
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp::from_parts(
            &parts.headers,
            parts.extensions.get::<ConnectInfo<SocketAddr>>(),
        ))
    }
}

/// Counts the request against the caller's address.
pub async fn check_ip(limiter: &RateLimiter, limits: RateLimits, ip: &ClientIp) -> Result<(), CoreError> {
    if limiter
        .admit(&format!("ip:{}", ip.0), limits.ip_per_minute, WINDOW)
        .await
    {
        return Err(CoreError::RateLimited("Too many requests from this IP".into()));
    }
    Ok(())
}

/// Counts the request against the tenant it targets.
pub async fn check_tenant(
    limiter: &RateLimiter,
    limits: RateLimits,
    tenant_id: &str,
) -> Result<(), CoreError> {
    if limiter
        .admit(&format!("tenant:{}", tenant_id), limits.tenant_per_minute, WINDOW)
        .await
    {
        return Err(CoreError::RateLimited("Too many requests for this tenant".into()));
    }
    Ok(())
}
