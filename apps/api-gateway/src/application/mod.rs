use axum::{
    Json,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use core_lib::{CoreError, services::CacheManager};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tracing::{error, warn};

pub mod authz;
pub mod commands;
pub mod config;
pub mod middleware;
pub mod query;

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Request-boundary error. Wraps the core taxonomy and renders it as an
/// `{ error, message }` envelope with the matching HTTP status.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct ApiError(#[from] pub CoreError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            CoreError::AlreadyProcessing(_) | CoreError::InvalidStateTransition { .. } => {
                StatusCode::CONFLICT
            }
            CoreError::Serialization(_)
            | CoreError::Deserialization(_)
            | CoreError::Infrastructure(_)
            | CoreError::Configuration(_)
            | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Server-side failures are logged, not echoed.
    fn public_message(&self) -> String {
        match &self.0 {
            CoreError::Unauthenticated(m)
            | CoreError::Forbidden(m)
            | CoreError::Validation(m)
            | CoreError::NotFound(m)
            | CoreError::RateLimited(m) => m.clone(),
            CoreError::AlreadyProcessing(_) | CoreError::InvalidStateTransition { .. } => {
                self.0.to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), "Request failed: {}", self.0);
        } else if status != StatusCode::NOT_FOUND {
            warn!(kind = self.0.kind(), status = status.as_u16(), "Request rejected: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Whether a cached read was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Cache-aside read through `cache`, reporting whether `fetch` had to run.
pub async fn read_through<T, F, Fut>(
    cache: &CacheManager,
    key: &str,
    ttl: Duration,
    fetch: F,
) -> Result<(T, CacheStatus), CoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let fetched = AtomicBool::new(false);
    let value = cache
        .get_or_set(key, ttl, || {
            fetched.store(true, Ordering::Relaxed);
            fetch()
        })
        .await?;
    let status = if fetched.load(Ordering::Relaxed) {
        CacheStatus::Miss
    } else {
        CacheStatus::Hit
    };
    Ok((value, status))
}

/// `Cache-Control` and `X-Cache-Status` headers for a cached response.
pub fn cache_headers(ttl: Duration, status: CacheStatus) -> [(HeaderName, String); 2] {
    [
        (
            header::CACHE_CONTROL,
            format!("private, max-age={}", ttl.as_secs()),
        ),
        (
            HeaderName::from_static("x-cache-status"),
            status.as_str().to_string(),
        ),
    ]
}

/// Parses an optional numeric query parameter.
pub fn parse_count(name: &str, raw: Option<&str>) -> Result<Option<usize>, CoreError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| CoreError::Validation(format!("{} must be a non-negative integer", name))),
        None => Ok(None),
    }
}

/// Treats an absent, empty or `all` filter as no filter.
pub fn filter_value(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

/// `filter_value` folded to lowercase, the form stored values use. Handlers
/// build both the query and its cache key from this one value.
pub fn lowercase_filter(raw: Option<&str>) -> Option<String> {
    filter_value(raw).map(str::to_ascii_lowercase)
}
