use core_lib::CoreError;
use std::net::SocketAddr;

use crate::application::middleware::RateLimits;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_EXCHANGE: &str = "ops_exchange";
const DEFAULT_CACHE_PREFIX: &str = "ops";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitMqConfig {
    pub url: String,
    pub exchange: String,
}

/// Gateway settings, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub rabbitmq: Option<RabbitMqConfig>,
    pub rate_limits: RateLimits,
    pub cache_key_prefix: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let listen_addr = var("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .map_err(|e| CoreError::Configuration(format!("LISTEN_ADDR: {}", e)))?;
        let jwt_secret = var("JWT_SECRET")
            .ok_or_else(|| CoreError::Configuration("JWT_SECRET must be set".into()))?;
        let rabbitmq = var("RABBITMQ_URL").map(|url| RabbitMqConfig {
            url,
            exchange: var("RABBITMQ_EXCHANGE_NAME").unwrap_or_else(|| DEFAULT_EXCHANGE.into()),
        });
        let defaults = RateLimits::default();

        Ok(Self {
            listen_addr,
            jwt_secret,
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            rabbitmq,
            rate_limits: RateLimits {
                ip_per_minute: parse_or(
                    var("RATE_LIMIT_IP_PER_MINUTE"),
                    "RATE_LIMIT_IP_PER_MINUTE",
                    defaults.ip_per_minute,
                )?,
                tenant_per_minute: parse_or(
                    var("RATE_LIMIT_TENANT_PER_MINUTE"),
                    "RATE_LIMIT_TENANT_PER_MINUTE",
                    defaults.tenant_per_minute,
                )?,
            },
            cache_key_prefix: var("CACHE_KEY_PREFIX").unwrap_or_else(|| DEFAULT_CACHE_PREFIX.into()),
        })
    }
}

fn parse_or(value: Option<String>, name: &str, default: u64) -> Result<u64, CoreError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| CoreError::Configuration(format!("{} must be a positive integer", name))),
        None => Ok(default),
    }
}
