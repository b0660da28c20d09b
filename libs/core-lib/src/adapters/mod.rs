pub mod audit_log;
pub mod in_memory_cache;
pub mod in_memory_command_repository;
pub mod in_memory_event_bus;
pub mod in_memory_rate_limit_store;
pub mod postgres_command_repository;
pub mod rabbitmq_event_bus;
pub mod redis_cache;
pub mod redis_rate_limit_store;
pub mod sql_operations_executor;
pub mod tenant_read_model;

pub use audit_log::{InMemoryAuditLogger, PostgresAuditLogger, TracingAuditLogger};
pub use in_memory_cache::InMemoryCache;
pub use in_memory_command_repository::InMemoryCommandRepository;
pub use in_memory_event_bus::{InMemoryEventBus, InMemoryMessage};
pub use in_memory_rate_limit_store::InMemoryRateLimitStore;
pub use postgres_command_repository::PostgresCommandRepository;
pub use rabbitmq_event_bus::RabbitMqEventBus;
pub use redis_cache::RedisCache;
pub use redis_rate_limit_store::RedisRateLimitStore;
pub use sql_operations_executor::SqlOperationsExecutor;
pub use tenant_read_model::{InMemoryTenantReadModel, PostgresTenantReadModel};

/// Schema for every Postgres-backed adapter.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
