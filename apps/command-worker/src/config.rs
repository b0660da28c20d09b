use core_lib::CoreError;

const DEFAULT_EXCHANGE: &str = "ops_exchange";
const DEFAULT_QUEUE: &str = "command_worker_queue";
const DEFAULT_PREFETCH: u16 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_url: String,
    pub rabbitmq_url: String,
    pub exchange: String,
    pub queue: String,
    pub prefetch: u16,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            var(name).ok_or_else(|| CoreError::Configuration(format!("{} must be set", name)))
        };

        let prefetch = match var("COMMAND_WORKER_PREFETCH") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                CoreError::Configuration("COMMAND_WORKER_PREFETCH must be a positive integer".into())
            })?,
            None => DEFAULT_PREFETCH,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            rabbitmq_url: required("RABBITMQ_URL")?,
            exchange: var("RABBITMQ_EXCHANGE_NAME").unwrap_or_else(|| DEFAULT_EXCHANGE.into()),
            queue: var("COMMAND_QUEUE_NAME").unwrap_or_else(|| DEFAULT_QUEUE.into()),
            prefetch,
        })
    }
}
