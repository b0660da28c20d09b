pub mod cache_manager;
pub mod command_processor;
pub mod command_store;
pub mod rate_limiter;

pub use cache_manager::{cache_key, CacheManager, CacheMetrics, CacheTtl};
pub use command_processor::{CommandProcessor, ProcessOutcome};
pub use command_store::{CommandStore, COMMAND_TOPIC};
pub use rate_limiter::RateLimiter;
