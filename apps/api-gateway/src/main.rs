use api_gateway::{
    AppState,
    application::{config::GatewayConfig, middleware::TokenVerifier},
    create_app,
};
use core_lib::{
    AuditLogger, Cache, CommandRepository, EventPublisher, RateLimitStore, TenantReadModel,
    adapters::{
        InMemoryCache, InMemoryCommandRepository, InMemoryEventBus, InMemoryRateLimitStore,
        InMemoryTenantReadModel, MIGRATOR, PostgresAuditLogger, PostgresCommandRepository,
        PostgresTenantReadModel, RabbitMqEventBus, RedisCache, RedisRateLimitStore,
        SqlOperationsExecutor, TracingAuditLogger,
    },
    services::{COMMAND_TOPIC, CacheManager, CommandProcessor, CommandStore, RateLimiter},
};
use dotenvy::dotenv;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CACHE_CAPACITY: u64 = 10_000;
const CACHE_DEFAULT_TTL_SECONDS: u64 = 300;
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

fn init_tracing() -> Result<(), BoxError> {
    // RUST_LOG wins; LOG_LEVEL is the simple knob for deployments.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    });
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn connect_database(url: &str) -> Result<PgPool, BoxError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await?;
    info!("Connected to Postgres. Applying database migrations...");
    MIGRATOR.run(&pool).await?;
    info!("Migrations applied successfully.");
    Ok(pool)
}

/// Sweeps expired command records and idle rate-limit counters.
fn spawn_maintenance(
    postgres_commands: Option<PostgresCommandRepository>,
    memory_commands: Option<InMemoryCommandRepository>,
    memory_counters: Option<InMemoryRateLimitStore>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            interval.tick().await;
            if let Some(repo) = &postgres_commands {
                match repo.purge_expired().await {
                    Ok(purged) => debug!(purged, "Expired commands purged"),
                    Err(e) => warn!("Failed to purge expired commands: {}", e),
                }
            }
            if let Some(repo) = &memory_commands {
                let purged = repo.purge_expired();
                debug!(purged, "Expired commands purged");
            }
            if let Some(store) = &memory_counters {
                let purged = store.purge_expired();
                debug!(purged, "Expired rate-limit counters purged");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load environment (.env) if present
    dotenv().ok();
    init_tracing()?;
    info!("Starting API Gateway v{}...", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::from_env()?;

    let pg_pool = match &config.database_url {
        Some(url) => Some(connect_database(url).await?),
        None => {
            warn!("DATABASE_URL not set: commands, audit and tenants are held in memory");
            None
        }
    };

    // --- Dependency Injection Setup ---
    let mut postgres_commands = None;
    let mut memory_commands = None;
    let (commands, audit, tenants): (
        Arc<dyn CommandRepository>,
        Arc<dyn AuditLogger>,
        Arc<dyn TenantReadModel>,
    ) = match &pg_pool {
        Some(pool) => {
            let repo = PostgresCommandRepository::new(pool.clone());
            postgres_commands = Some(repo.clone());
            (
                Arc::new(repo),
                Arc::new(PostgresAuditLogger::new(pool.clone())),
                Arc::new(PostgresTenantReadModel::new(pool.clone())),
            )
        }
        None => {
            let repo = InMemoryCommandRepository::new();
            memory_commands = Some(repo.clone());
            (
                Arc::new(repo),
                Arc::new(TracingAuditLogger),
                Arc::new(InMemoryTenantReadModel::new()),
            )
        }
    };

    let mut memory_counters = None;
    let (cache_backend, rate_store): (Arc<dyn Cache>, Arc<dyn RateLimitStore>) =
        match &config.redis_url {
            Some(url) => (
                Arc::new(
                    RedisCache::new(url, &config.cache_key_prefix, CACHE_DEFAULT_TTL_SECONDS)
                        .await?,
                ),
                Arc::new(RedisRateLimitStore::new(url, &config.cache_key_prefix).await?),
            ),
            None => {
                warn!("REDIS_URL not set: cache and rate limits are local to this instance");
                let store = InMemoryRateLimitStore::new();
                memory_counters = Some(store.clone());
                (
                    Arc::new(InMemoryCache::new(CACHE_CAPACITY, CACHE_DEFAULT_TTL_SECONDS)),
                    Arc::new(store),
                )
            }
        };

    let publisher: Arc<dyn EventPublisher> = match &config.rabbitmq {
        Some(rabbit) => {
            info!(exchange = %rabbit.exchange, "Publishing command notifications to RabbitMQ");
            Arc::new(RabbitMqEventBus::new(&rabbit.url, &rabbit.exchange).await?)
        }
        None => {
            warn!("RABBITMQ_URL not set: commands are processed inside the gateway");
            let bus = InMemoryEventBus::default();
            let receiver = bus.subscribe(COMMAND_TOPIC);
            let processor_store =
                CommandStore::new(commands.clone(), audit.clone(), Arc::new(bus.clone()));
            let executor = Arc::new(SqlOperationsExecutor::new(pg_pool.clone(), commands.clone()));
            let processor = CommandProcessor::new(processor_store, executor);
            tokio::spawn(async move { processor.run(receiver).await });
            Arc::new(bus)
        }
    };

    spawn_maintenance(postgres_commands, memory_commands, memory_counters);

    let app_state = AppState {
        command_store: CommandStore::new(commands, audit, publisher),
        tenants,
        cache: CacheManager::new("gateway", cache_backend),
        rate_limiter: RateLimiter::new(rate_store),
        rate_limits: config.rate_limits,
        token_verifier: Arc::new(TokenVerifier::hs256(config.jwt_secret.as_bytes())),
    };

    let app = create_app(app_state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("API Gateway listening on {}", config.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("API Gateway stopped.");
    Ok(())
}
