use core_lib::{
    CommandRepository,
    adapters::{
        PostgresAuditLogger, PostgresCommandRepository, RabbitMqEventBus, SqlOperationsExecutor,
        rabbitmq_event_bus::delivery_event_type,
    },
    services::{COMMAND_TOPIC, CommandProcessor, CommandStore},
};
use dotenvy::dotenv;
use futures_util::StreamExt;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod delivery;

use config::WorkerConfig;
use delivery::{Disposition, log_outcome, settle};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CONSUMER_TAG: &str = "command_worker";
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    });
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Command Worker v{}...", env!("CARGO_PKG_VERSION"));
    let config = WorkerConfig::from_env()?;

    // The gateway owns the schema; the worker only connects.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established.");

    let bus = Arc::new(RabbitMqEventBus::new(&config.rabbitmq_url, &config.exchange).await?);
    info!("Connected to RabbitMQ.");

    let commands: Arc<dyn CommandRepository> =
        Arc::new(PostgresCommandRepository::new(pool.clone()));
    let store = CommandStore::new(
        commands.clone(),
        Arc::new(PostgresAuditLogger::new(pool.clone())),
        bus.clone(),
    );
    let executor = Arc::new(SqlOperationsExecutor::new(Some(pool), commands));
    let processor = CommandProcessor::new(store, executor);

    let mut consumer = bus
        .consume(&config.queue, COMMAND_TOPIC, CONSUMER_TAG, config.prefetch)
        .await?;
    info!(
        queue = %config.queue,
        routing_key = COMMAND_TOPIC,
        "Command Worker started. Listening for command notifications..."
    );

    loop {
        tokio::select! {
            maybe_delivery = consumer.next() => {
                let Some(delivery_result) = maybe_delivery else {
                    warn!("Command consumer stream ended.");
                    break;
                };
                let delivery = match delivery_result {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        error!("Error receiving command delivery: {}", e);
                        tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                        continue;
                    }
                };

                debug!(
                    event_type = delivery_event_type(&delivery).as_deref().unwrap_or("-"),
                    redelivered = delivery.redelivered,
                    "Received command notification"
                );
                let result = processor.handle_payload(&delivery.data).await;
                log_outcome(&result);
                settle(&delivery, Disposition::for_result(&result, delivery.redelivered)).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("Command Worker stopped.");
    Ok(())
}
