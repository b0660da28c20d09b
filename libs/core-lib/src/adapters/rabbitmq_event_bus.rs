use crate::{CoreError, EventPublisher};
use async_trait::async_trait;
use lapin::{
    message::Delivery,
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
};
use std::sync::Arc;
use tracing::info;

/// RabbitMQ implementation of the EventPublisher port using lapin.
///
/// Publishes to a durable topic exchange with the topic as routing key and the
/// event type in the AMQP `type` property.
#[derive(Clone)]
pub struct RabbitMqEventBus {
    connection: Arc<Connection>,
    publish_channel: Arc<Channel>,
    exchange_name: String,
}

impl RabbitMqEventBus {
    pub async fn new(amqp_addr: &str, exchange_name: &str) -> Result<Self, CoreError> {
        let connection = Connection::connect(amqp_addr, ConnectionProperties::default())
            .await
            .map_err(CoreError::infra)?;
        info!("RabbitMQ connected.");

        let publish_channel = connection
            .create_channel()
            .await
            .map_err(CoreError::infra)?;
        declare_exchange(&publish_channel, exchange_name).await?;
        info!("RabbitMQ exchange '{}' declared.", exchange_name);

        Ok(Self {
            connection: Arc::new(connection),
            publish_channel: Arc::new(publish_channel),
            exchange_name: exchange_name.to_string(),
        })
    }

    /// Declares a durable queue bound to `routing_key` and starts consuming it
    /// on a dedicated channel, at most `prefetch` unacked deliveries at a time.
    pub async fn consume(
        &self,
        queue_name: &str,
        routing_key: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<Consumer, CoreError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(CoreError::infra)?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(CoreError::infra)?;
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(CoreError::infra)?;
        channel
            .queue_bind(
                queue_name,
                &self.exchange_name,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(CoreError::infra)?;
        info!(
            "Queue '{}' bound to exchange '{}' with key '{}'.",
            queue_name, self.exchange_name, routing_key
        );

        channel
            .basic_consume(
                queue_name,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(CoreError::infra)
    }
}

async fn declare_exchange(channel: &Channel, exchange_name: &str) -> Result<(), CoreError> {
    channel
        .exchange_declare(
            exchange_name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(CoreError::infra)
}

/// Event type carried in the AMQP `type` property, if any.
pub fn delivery_event_type(delivery: &Delivery) -> Option<String> {
    delivery
        .properties
        .kind()
        .as_ref()
        .map(|kind| kind.to_string())
}

#[async_trait]
impl EventPublisher for RabbitMqEventBus {
    async fn publish(
        &self,
        routing_key: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError> {
        let properties = BasicProperties::default()
            .with_content_type("application/protobuf".into())
            .with_type(event_type.into())
            .with_delivery_mode(2);

        self.publish_channel
            .basic_publish(
                &self.exchange_name,
                routing_key,
                BasicPublishOptions::default(),
                event_payload,
                properties,
            )
            .await
            .map_err(CoreError::infra)?
            .await // broker confirmation
            .map_err(CoreError::infra)?;
        Ok(())
    }
}
