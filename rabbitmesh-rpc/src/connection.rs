use lapin::{
    options::*,
    types::FieldTable,
    uri::AMQPUri,
    BasicProperties, Channel, Connection, Consumer, Queue,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{RabbitRpcError, Result};

/// Maximum number of idle channels kept for reuse
const CHANNEL_POOL_SIZE: usize = 10;

/// Configuration for AMQP connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// AMQP broker URL (e.g., "amqp://localhost:5672")
    pub url: String,
    /// Connection timeout in milliseconds
    pub connection_timeout_ms: u64,
    /// Heartbeat interval in seconds
    pub heartbeat_seconds: u16,
    /// Number of connection attempts before giving up
    pub max_retries: u32,
    /// Delay between retry attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Channel prefetch count
    pub prefetch_count: u16,
    /// Wait for broker confirms on every publish
    pub publisher_confirms: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            connection_timeout_ms: 10_000,
            heartbeat_seconds: 60,
            max_retries: 5,
            retry_delay_ms: 1_000,
            prefetch_count: 10,
            publisher_confirms: true,
        }
    }
}

/// Manages the AMQP connection with reconnection and a small channel pool
pub struct ConnectionManager {
    config: ConnectionConfig,
    connection: Arc<RwLock<Option<Arc<Connection>>>>,
    channels: Arc<Mutex<Vec<Channel>>>,
}

impl ConnectionManager {
    /// Create a new connection manager with default configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(ConnectionConfig {
            url: url.into(),
            ..ConnectionConfig::default()
        })
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            channels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Establish connection to RabbitMQ with retry logic
    pub async fn connect(&self) -> Result<()> {
        let mut attempts = 0;

        loop {
            match self.try_connect().await {
                Ok(connection) => {
                    info!("Connected to RabbitMQ at {}", self.config.url);
                    *self.connection.write().await = Some(Arc::new(connection));
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.config.max_retries {
                        error!("Failed to connect to RabbitMQ after {} attempts: {}", attempts, e);
                        return Err(e);
                    }

                    warn!(
                        "Connection attempt {} failed, retrying in {}ms: {}",
                        attempts, self.config.retry_delay_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }

    async fn try_connect(&self) -> Result<Connection> {
        debug!("Attempting to connect to {}", self.config.url);

        let mut uri: AMQPUri = self
            .config
            .url
            .parse()
            .map_err(|e: String| RabbitRpcError::transport_error(format!("invalid AMQP url: {}", e)))?;
        uri.query.heartbeat = Some(self.config.heartbeat_seconds);

        let properties = lapin::ConnectionProperties::default()
            .with_connection_name(format!("rabbitmesh-rpc-{}", uuid::Uuid::new_v4()).into());

        let timeout = Duration::from_millis(self.config.connection_timeout_ms);
        let connection = tokio::time::timeout(timeout, Connection::connect_uri(uri, properties))
            .await
            .map_err(|_| RabbitRpcError::Timeout {
                timeout_ms: self.config.connection_timeout_ms,
            })??;

        debug!("AMQP connection established");
        Ok(connection)
    }

    /// Get a pooled channel or open a new one
    pub async fn get_channel(&self) -> Result<Channel> {
        {
            let mut channels = self.channels.lock().await;
            while let Some(channel) = channels.pop() {
                if channel.status().connected() {
                    debug!("Reusing existing channel");
                    return Ok(channel);
                }
            }
        }

        let connection = self.ensure_connected().await?;
        let channel = connection.create_channel().await?;
        channel.basic_qos(self.config.prefetch_count, BasicQosOptions::default()).await?;
        if self.config.publisher_confirms {
            channel.confirm_select(ConfirmSelectOptions::default()).await?;
        }

        debug!("Created new channel");
        Ok(channel)
    }

    /// Return channel to pool for reuse
    pub async fn return_channel(&self, channel: Channel) {
        if channel.status().connected() {
            let mut channels = self.channels.lock().await;
            if channels.len() < CHANNEL_POOL_SIZE {
                channels.push(channel);
                debug!("Returned channel to pool");
            }
        }
    }

    async fn ensure_connected(&self) -> Result<Arc<Connection>> {
        {
            let connection_guard = self.connection.read().await;
            if let Some(connection) = connection_guard.as_ref() {
                if connection.status().connected() {
                    return Ok(connection.clone());
                }
            }
        }

        warn!("Connection lost, attempting to reconnect");
        self.connect().await?;

        let connection_guard = self.connection.read().await;
        connection_guard
            .as_ref()
            .cloned()
            .ok_or_else(|| RabbitRpcError::internal_error("Connection should exist after connect"))
    }

    /// Declare an exclusive, auto-deleted queue for replies
    pub async fn declare_reply_queue(&self, queue_name: &str) -> Result<Queue> {
        let channel = self.get_channel().await?;

        let queue = channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: false,
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        self.return_channel(channel).await;
        debug!("Declared reply queue: {}", queue_name);
        Ok(queue)
    }

    /// Consume replies from `queue_name` without acknowledgements
    pub async fn create_reply_consumer(&self, queue_name: &str, consumer_tag: &str) -> Result<Consumer> {
        // The channel stays with the consumer and is not returned to the pool
        let channel = self.get_channel().await?;

        let consumer = channel
            .basic_consume(
                queue_name,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        debug!("Created consumer for queue: {}", queue_name);
        Ok(consumer)
    }

    /// Publish a message, waiting for the broker confirm when enabled
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<()> {
        let channel = self.get_channel().await?;

        let confirmation = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?
            .await?;

        self.return_channel(channel).await;

        if confirmation.is_nack() {
            return Err(RabbitRpcError::transport_error(format!(
                "broker rejected message to '{}' with routing key '{}'",
                exchange, routing_key
            )));
        }

        debug!("Published message to '{}' with routing key '{}'", exchange, routing_key);
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        let connection_guard = self.connection.read().await;
        connection_guard
            .as_ref()
            .map(|conn| conn.status().connected())
            .unwrap_or(false)
    }

    /// Close the connection and drop pooled channels
    pub async fn close(&self) -> Result<()> {
        self.channels.lock().await.clear();
        if let Some(connection) = self.connection.write().await.take() {
            connection.close(200, "client shutdown").await?;
            info!("Closed RabbitMQ connection to {}", self.config.url);
        }
        Ok(())
    }

    /// Connection statistics for monitoring
    pub async fn get_stats(&self) -> ConnectionStats {
        ConnectionStats {
            is_connected: self.is_connected().await,
            channel_pool_size: self.channels.lock().await.len(),
            url: self.config.url.clone(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionStats {
    pub is_connected: bool,
    pub channel_pool_size: usize,
    pub url: String,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .finish()
    }
}
