//! RabbitMQ transport built on lapin.
//!
//! Every transport owns one exclusive reply queue. Request-reply calls stamp
//! a fresh correlation id, register a pending slot keyed by it, publish, and
//! wait for the consumer task to complete the slot. If the consumer stops,
//! waiting calls fail and the next request declares the queue again and
//! resubscribes.

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use lapin::BasicProperties;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::connection::ConnectionManager;
use crate::error::{RabbitRpcError, Result};
use crate::message::{JsonMessageConverter, MessagePostProcessor, MessageProperties, OutboundMessage};
use crate::settings::{RpcSettings, TemplateConfig};
use crate::transport::{Destination, Transport};

type PendingReplies = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value>>>>>;

/// [`Transport`] publishing through a RabbitMQ broker
pub struct AmqpTransport {
    connection: Arc<ConnectionManager>,
    template: TemplateConfig,
    reply_queue: String,
    pending: PendingReplies,
    listening: Arc<AtomicBool>,
    converter: JsonMessageConverter,
    reply_consumer: Mutex<JoinHandle<()>>,
}

impl AmqpTransport {
    /// Connect using `settings` and start consuming replies
    pub async fn connect(settings: &RpcSettings) -> Result<Self> {
        let connection = Arc::new(ConnectionManager::with_config(settings.connection.clone()));
        connection.connect().await?;
        Self::with_connection(connection, settings.template.clone()).await
    }

    /// Build on an existing connection manager
    pub async fn with_connection(connection: Arc<ConnectionManager>, template: TemplateConfig) -> Result<Self> {
        let reply_queue = format!("{}.{}", template.reply_queue_prefix, Uuid::new_v4());
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let listening = Arc::new(AtomicBool::new(false));

        let reply_consumer = start_reply_consumer(&connection, &reply_queue, &pending, &listening).await?;

        Ok(Self {
            connection,
            template,
            reply_queue,
            pending,
            listening,
            converter: JsonMessageConverter,
            reply_consumer: Mutex::new(reply_consumer),
        })
    }

    /// Whether the reply consumer is running
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Restart the reply consumer if it stopped, e.g. after the connection dropped.
    ///
    /// The reply queue is exclusive to the connection it was declared on, so
    /// it is declared again before subscribing.
    async fn ensure_listening(&self) -> Result<()> {
        if self.is_listening() {
            return Ok(());
        }

        let mut reply_consumer = self.reply_consumer.lock().await;
        if self.is_listening() {
            return Ok(());
        }

        warn!("Restarting reply consumer on {}", self.reply_queue);
        reply_consumer.abort();
        *reply_consumer =
            start_reply_consumer(&self.connection, &self.reply_queue, &self.pending, &self.listening).await?;
        Ok(())
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Number of request-reply calls still waiting for a reply
    pub async fn pending_replies(&self) -> usize {
        self.pending.lock().await.len()
    }

    fn prepare(&self, payload: &Value, post_processor: &dyn MessagePostProcessor) -> Result<OutboundMessage> {
        let message = self.converter.to_message(payload)?;
        post_processor.post_process(message)
    }

    async fn publish(&self, destination: &Destination, message: OutboundMessage) -> Result<()> {
        let (exchange, routing_key) = address(destination, &self.template);
        self.connection
            .publish(exchange, routing_key, &message.body, to_basic_properties(&message.properties))
            .await
    }
}

async fn start_reply_consumer(
    connection: &ConnectionManager,
    reply_queue: &str,
    pending: &PendingReplies,
    listening: &Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    connection.declare_reply_queue(reply_queue).await?;
    let mut consumer = connection
        .create_reply_consumer(reply_queue, &format!("{}-consumer", reply_queue))
        .await?;
    listening.store(true, Ordering::Release);
    debug!("Listening for replies on {}", reply_queue);

    let pending = pending.clone();
    let listening = listening.clone();
    let queue = reply_queue.to_string();
    Ok(tokio::spawn(async move {
        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => complete_pending(&pending, delivery).await,
                Err(e) => {
                    error!("Reply consumer on {} failed: {}", queue, e);
                    break;
                }
            }
        }
        error!("Reply consumer on {} stopped; it restarts on the next request", queue);
        fail_pending(&pending, &format!("reply consumer on {} stopped", queue)).await;
        listening.store(false, Ordering::Release);
    }))
}

/// Fail every waiting call; their replies can no longer arrive
async fn fail_pending(pending: &PendingReplies, reason: &str) {
    let slots: Vec<_> = pending.lock().await.drain().collect();
    for (correlation_id, slot) in slots {
        debug!("Failing pending call {}: {}", correlation_id, reason);
        let _ = slot.send(Err(RabbitRpcError::transport_error(reason)));
    }
}

async fn complete_pending(pending: &PendingReplies, delivery: Delivery) {
    let Some(correlation_id) = delivery.properties.correlation_id().as_ref().map(|id| id.as_str().to_string()) else {
        warn!("Dropping reply without correlation id");
        return;
    };

    let slot = pending.lock().await.remove(&correlation_id);
    match slot {
        Some(slot) => {
            let reply = JsonMessageConverter.from_body(&delivery.data);
            if slot.send(reply).is_err() {
                warn!("Caller for {} went away before its reply arrived", correlation_id);
            }
        }
        None => warn!("Received reply for unknown correlation_id: {}", correlation_id),
    }
}

/// Exchange and routing key for `destination`, filling gaps from the template
fn address<'a>(destination: &'a Destination, template: &'a TemplateConfig) -> (&'a str, &'a str) {
    match destination {
        Destination::Exchange { exchange, routing_key } => (
            exchange.as_str(),
            routing_key.as_deref().unwrap_or(template.default_routing_key.as_str()),
        ),
        Destination::RoutingKey(routing_key) => (template.default_exchange.as_str(), routing_key.as_str()),
        Destination::Default => (
            template.default_exchange.as_str(),
            template.default_routing_key.as_str(),
        ),
    }
}

fn to_basic_properties(properties: &MessageProperties) -> BasicProperties {
    let mut basic = BasicProperties::default();

    if let Some(content_type) = &properties.content_type {
        basic = basic.with_content_type(ShortString::from(content_type.clone()));
    }
    if let Some(content_encoding) = &properties.content_encoding {
        basic = basic.with_content_encoding(ShortString::from(content_encoding.clone()));
    }
    if let Some(correlation_id) = &properties.correlation_id {
        basic = basic.with_correlation_id(ShortString::from(correlation_id.clone()));
    }
    if let Some(reply_to) = &properties.reply_to {
        basic = basic.with_reply_to(ShortString::from(reply_to.clone()));
    }
    if let Some(message_id) = &properties.message_id {
        basic = basic.with_message_id(ShortString::from(message_id.clone()));
    }
    if let Some(timestamp) = properties.timestamp {
        basic = basic.with_timestamp(timestamp.timestamp().max(0) as u64);
    }
    if let Some(priority) = properties.priority {
        basic = basic.with_priority(priority);
    }
    if let Some(expiration) = &properties.expiration {
        basic = basic.with_expiration(ShortString::from(expiration.clone()));
    }
    if !properties.headers.is_empty() {
        let mut headers = FieldTable::default();
        for (name, value) in &properties.headers {
            headers.insert(ShortString::from(name.clone()), to_amqp_value(value));
        }
        basic = basic.with_headers(headers);
    }

    basic
}

/// Header value for a JSON value.
///
/// Integers become `LongLongInt`. AMQP field tables have no unsigned 64-bit
/// type, so a `u64` above `i64::MAX` is sent as its decimal string rather than
/// a lossy `Double`.
fn to_amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => AMQPValue::LongLongInt(i),
            (None, Some(u)) => AMQPValue::LongString(LongString::from(u.to_string())),
            (None, None) => AMQPValue::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => AMQPValue::LongString(LongString::from(s.clone())),
        Value::Array(items) => {
            AMQPValue::FieldArray(FieldArray::from(items.iter().map(to_amqp_value).collect::<Vec<_>>()))
        }
        Value::Object(map) => {
            let mut table = FieldTable::default();
            for (name, value) in map {
                table.insert(ShortString::from(name.clone()), to_amqp_value(value));
            }
            AMQPValue::FieldTable(table)
        }
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn send(
        &self,
        destination: Destination,
        payload: Value,
        post_processor: &dyn MessagePostProcessor,
    ) -> Result<()> {
        let message = self.prepare(&payload, post_processor)?;
        self.publish(&destination, message).await
    }

    async fn send_and_receive(
        &self,
        destination: Destination,
        payload: Value,
        post_processor: &dyn MessagePostProcessor,
    ) -> Result<Value> {
        self.ensure_listening().await?;

        let mut message = self.prepare(&payload, post_processor)?;
        let correlation_id = Uuid::new_v4().to_string();
        message.properties.correlation_id = Some(correlation_id.clone());
        message.properties.reply_to = Some(self.reply_queue.clone());

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(correlation_id.clone(), reply_tx);

        if let Err(e) = self.publish(&destination, message).await {
            self.pending.lock().await.remove(&correlation_id);
            return Err(e);
        }
        debug!("Sent request to {} (correlation_id: {})", destination, correlation_id);

        let timeout_ms = self.template.reply_timeout_ms;
        match timeout(Duration::from_millis(timeout_ms), reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&correlation_id);
                Err(RabbitRpcError::internal_error("Reply channel closed"))
            }
            Err(_) => {
                self.pending.lock().await.remove(&correlation_id);
                Err(RabbitRpcError::Timeout { timeout_ms })
            }
        }
    }
}

impl Drop for AmqpTransport {
    fn drop(&mut self) {
        self.reply_consumer.get_mut().abort();
    }
}

impl std::fmt::Debug for AmqpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpTransport")
            .field("reply_queue", &self.reply_queue)
            .field("listening", &self.is_listening())
            .field("template", &self.template)
            .finish()
    }
}
