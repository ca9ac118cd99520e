//! In-process transport for tests and local development.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RabbitRpcError, Result};
use crate::message::{JsonMessageConverter, MessagePostProcessor, OutboundMessage};
use crate::transport::{Destination, Transport};

/// Reply queue name stamped on request-reply messages
pub const MEMORY_REPLY_QUEUE: &str = "rabbitmesh-rpc.memory.replies";

/// A message captured by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub destination: Destination,
    /// Message after conversion and post-processing
    pub message: OutboundMessage,
    pub expects_reply: bool,
}

impl SentMessage {
    /// Deserialized body of the message
    pub fn payload(&self) -> Result<Value> {
        JsonMessageConverter.from_body(&self.message.body)
    }
}

/// Computes the reply to a request-reply message
pub type Responder = Arc<dyn Fn(&SentMessage) -> Result<Value> + Send + Sync>;

/// Transport that records every message instead of publishing it
///
/// Request-reply calls are answered by the configured responder; without
/// one they fail like a broker that never replies.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<SentMessage>>,
    responder: Option<Responder>,
    converter: JsonMessageConverter,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&SentMessage) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Arc::new(responder)),
            ..Self::default()
        }
    }

    /// Transport replying with the payload of every request
    pub fn echo() -> Self {
        Self::with_responder(SentMessage::payload)
    }

    /// All messages sent so far, oldest first
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn last_sent(&self) -> Option<SentMessage> {
        self.sent.lock().await.last().cloned()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }

    fn prepare(&self, payload: &Value, post_processor: &dyn MessagePostProcessor) -> Result<OutboundMessage> {
        let message = self.converter.to_message(payload)?;
        post_processor.post_process(message)
    }

    async fn record(&self, sent: SentMessage) {
        debug!("Recorded message to {} (reply expected: {})", sent.destination, sent.expects_reply);
        self.sent.lock().await.push(sent);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(
        &self,
        destination: Destination,
        payload: Value,
        post_processor: &dyn MessagePostProcessor,
    ) -> Result<()> {
        let message = self.prepare(&payload, post_processor)?;
        self.record(SentMessage {
            destination,
            message,
            expects_reply: false,
        })
        .await;
        Ok(())
    }

    async fn send_and_receive(
        &self,
        destination: Destination,
        payload: Value,
        post_processor: &dyn MessagePostProcessor,
    ) -> Result<Value> {
        let mut message = self.prepare(&payload, post_processor)?;
        message.properties.correlation_id = Some(Uuid::new_v4().to_string());
        message.properties.reply_to = Some(MEMORY_REPLY_QUEUE.to_string());

        let sent = SentMessage {
            destination,
            message,
            expects_reply: true,
        };
        self.record(sent.clone()).await;

        match &self.responder {
            Some(responder) => responder(&sent),
            None => Err(RabbitRpcError::Timeout { timeout_ms: 0 }),
        }
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("has_responder", &self.responder.is_some())
            .finish()
    }
}
