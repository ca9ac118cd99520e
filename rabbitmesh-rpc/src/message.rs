use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{RabbitRpcError, Result};

/// Content type of every message produced by [`JsonMessageConverter`]
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// AMQP properties of an outgoing message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageProperties {
    /// Message headers (tracing info, tenant ids, etc.)
    pub headers: BTreeMap<String, Value>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    /// Request correlation ID (for matching requests/replies)
    pub correlation_id: Option<String>,
    /// Queue the reply should be sent to
    pub reply_to: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub priority: Option<u8>,
    /// Per-message TTL in milliseconds, as AMQP expects it
    pub expiration: Option<String>,
}

/// Message handed to post-processors and then to the broker
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub properties: MessageProperties,
}

impl OutboundMessage {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            properties: MessageProperties::default(),
        }
    }

    /// Add a header to the message
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.headers.insert(name.into(), value.into());
        self
    }

    /// Get header value
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.properties.headers.get(name)
    }

    /// Deserialize the body to a specific type
    pub fn deserialize_body<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Hook applied to every outgoing message right before it is published
pub trait MessagePostProcessor: Send + Sync {
    fn post_process(&self, message: OutboundMessage) -> Result<OutboundMessage>;
}

impl<F> MessagePostProcessor for F
where
    F: Fn(OutboundMessage) -> Result<OutboundMessage> + Send + Sync,
{
    fn post_process(&self, message: OutboundMessage) -> Result<OutboundMessage> {
        self(message)
    }
}

/// Post-processor that leaves the message untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPostProcessor;

impl MessagePostProcessor for IdentityPostProcessor {
    fn post_process(&self, message: OutboundMessage) -> Result<OutboundMessage> {
        Ok(message)
    }
}

/// Injects call headers, then runs the configured post-processor
pub struct HeaderAppendingPostProcessor {
    headers: BTreeMap<String, Value>,
    delegate: Arc<dyn MessagePostProcessor>,
}

impl HeaderAppendingPostProcessor {
    pub fn new(headers: BTreeMap<String, Value>, delegate: Arc<dyn MessagePostProcessor>) -> Self {
        Self { headers, delegate }
    }

    pub fn headers(&self) -> &BTreeMap<String, Value> {
        &self.headers
    }
}

impl MessagePostProcessor for HeaderAppendingPostProcessor {
    fn post_process(&self, mut message: OutboundMessage) -> Result<OutboundMessage> {
        for (name, value) in &self.headers {
            message.properties.headers.insert(name.clone(), value.clone());
        }
        self.delegate.post_process(message)
    }
}

impl std::fmt::Debug for HeaderAppendingPostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderAppendingPostProcessor")
            .field("headers", &self.headers)
            .finish()
    }
}

/// JSON conversion between call payloads and message bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMessageConverter;

impl JsonMessageConverter {
    /// Serialize a payload into a new message
    pub fn to_message(&self, payload: &Value) -> Result<OutboundMessage> {
        let mut message = OutboundMessage::new(serde_json::to_vec(payload)?);
        message.properties.content_type = Some(JSON_CONTENT_TYPE.to_string());
        message.properties.content_encoding = Some("UTF-8".to_string());
        Ok(message)
    }

    /// Deserialize a reply body
    ///
    /// An empty body is decoded as `null`.
    pub fn from_body(&self, body: &[u8]) -> Result<Value> {
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(body).map_err(RabbitRpcError::from)
    }
}
