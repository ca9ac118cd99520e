use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::message::MessagePostProcessor;

/// Where a message is published, in the most specific form available
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Explicit exchange, with the routing key if one was resolved
    Exchange {
        exchange: String,
        routing_key: Option<String>,
    },
    /// Routing key on the transport's default exchange
    RoutingKey(String),
    /// Transport default exchange and routing key
    Default,
}

impl Destination {
    /// Pick the send form for the resolved exchange and routing key
    pub fn select(exchange: Option<String>, routing_key: Option<String>) -> Self {
        match (exchange, routing_key) {
            (Some(exchange), routing_key) => Self::Exchange { exchange, routing_key },
            (None, Some(routing_key)) => Self::RoutingKey(routing_key),
            (None, None) => Self::Default,
        }
    }

    pub fn exchange(&self) -> Option<&str> {
        match self {
            Self::Exchange { exchange, .. } => Some(exchange),
            _ => None,
        }
    }

    pub fn routing_key(&self) -> Option<&str> {
        match self {
            Self::Exchange { routing_key, .. } => routing_key.as_deref(),
            Self::RoutingKey(routing_key) => Some(routing_key),
            Self::Default => None,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exchange { exchange, routing_key } => {
                write!(f, "{}/{}", exchange, routing_key.as_deref().unwrap_or(""))
            }
            Self::RoutingKey(routing_key) => write!(f, "<default>/{}", routing_key),
            Self::Default => f.write_str("<default>"),
        }
    }
}

/// Broker client performing the actual publish and request-reply exchanges
///
/// Implementations convert the payload into a message, apply the
/// post-processor, and publish. Timeouts, retries and connection handling
/// belong to the implementation; failures are returned as errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish without waiting for a reply
    async fn send(
        &self,
        destination: Destination,
        payload: Value,
        post_processor: &dyn MessagePostProcessor,
    ) -> Result<()>;

    /// Publish and wait for the correlated reply
    async fn send_and_receive(
        &self,
        destination: Destination,
        payload: Value,
        post_processor: &dyn MessagePostProcessor,
    ) -> Result<Value>;
}
