//! Order client demo
//!
//! Declares an order service client and calls it. With `RABBITMQ_URL` set the
//! calls go to the broker (some service must consume `orders.default`);
//! otherwise an in-memory transport answers them.
//!
//! ```text
//! RUST_LOG=debug cargo run --example order_client
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use rabbitmesh_rpc::{
    rabbit_client, AmqpTransport, ClientRegistry, ComponentRegistry, CompositePropertySource, EnvPropertySource,
    Invocation, KeyGenerator, MemoryTransport, MessagePostProcessor, MetadataCompiler, OutboundMessage,
    PropertyResolver, RabbitClientFactory, Result, RpcSettings, Transport,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub customer: String,
    pub items: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: String,
    pub item_count: usize,
}

#[rabbit_client(
    exchange = "${orders.exchange:orders}",
    routing_key = "orders.default",
    message_post_processor = "clientTag",
    name = "orders"
)]
pub trait OrderClient {
    async fn place(&self, order: PlaceOrder) -> Result<OrderPlaced>;

    #[rabbit_sender(routing_key_generator = "customerRouting")]
    async fn notify(
        &self,
        #[payload] message: String,
        #[header("customer")] customer: String,
        #[headers] extra: HashMap<String, String>,
    ) -> Result<()>;
}

fn memory_transport() -> Arc<MemoryTransport> {
    Arc::new(MemoryTransport::with_responder(|sent| {
        let order: PlaceOrder = serde_json::from_value(sent.payload()?)?;
        Ok(json!({
            "order_id": format!("{}-{}", order.customer, uuid::Uuid::new_v4()),
            "item_count": order.items.len(),
        }))
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "order_client=info,rabbitmesh_rpc=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = RpcSettings::load()?;
    let transport: Arc<dyn Transport> = match std::env::var("RABBITMQ_URL") {
        Ok(url) => {
            let mut settings = settings.clone();
            settings.connection.url = url;
            Arc::new(AmqpTransport::connect(&settings).await?)
        }
        Err(_) => {
            tracing::info!("RABBITMQ_URL not set, using the in-memory transport");
            memory_transport()
        }
    };

    let customer_routing: Arc<dyn KeyGenerator> = Arc::new(|invocation: &Invocation<'_>| {
        invocation
            .arg(1)
            .and_then(Value::as_str)
            .map(|customer| format!("customers.{}", customer))
    });
    let client_tag: Arc<dyn MessagePostProcessor> = Arc::new(|message: OutboundMessage| -> Result<OutboundMessage> {
        Ok(message.with_header("client", "order-client-demo"))
    });
    let components = ComponentRegistry::new()
        .with_routing_key_generator("customerRouting", customer_routing)
        .with_post_processor("clientTag", client_tag);

    let properties = CompositePropertySource::new()
        .with_source(EnvPropertySource::new())
        .with_source(RpcSettings::load_config()?);

    let factory = RabbitClientFactory::new(
        transport,
        MetadataCompiler::new(PropertyResolver::new(properties), Arc::new(components)),
    );
    let registry = ClientRegistry::bind_all(&factory)?;
    let orders: RabbitOrderClient = registry.get()?;

    let placed = orders
        .place(PlaceOrder {
            customer: "acme".to_string(),
            items: vec!["widget".to_string(), "gadget".to_string()],
        })
        .await?;
    tracing::info!("Placed order {} with {} items", placed.order_id, placed.item_count);

    let extra = HashMap::from([("channel".to_string(), "email".to_string())]);
    orders
        .notify(format!("Order {} confirmed", placed.order_id), "acme".to_string(), extra)
        .await?;
    tracing::info!("Sent notification");

    Ok(())
}
