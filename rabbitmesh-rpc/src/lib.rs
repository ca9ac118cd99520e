//! # RabbitMesh RPC - Declarative RabbitMQ Clients
//!
//! Describe a remote service as a Rust trait and get a client that turns
//! every method call into a RabbitMQ message. Addressing, headers and
//! post-processing are declared with attributes and compiled once when the
//! client is bound; calls only replay the compiled contract.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rabbitmesh_rpc::{
//!     rabbit_client, AmqpTransport, ComponentRegistry, MetadataCompiler, PropertyResolver,
//!     RabbitClientFactory, RpcSettings,
//! };
//!
//! #[rabbit_client(exchange = "orders", routing_key = "orders.default")]
//! pub trait OrderClient {
//!     async fn place(&self, order: String) -> rabbitmesh_rpc::Result<String>;
//!
//!     #[rabbit_sender(routing_key = "orders.audit")]
//!     async fn audit(&self, #[payload] order: String, #[header("trace")] trace_id: String) -> rabbitmesh_rpc::Result<()>;
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = RpcSettings::load()?;
//!     let transport = Arc::new(AmqpTransport::connect(&settings).await?);
//!     let compiler = MetadataCompiler::new(
//!         PropertyResolver::new(RpcSettings::load_config()?),
//!         Arc::new(ComponentRegistry::new()),
//!     );
//!     let factory = RabbitClientFactory::new(transport, compiler);
//!
//!     let orders: RabbitOrderClient = factory.create()?;
//!     let confirmation = orders.place("order-1".to_string()).await?;
//!     orders.audit("order-1".to_string(), "abc123".to_string()).await?;
//!     println!("{}", confirmation);
//!     Ok(())
//! }
//! ```

pub mod amqp;
pub mod client_registry;
pub mod connection;
pub mod declaration;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod generator;
pub mod memory;
pub mod message;
pub mod metadata;
pub mod properties;
pub mod registry;
pub mod settings;
pub mod transport;

pub use amqp::AmqpTransport;
pub use client_registry::{registered_clients, ClientDescriptor, ClientRegistry};
pub use connection::{ConnectionConfig, ConnectionManager};
pub use declaration::{
    InterfaceDecl, MethodDecl, MethodId, ParamDecl, ParamRole, ParamShape, ReturnType, SenderAttributes,
};
pub use dispatcher::{to_argument, GeneratedClient, Reply};
pub use error::{ComponentKind, RabbitRpcError, Result};
pub use factory::{RabbitClientDefinition, RabbitClientFactory};
pub use generator::{AddressResolver, Invocation, KeyGenerator};
pub use memory::{MemoryTransport, SentMessage};
pub use message::{
    HeaderAppendingPostProcessor, IdentityPostProcessor, JsonMessageConverter, MessagePostProcessor,
    MessageProperties, OutboundMessage,
};
pub use metadata::{CallMetadata, CompiledInterface, DispatchMode, MetadataCompiler};
pub use properties::{CompositePropertySource, EnvPropertySource, PropertyResolver, PropertySource};
pub use registry::ComponentRegistry;
pub use settings::{RpcSettings, TemplateConfig};
pub use transport::{Destination, Transport};

pub use rabbitmesh_rpc_macros::rabbit_client;

// Used by generated code
#[doc(hidden)]
pub use async_trait::async_trait;
#[doc(hidden)]
pub use inventory;
#[doc(hidden)]
pub use serde_json;
