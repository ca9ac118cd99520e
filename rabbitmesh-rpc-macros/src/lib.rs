//! # RabbitMesh RPC Macros
//!
//! `#[rabbit_client]` turns a trait describing a remote service into a
//! RabbitMQ client for `rabbitmesh-rpc`.
//!
//! ```rust,ignore
//! use rabbitmesh_rpc::{rabbit_client, Result};
//! use std::collections::HashMap;
//!
//! #[rabbit_client(exchange = "orders", routing_key = "${orders.routing-key:orders.default}")]
//! pub trait OrderClient {
//!     // Request-reply: the reply is decoded into `Confirmation`
//!     async fn place(&self, order: Order) -> Result<Confirmation>;
//!
//!     // Fire-and-forget on a different routing key
//!     #[rabbit_sender(routing_key = "orders.audit", message_post_processor = "auditStamp")]
//!     async fn audit(
//!         &self,
//!         #[payload] order: Order,
//!         #[header("trace")] trace_id: String,
//!         #[headers] extra: HashMap<String, String>,
//!     ) -> Result<()>;
//! }
//! ```
//!
//! The expansion keeps the trait (through `async_trait`) and adds:
//! - `RabbitOrderClient`, a struct implementing the trait over a `GeneratedClient`
//! - its `RabbitClientDefinition`, which carries the interface declaration
//! - an `inventory` registration so `ClientRegistry::bind_all` finds it
//!
//! Parameter roles:
//! - `#[payload]` marks the message body; a single unannotated parameter is the payload
//! - `#[header]` sends the argument as a header named after the parameter
//! - `#[header("name")]` or `#[header(name = "name")]` picks the header name
//! - `#[headers]` merges a string-keyed map into the headers
//!
//! Methods returning `Result<()>` are fire-and-forget; any other `Result<T>`
//! waits for a reply. The error type must implement
//! `From<rabbitmesh_rpc::RabbitRpcError>`.

extern crate proc_macro;

mod attributes;
mod rabbit_client;
mod signature;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemTrait};

use crate::attributes::ClientArgs;

/// Declares a RabbitMQ client from a trait.
///
/// Accepted keys: `exchange`, `routing_key`, `exchange_generator`,
/// `routing_key_generator`, `message_post_processor` and `name` (the registry
/// qualifier, by default the snake_case trait name). Literal exchange and
/// routing-key values may be `${property}` references.
#[proc_macro_attribute]
pub fn rabbit_client(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut client_args = ClientArgs::default();
    let parser = syn::meta::parser(|meta| client_args.parse_meta(meta));
    parse_macro_input!(args with parser);
    let item = parse_macro_input!(input as ItemTrait);

    rabbit_client::expand(client_args, item)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
