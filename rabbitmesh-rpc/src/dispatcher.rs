//! Call dispatcher: replays a compiled method contract for one invocation.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, debug_span, Instrument};

use crate::declaration::MethodId;
use crate::error::{RabbitRpcError, Result};
use crate::generator::Invocation;
use crate::message::HeaderAppendingPostProcessor;
use crate::metadata::{CallMetadata, CompiledInterface, DispatchMode};
use crate::transport::{Destination, Transport};

/// Serialize a call argument
pub fn to_argument<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Outcome of a dispatched call
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Fire-and-forget call; nothing was awaited
    None,
    /// Reply of a request-reply call, not yet decoded
    Value(Value),
}

/// Runtime object behind every bound client
///
/// Holds the compiled method table and the transport. Cloning is cheap and
/// all clones share the same table; calls never mutate it, so one client can
/// serve any number of concurrent calls.
#[derive(Clone)]
pub struct GeneratedClient {
    interface: Arc<CompiledInterface>,
    transport: Arc<dyn Transport>,
}

impl GeneratedClient {
    pub fn new(interface: CompiledInterface, transport: Arc<dyn Transport>) -> Self {
        Self {
            interface: Arc::new(interface),
            transport,
        }
    }

    pub fn interface_name(&self) -> &str {
        self.interface.name()
    }

    pub fn interface(&self) -> &CompiledInterface {
        &self.interface
    }

    pub fn metadata(&self, method: &MethodId) -> Option<&CallMetadata> {
        self.interface.get(method)
    }

    /// Dispatch one call
    ///
    /// The declared return type of the method decides between
    /// fire-and-forget and request-reply. Exactly one message is published.
    pub async fn invoke(&self, method: &MethodId, args: Vec<Value>) -> Result<Reply> {
        let metadata = self.lookup(method)?;
        if args.len() != metadata.param_count() {
            return Err(RabbitRpcError::ArgumentCount {
                method: metadata.method_name().to_string(),
                expected: metadata.param_count(),
                actual: args.len(),
            });
        }

        let invocation = Invocation::new(self.interface.name(), method, &args);
        let exchange = metadata.exchange().resolve(&invocation);
        let routing_key = metadata.routing_key().resolve(&invocation);
        let headers = metadata.headers(&args)?;
        let payload = metadata.payload(&args).cloned().unwrap_or(Value::Null);

        let post_processor = HeaderAppendingPostProcessor::new(headers, metadata.post_processor().clone());
        let destination = Destination::select(exchange, routing_key);

        let span = debug_span!(
            "rabbit_call",
            interface = %self.interface.name(),
            method = %metadata.method_name(),
            mode = %metadata.mode(),
        );

        async move {
            debug!("Dispatching to {}", destination);
            match metadata.mode() {
                DispatchMode::FireAndForget => self
                    .transport
                    .send(destination, payload, &post_processor)
                    .await
                    .map(|()| Reply::None),
                DispatchMode::RequestReply => {
                    let reply = self
                        .transport
                        .send_and_receive(destination, payload, &post_processor)
                        .await;
                    if reply.is_ok() {
                        debug!("Received reply");
                    }
                    reply.map(Reply::Value)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Dispatch a fire-and-forget method
    pub async fn send(&self, method: &MethodId, args: Vec<Value>) -> Result<()> {
        self.expect_mode(method, DispatchMode::FireAndForget)?;
        self.invoke(method, args).await.map(|_| ())
    }

    /// Dispatch a request-reply method and decode the reply
    pub async fn request<R: DeserializeOwned>(&self, method: &MethodId, args: Vec<Value>) -> Result<R> {
        let metadata = self.expect_mode(method, DispatchMode::RequestReply)?;

        match self.invoke(method, args).await? {
            Reply::Value(value) => serde_json::from_value(value).map_err(|source| RabbitRpcError::Decode {
                method: metadata.method_name().to_string(),
                type_name: metadata.return_type().type_name().to_string(),
                source,
            }),
            Reply::None => Err(RabbitRpcError::internal_error(format!(
                "request-reply call {} produced no reply",
                metadata.method_name()
            ))),
        }
    }

    fn lookup(&self, method: &MethodId) -> Result<&CallMetadata> {
        self.interface.get(method).ok_or_else(|| RabbitRpcError::UnknownMethod {
            interface: self.interface.name().to_string(),
            signature: method.to_string(),
        })
    }

    fn expect_mode(&self, method: &MethodId, requested: DispatchMode) -> Result<&CallMetadata> {
        let metadata = self.lookup(method)?;
        if metadata.mode() != requested {
            return Err(RabbitRpcError::DispatchMode {
                method: metadata.method_name().to_string(),
                actual: metadata.mode(),
                requested,
            });
        }
        Ok(metadata)
    }
}

impl std::fmt::Debug for GeneratedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedClient")
            .field("interface", &self.interface.name())
            .field("methods", &self.interface.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{InterfaceDecl, MethodDecl, ParamDecl, ParamShape, ReturnType, SenderAttributes};
    use crate::memory::MemoryTransport;
    use crate::message::{MessagePostProcessor, OutboundMessage};
    use crate::metadata::MetadataCompiler;
    use crate::properties::PropertyResolver;
    use crate::registry::ComponentRegistry;
    use serde_json::json;

    const PLACE: MethodId = MethodId::from_static("String::place::String");
    const PLACE_PRIORITY: MethodId = MethodId::from_static("String::placePriority::String");
    const NOTIFY: MethodId = MethodId::from_static("()::notify::String::String");
    const TAGGED: MethodId = MethodId::from_static("u32::tagged::String::HashMap<String,i64>::i64");

    fn orders() -> InterfaceDecl {
        InterfaceDecl::new("OrderClient")
            .with_defaults(
                SenderAttributes::new()
                    .with_exchange("orders")
                    .with_routing_key("orders.default")
                    .with_message_post_processor("stamp"),
            )
            .with_method(
                MethodDecl::new("place")
                    .with_param(ParamDecl::new("order", "String"))
                    .returns(ReturnType::value("String")),
            )
            .with_method(
                MethodDecl::new("placePriority")
                    .with_param(ParamDecl::new("order", "String"))
                    .returns(ReturnType::value("String"))
                    .with_sender(SenderAttributes::new().with_routing_key("orders.priority")),
            )
            .with_method(
                MethodDecl::new("notify")
                    .with_param(ParamDecl::new("payload", "String").payload())
                    .with_param(ParamDecl::new("trace_id", "String").named_header("trace"))
                    .with_sender(SenderAttributes::new().with_exchange("").with_routing_key("")),
            )
            .with_method(
                MethodDecl::new("tagged")
                    .with_param(ParamDecl::new("payload", "String").payload())
                    .with_param(
                        ParamDecl::new("bulk", "HashMap<String,i64>")
                            .with_shape(ParamShape::StringMap)
                            .headers(),
                    )
                    .with_param(ParamDecl::new("a", "i64").header())
                    .returns(ReturnType::value("u32")),
            )
    }

    fn client(transport: Arc<MemoryTransport>) -> GeneratedClient {
        let stamp: Arc<dyn MessagePostProcessor> = Arc::new(|message: OutboundMessage| -> Result<OutboundMessage> {
            // Headers from the call are already present when this runs
            let traced = message.header("trace").is_some();
            Ok(message.with_header("stamped", traced))
        });
        let compiler = MetadataCompiler::new(
            PropertyResolver::empty(),
            Arc::new(ComponentRegistry::new().with_post_processor("stamp", stamp)),
        );
        GeneratedClient::new(compiler.compile(&orders()).unwrap(), transport)
    }

    #[tokio::test]
    async fn test_inherited_exchange_with_overridden_routing_key() {
        let transport = Arc::new(MemoryTransport::with_responder(|_| Ok(json!("accepted"))));
        let client = client(transport.clone());

        let reply: String = client.request(&PLACE_PRIORITY, vec![json!("order-1")]).await.unwrap();
        assert_eq!(reply, "accepted");

        let sent = transport.last_sent().await.unwrap();
        assert_eq!(
            sent.destination,
            Destination::Exchange {
                exchange: "orders".into(),
                routing_key: Some("orders.priority".into()),
            }
        );
        assert!(sent.expects_reply);
        assert_eq!(sent.payload().unwrap(), json!("order-1"));
    }

    #[tokio::test]
    async fn test_fire_and_forget_with_header() {
        let transport = Arc::new(MemoryTransport::with_responder(|_| panic!("no reply must be requested")));
        let client = client(transport.clone());

        client.send(&NOTIFY, vec![json!("hello"), json!("abc123")]).await.unwrap();

        let sent = transport.last_sent().await.unwrap();
        assert!(!sent.expects_reply);
        assert_eq!(sent.payload().unwrap(), json!("hello"));
        assert_eq!(sent.message.header("trace"), Some(&json!("abc123")));
        assert_eq!(sent.message.header("stamped"), Some(&json!(true)));
        // Empty method-level values do not override the interface defaults
        assert_eq!(sent.destination.exchange(), Some("orders"));
        assert_eq!(sent.destination.routing_key(), Some("orders.default"));
    }

    #[tokio::test]
    async fn test_invoke_returns_no_reply_for_unit_methods() {
        let transport = Arc::new(MemoryTransport::echo());
        let client = client(transport.clone());

        let reply = client.invoke(&NOTIFY, vec![json!("hello"), json!("abc")]).await.unwrap();
        assert_eq!(reply, Reply::None);
        let reply = client.invoke(&PLACE, vec![json!("order")]).await.unwrap();
        assert_eq!(reply, Reply::Value(json!("order")));
    }

    #[tokio::test]
    async fn test_named_header_wins_over_map() {
        let transport = Arc::new(MemoryTransport::with_responder(|_| Ok(json!(7))));
        let client = client(transport.clone());

        let reply: u32 = client
            .request(&TAGGED, vec![json!("payload"), json!({"a": 1, "b": 5}), json!(2)])
            .await
            .unwrap();
        assert_eq!(reply, 7);

        let sent = transport.last_sent().await.unwrap();
        assert_eq!(sent.message.header("a"), Some(&json!(2)));
        assert_eq!(sent.message.header("b"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_call_errors() {
        let transport = Arc::new(MemoryTransport::with_responder(|_| Ok(json!({"not": "a string"}))));
        let client = client(transport.clone());

        let err = client.request::<String>(&PLACE, vec![json!("order")]).await.unwrap_err();
        assert!(matches!(err, RabbitRpcError::Decode { ref type_name, .. } if type_name == "String"));

        let err = client.request::<String>(&PLACE, vec![]).await.unwrap_err();
        assert!(matches!(err, RabbitRpcError::ArgumentCount { expected: 1, actual: 0, .. }));

        let err = client.send(&PLACE, vec![json!("order")]).await.unwrap_err();
        assert!(matches!(err, RabbitRpcError::DispatchMode { .. }));

        let unknown = MethodId::from_static("()::missing::");
        let err = client.invoke(&unknown, vec![]).await.unwrap_err();
        assert!(matches!(err, RabbitRpcError::UnknownMethod { .. }));

        // Rejected calls publish nothing
        assert_eq!(transport.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let transport = Arc::new(MemoryTransport::new());
        let client = client(transport);

        let err = client.request::<String>(&PLACE, vec![json!("order")]).await.unwrap_err();
        assert!(matches!(err, RabbitRpcError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_metadata() {
        let transport = Arc::new(MemoryTransport::echo());
        let client = client(transport.clone());

        let calls = (0..16).map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.request::<String>(&PLACE, vec![json!(format!("order-{}", i))]).await })
        });
        for (i, call) in calls.collect::<Vec<_>>().into_iter().enumerate() {
            assert_eq!(call.await.unwrap().unwrap(), format!("order-{}", i));
        }
        assert_eq!(transport.sent().await.len(), 16);
    }
}
