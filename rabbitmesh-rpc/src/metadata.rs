//! Metadata compiler: turns an [`InterfaceDecl`] into per-method call metadata.
//!
//! Compilation runs once per client, when it is bound. Every configuration
//! mistake (conflicting address fields, unknown components, unresolvable
//! payload, bad header maps, missing properties) surfaces here, before any
//! message is sent. The compiled table is immutable and shared by all calls.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::declaration::{InterfaceDecl, MethodDecl, MethodId, ParamShape, ReturnType, SenderAttributes};
use crate::error::{RabbitRpcError, Result};
use crate::generator::{AddressComponent, AddressResolver};
use crate::message::{IdentityPostProcessor, MessagePostProcessor};
use crate::properties::PropertyResolver;
use crate::registry::ComponentRegistry;

/// How a call is handed to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Publish and return; no reply is awaited
    FireAndForget,
    /// Publish and wait for the correlated reply
    RequestReply,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FireAndForget => f.write_str("fire-and-forget"),
            Self::RequestReply => f.write_str("request-reply"),
        }
    }
}

/// Compiled dispatch contract of one method
#[derive(Clone)]
pub struct CallMetadata {
    method_name: String,
    mode: DispatchMode,
    return_type: ReturnType,
    exchange: AddressResolver,
    routing_key: AddressResolver,
    post_processor: Arc<dyn MessagePostProcessor>,
    post_processor_name: Option<String>,
    payload_index: Option<usize>,
    header_map_index: Option<usize>,
    header_index_by_name: BTreeMap<String, usize>,
    param_count: usize,
}

impl CallMetadata {
    /// `Interface.method` name used in diagnostics
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn return_type(&self) -> &ReturnType {
        &self.return_type
    }

    pub fn exchange(&self) -> &AddressResolver {
        &self.exchange
    }

    pub fn routing_key(&self) -> &AddressResolver {
        &self.routing_key
    }

    pub fn post_processor(&self) -> &Arc<dyn MessagePostProcessor> {
        &self.post_processor
    }

    /// Registry name of the configured post-processor, `None` for identity
    pub fn post_processor_name(&self) -> Option<&str> {
        self.post_processor_name.as_deref()
    }

    pub fn payload_index(&self) -> Option<usize> {
        self.payload_index
    }

    pub fn header_map_index(&self) -> Option<usize> {
        self.header_map_index
    }

    pub fn header_index_by_name(&self) -> &BTreeMap<String, usize> {
        &self.header_index_by_name
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Payload argument of a call
    pub fn payload<'a>(&self, args: &'a [Value]) -> Option<&'a Value> {
        self.payload_index.and_then(|index| args.get(index))
    }

    /// Headers of a call: the header-map argument first, single headers on top
    pub fn headers(&self, args: &[Value]) -> Result<BTreeMap<String, Value>> {
        let mut headers = BTreeMap::new();

        if let Some(index) = self.header_map_index {
            match args.get(index) {
                Some(Value::Object(map)) => {
                    headers.extend(map.iter().map(|(name, value)| (name.clone(), value.clone())));
                }
                Some(Value::Null) | None => {}
                Some(other) => {
                    return Err(RabbitRpcError::InvalidHeaderMap {
                        method: self.method_name.clone(),
                        actual: json_kind(other).to_string(),
                    })
                }
            }
        }

        for (name, index) in &self.header_index_by_name {
            if let Some(value) = args.get(*index) {
                headers.insert(name.clone(), value.clone());
            }
        }

        Ok(headers)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl fmt::Debug for CallMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallMetadata")
            .field("method_name", &self.method_name)
            .field("mode", &self.mode)
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("post_processor", &self.post_processor_name)
            .field("payload_index", &self.payload_index)
            .field("header_map_index", &self.header_map_index)
            .field("header_index_by_name", &self.header_index_by_name)
            .finish()
    }
}

/// Compiled client: method identity to call metadata
#[derive(Debug, Clone)]
pub struct CompiledInterface {
    name: String,
    methods: HashMap<MethodId, CallMetadata>,
}

impl CompiledInterface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, method: &MethodId) -> Option<&CallMetadata> {
        self.methods.get(method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodId, &CallMetadata)> {
        self.methods.iter()
    }
}

/// Resolved components of one precedence level
#[derive(Default)]
struct ResolvedSender {
    exchange: Option<AddressResolver>,
    routing_key: Option<AddressResolver>,
    post_processor: Option<(String, Arc<dyn MessagePostProcessor>)>,
}

/// Compiles interface declarations into call metadata
#[derive(Debug, Clone)]
pub struct MetadataCompiler {
    properties: PropertyResolver,
    components: Arc<ComponentRegistry>,
}

impl MetadataCompiler {
    pub fn new(properties: PropertyResolver, components: Arc<ComponentRegistry>) -> Self {
        Self { properties, components }
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Compile every method of `interface`
    ///
    /// Fails on the first invalid method; no partial result is returned.
    pub fn compile(&self, interface: &InterfaceDecl) -> Result<CompiledInterface> {
        let defaults = self.resolve_sender(&interface.defaults, &interface.name)?;
        let mut methods = HashMap::with_capacity(interface.methods.len());

        for method in &interface.methods {
            let id = method.id();
            let metadata = self.compile_method(interface, method, &defaults)?;
            debug!("Compiled {} as {:?}", id, metadata);

            if methods.insert(id.clone(), metadata).is_some() {
                return Err(RabbitRpcError::DuplicateMethod {
                    interface: interface.name.clone(),
                    signature: id.to_string(),
                });
            }
        }

        info!("Compiled client {} ({} methods)", interface.name, methods.len());
        Ok(CompiledInterface {
            name: interface.name.clone(),
            methods,
        })
    }

    fn compile_method(
        &self,
        interface: &InterfaceDecl,
        method: &MethodDecl,
        defaults: &ResolvedSender,
    ) -> Result<CallMetadata> {
        let method_name = interface.qualified_name(method);

        // Method-level values win per field; unset fields fall back to the defaults
        let overrides = match &method.sender {
            Some(sender) => self.resolve_sender(sender, &method_name)?,
            None => ResolvedSender::default(),
        };

        let exchange = overrides
            .exchange
            .or_else(|| defaults.exchange.clone())
            .unwrap_or_default();
        let routing_key = overrides
            .routing_key
            .or_else(|| defaults.routing_key.clone())
            .unwrap_or_default();
        let (post_processor_name, post_processor) = match overrides
            .post_processor
            .or_else(|| defaults.post_processor.clone())
        {
            Some((name, post_processor)) => (Some(name), post_processor),
            None => (None, Arc::new(IdentityPostProcessor) as Arc<dyn MessagePostProcessor>),
        };

        let payload_index = payload_index(method, &method_name)?;
        let header_index_by_name = header_index_by_name(method, &method_name)?;
        let header_map_index = header_map_index(method, &method_name)?;

        for (index, param) in method.params.iter().enumerate() {
            let bound = index == payload_index
                || Some(index) == header_map_index
                || header_index_by_name.values().any(|i| *i == index);
            if !bound {
                warn!(
                    "Parameter '{}' of {} has no role and will not be sent",
                    param.name, method_name
                );
            }
        }

        let mode = if method.return_type.is_unit() {
            DispatchMode::FireAndForget
        } else {
            DispatchMode::RequestReply
        };

        Ok(CallMetadata {
            method_name,
            mode,
            return_type: method.return_type.clone(),
            exchange,
            routing_key,
            post_processor,
            post_processor_name,
            payload_index: Some(payload_index),
            header_map_index,
            header_index_by_name,
            param_count: method.params.len(),
        })
    }

    fn resolve_sender(&self, sender: &SenderAttributes, scope: &str) -> Result<ResolvedSender> {
        let exchange = AddressResolver::from_declaration(
            sender.exchange(),
            sender.exchange_generator(),
            AddressComponent::Exchange,
            scope,
            &self.properties,
            &self.components,
        )?;
        let routing_key = AddressResolver::from_declaration(
            sender.routing_key(),
            sender.routing_key_generator(),
            AddressComponent::RoutingKey,
            scope,
            &self.properties,
            &self.components,
        )?;
        let post_processor = match sender.message_post_processor() {
            Some(name) => Some((
                name.to_string(),
                self.components.require_post_processor(name, scope)?,
            )),
            None => None,
        };

        Ok(ResolvedSender {
            exchange,
            routing_key,
            post_processor,
        })
    }
}

fn payload_index(method: &MethodDecl, method_name: &str) -> Result<usize> {
    match method.params.as_slice() {
        [] => Err(RabbitRpcError::NoPayload {
            method: method_name.to_string(),
        }),
        [single] if single.is_header() => Err(RabbitRpcError::NoPayload {
            method: method_name.to_string(),
        }),
        [_] => Ok(0),
        params => {
            let marked: Vec<usize> = params
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_payload())
                .map(|(i, _)| i)
                .collect();

            match marked.as_slice() {
                [] => Err(RabbitRpcError::AmbiguousPayload {
                    method: method_name.to_string(),
                }),
                [index] => Ok(*index),
                _ => Err(RabbitRpcError::MultiplePayloads {
                    method: method_name.to_string(),
                    params: marked
                        .iter()
                        .map(|i| params[*i].name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                }),
            }
        }
    }
}

fn header_index_by_name(method: &MethodDecl, method_name: &str) -> Result<BTreeMap<String, usize>> {
    let mut index_by_name = BTreeMap::new();

    for (index, param) in method.params.iter().enumerate() {
        if let Some(header) = param.header_name() {
            if index_by_name.insert(header.to_string(), index).is_some() {
                return Err(RabbitRpcError::DuplicateHeader {
                    method: method_name.to_string(),
                    header: header.to_string(),
                });
            }
        }
    }

    Ok(index_by_name)
}

fn header_map_index(method: &MethodDecl, method_name: &str) -> Result<Option<usize>> {
    let mut candidates = method
        .params
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_header_map());

    let Some((index, param)) = candidates.next() else {
        return Ok(None);
    };
    if candidates.next().is_some() {
        return Err(RabbitRpcError::MultipleHeaderMaps {
            method: method_name.to_string(),
        });
    }
    if param.shape != ParamShape::StringMap {
        return Err(RabbitRpcError::HeaderMapType {
            method: method_name.to_string(),
            param: param.name.clone(),
            type_name: param.type_name.clone(),
        });
    }

    Ok(Some(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::ParamDecl;
    use crate::generator::{Invocation, KeyGenerator};
    use crate::message::OutboundMessage;
    use serde_json::json;

    const DEFAULT_EXCHANGE: &str = "default_exchange";
    const DEFAULT_QUEUE: &str = "default_queue";
    const METHOD_LEVEL_EXCHANGE: &str = "test_exchange";
    const METHOD_LEVEL_QUEUE: &str = "test_queue";

    fn tagging(tag: &'static str) -> Arc<dyn MessagePostProcessor> {
        Arc::new(move |message: OutboundMessage| -> Result<OutboundMessage> { Ok(message.with_header("tag", tag)) })
    }

    fn compiler() -> MetadataCompiler {
        let routing: Arc<dyn KeyGenerator> = Arc::new(|invocation: &Invocation<'_>| {
            invocation.arg(0).and_then(Value::as_str).map(|s| format!("generated.{}", s))
        });
        let components = ComponentRegistry::new()
            .with_post_processor("somePostProcessor", tagging("some"))
            .with_post_processor("anotherPostProcessor", tagging("another"))
            .with_routing_key_generator("customRoutingKeyGenerator", routing);
        MetadataCompiler::new(PropertyResolver::empty(), Arc::new(components))
    }

    fn string_method(name: &str) -> MethodDecl {
        MethodDecl::new(name)
            .with_param(ParamDecl::new("payload", "String"))
            .returns(ReturnType::value("String"))
    }

    fn resolve(resolver: &AddressResolver, args: &[Value]) -> Option<String> {
        let method = MethodId::from_static("test");
        resolver.resolve(&Invocation::new("Test", &method, args))
    }

    fn correct_client() -> InterfaceDecl {
        InterfaceDecl::new("CorrectClient")
            .with_defaults(
                SenderAttributes::new()
                    .with_exchange(DEFAULT_EXCHANGE)
                    .with_routing_key(DEFAULT_QUEUE),
            )
            .with_method(string_method("sendAndReceive").with_sender(
                SenderAttributes::new()
                    .with_exchange(METHOD_LEVEL_EXCHANGE)
                    .with_routing_key(METHOD_LEVEL_QUEUE)
                    .with_message_post_processor("somePostProcessor"),
            ))
            .with_method(
                MethodDecl::new("sendAndReceivePayloadAnnotation")
                    .with_param(ParamDecl::new("payload", "String").payload())
                    .returns(ReturnType::value("String"))
                    .with_sender(SenderAttributes::new().with_routing_key(METHOD_LEVEL_QUEUE)),
            )
            .with_method(
                MethodDecl::new("sendAndReceiveWithHeader")
                    .with_param(ParamDecl::new("someHeader", "String").header())
                    .with_param(ParamDecl::new("payload", "String").payload())
                    .returns(ReturnType::value("String"))
                    .with_sender(SenderAttributes::new().with_exchange(METHOD_LEVEL_EXCHANGE)),
            )
            .with_method(
                MethodDecl::new("sendAsync").with_param(ParamDecl::new("request", "TestRequest").payload()),
            )
    }

    #[test]
    fn test_correct_client_precedence() {
        let compiled = compiler().compile(&correct_client()).unwrap();
        assert_eq!(compiled.len(), 4);

        let send_and_receive = compiled.get(&MethodId::from_static("String::sendAndReceive::String")).unwrap();
        assert_eq!(resolve(send_and_receive.exchange(), &[]), Some(METHOD_LEVEL_EXCHANGE.to_string()));
        assert_eq!(resolve(send_and_receive.routing_key(), &[]), Some(METHOD_LEVEL_QUEUE.to_string()));
        assert_eq!(send_and_receive.post_processor_name(), Some("somePostProcessor"));
        assert_eq!(send_and_receive.payload(&[json!("test")]), Some(&json!("test")));

        let annotated = compiled
            .get(&MethodId::from_static("String::sendAndReceivePayloadAnnotation::String"))
            .unwrap();
        assert_eq!(resolve(annotated.exchange(), &[]), Some(DEFAULT_EXCHANGE.to_string()));
        assert_eq!(resolve(annotated.routing_key(), &[]), Some(METHOD_LEVEL_QUEUE.to_string()));
        assert_eq!(annotated.post_processor_name(), None);

        let with_header = compiled
            .get(&MethodId::from_static("String::sendAndReceiveWithHeader::String::String"))
            .unwrap();
        let args = [json!("header"), json!("payload")];
        assert_eq!(resolve(with_header.exchange(), &args), Some(METHOD_LEVEL_EXCHANGE.to_string()));
        assert_eq!(resolve(with_header.routing_key(), &args), Some(DEFAULT_QUEUE.to_string()));
        assert_eq!(with_header.payload(&args), Some(&json!("payload")));
        assert_eq!(with_header.headers(&args).unwrap().get("someHeader"), Some(&json!("header")));

        let asynchronous = compiled.get(&MethodId::from_static("()::sendAsync::TestRequest")).unwrap();
        assert_eq!(asynchronous.mode(), DispatchMode::FireAndForget);
        assert_eq!(resolve(asynchronous.exchange(), &[]), Some(DEFAULT_EXCHANGE.to_string()));
        assert_eq!(resolve(asynchronous.routing_key(), &[]), Some(DEFAULT_QUEUE.to_string()));
    }

    #[test]
    fn test_interface_post_processor_is_inherited_per_field() {
        let interface = InterfaceDecl::new("MethodPostProcessorOverridesDefault")
            .with_defaults(SenderAttributes::new().with_message_post_processor("somePostProcessor"))
            .with_method(string_method("defaultProcessor").with_sender(SenderAttributes::new()))
            .with_method(string_method("overrideProcessor").with_sender(
                SenderAttributes::new().with_message_post_processor("anotherPostProcessor"),
            ))
            .with_method(
                string_method("routingOnly").with_sender(SenderAttributes::new().with_routing_key("orders.priority")),
            );
        let compiled = compiler().compile(&interface).unwrap();

        let default = compiled.get(&MethodId::from_static("String::defaultProcessor::String")).unwrap();
        assert_eq!(default.post_processor_name(), Some("somePostProcessor"));

        let overridden = compiled.get(&MethodId::from_static("String::overrideProcessor::String")).unwrap();
        assert_eq!(overridden.post_processor_name(), Some("anotherPostProcessor"));
        let message = overridden.post_processor().post_process(OutboundMessage::new(Vec::new())).unwrap();
        assert_eq!(message.header("tag"), Some(&json!("another")));

        let routing_only = compiled.get(&MethodId::from_static("String::routingOnly::String")).unwrap();
        assert_eq!(routing_only.post_processor_name(), Some("somePostProcessor"));
        assert_eq!(resolve(routing_only.routing_key(), &[]), Some("orders.priority".to_string()));
    }

    #[test]
    fn test_generator_overrides_interface_literal() {
        let interface = InterfaceDecl::new("GeneratorTestingClient")
            .with_defaults(SenderAttributes::new().with_routing_key("fixed"))
            .with_method(string_method("generated").with_sender(
                SenderAttributes::new().with_routing_key_generator("customRoutingKeyGenerator"),
            ))
            .with_method(string_method("fixed"));
        let compiled = compiler().compile(&interface).unwrap();

        let generated = compiled.get(&MethodId::from_static("String::generated::String")).unwrap();
        assert_eq!(resolve(generated.routing_key(), &[json!("eu")]), Some("generated.eu".to_string()));

        let fixed = compiled.get(&MethodId::from_static("String::fixed::String")).unwrap();
        assert_eq!(resolve(fixed.routing_key(), &[json!("eu")]), Some("fixed".to_string()));
        assert!(fixed.exchange().is_absent());
        assert_eq!(fixed.post_processor_name(), None);
    }

    #[test]
    fn test_header_map_parameter() {
        let interface = InterfaceDecl::new("HeaderMapClient").with_method(
            MethodDecl::new("specifyHeaderMap")
                .with_param(ParamDecl::new("payload", "String").payload())
                .with_param(
                    ParamDecl::new("someHeaders", "HashMap<String,String>")
                        .with_shape(ParamShape::StringMap)
                        .headers(),
                )
                .returns(ReturnType::value("String")),
        );
        let compiled = compiler().compile(&interface).unwrap();
        let (_, metadata) = compiled.iter().next().unwrap();

        let args = [json!("some payload"), json!({"some_header": "some_value"})];
        assert_eq!(metadata.payload(&args), Some(&json!("some payload")));
        let headers = metadata.headers(&args).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("some_header"), Some(&json!("some_value")));

        let err = metadata.headers(&[json!("p"), json!(["not", "a", "map"])]).unwrap_err();
        assert!(matches!(err, RabbitRpcError::InvalidHeaderMap { .. }));
        assert!(metadata.headers(&[json!("p"), Value::Null]).unwrap().is_empty());
    }

    #[test]
    fn test_named_header_wins_over_header_map() {
        let interface = InterfaceDecl::new("HeaderClient").with_method(
            MethodDecl::new("send")
                .with_param(ParamDecl::new("payload", "String").payload())
                .with_param(
                    ParamDecl::new("bulk", "BTreeMap<String,i32>")
                        .with_shape(ParamShape::StringMap)
                        .headers(),
                )
                .with_param(ParamDecl::new("a", "i32").header()),
        );
        let compiled = compiler().compile(&interface).unwrap();
        let (_, metadata) = compiled.iter().next().unwrap();

        let headers = metadata
            .headers(&[json!("hello"), json!({"a": 1, "b": 3}), json!(2)])
            .unwrap();
        assert_eq!(headers.get("a"), Some(&json!(2)));
        assert_eq!(headers.get("b"), Some(&json!(3)));
    }

    #[test]
    fn test_single_param_is_payload_regardless_of_name() {
        for name in ["payload", "header", "trace", "x"] {
            let interface = InterfaceDecl::new("Implicit")
                .with_method(MethodDecl::new("send").with_param(ParamDecl::new(name, "u64")));
            let compiled = compiler().compile(&interface).unwrap();
            let (_, metadata) = compiled.iter().next().unwrap();
            assert_eq!(metadata.payload_index(), Some(0));
        }
    }

    #[test]
    fn test_single_header_map_is_payload_and_headers() {
        let interface = InterfaceDecl::new("HeaderMapOnly").with_method(
            MethodDecl::new("send").with_param(
                ParamDecl::new("attributes", "HashMap<String,String>")
                    .with_shape(ParamShape::StringMap)
                    .headers(),
            ),
        );
        let compiled = compiler().compile(&interface).unwrap();
        let (_, metadata) = compiled.iter().next().unwrap();
        assert_eq!(metadata.payload_index(), Some(0));
        assert_eq!(metadata.header_map_index(), Some(0));

        let args = [json!({"region": "eu"})];
        assert_eq!(metadata.payload(&args), Some(&json!({"region": "eu"})));
        assert_eq!(metadata.headers(&args).unwrap().get("region"), Some(&json!("eu")));
    }

    #[test]
    fn test_unit_value_return_is_fire_and_forget() {
        let interface = InterfaceDecl::new("HandWritten").with_method(
            MethodDecl::new("send")
                .with_param(ParamDecl::new("p", "String"))
                .returns(ReturnType::value("()")),
        );
        let compiled = compiler().compile(&interface).unwrap();
        let metadata = compiled.get(&MethodId::from_static("()::send::String")).unwrap();
        assert_eq!(metadata.mode(), DispatchMode::FireAndForget);
    }

    fn compile_error(method: MethodDecl) -> RabbitRpcError {
        compiler()
            .compile(&InterfaceDecl::new("BrokenClient").with_method(method))
            .unwrap_err()
    }

    #[test]
    fn test_missing_payload() {
        let err = compile_error(MethodDecl::new("noPayload").returns(ReturnType::value("String")));
        assert!(matches!(err, RabbitRpcError::NoPayload { ref method } if method == "BrokenClient.noPayload"));

        let err = compile_error(MethodDecl::new("onlyHeader").with_param(ParamDecl::new("someHeader", "String").header()));
        assert!(matches!(err, RabbitRpcError::NoPayload { .. }));
    }

    #[test]
    fn test_ambiguous_and_multiple_payloads() {
        let err = compile_error(
            MethodDecl::new("ambiguousParameters")
                .with_param(ParamDecl::new("somePayload", "String"))
                .with_param(ParamDecl::new("someHeader", "String").header()),
        );
        assert!(matches!(err, RabbitRpcError::AmbiguousPayload { .. }));

        let err = compile_error(
            MethodDecl::new("twoPayloads")
                .with_param(ParamDecl::new("first", "String").payload())
                .with_param(ParamDecl::new("second", "String").payload()),
        );
        assert!(matches!(err, RabbitRpcError::MultiplePayloads { ref params, .. } if params == "first, second"));
    }

    #[test]
    fn test_header_map_errors() {
        let err = compile_error(
            MethodDecl::new("twoMaps")
                .with_param(ParamDecl::new("payload", "String").payload())
                .with_param(ParamDecl::new("a", "HashMap<String,String>").with_shape(ParamShape::StringMap).headers())
                .with_param(ParamDecl::new("b", "HashMap<String,String>").with_shape(ParamShape::StringMap).headers()),
        );
        assert!(matches!(err, RabbitRpcError::MultipleHeaderMaps { .. }));

        let err = compile_error(
            MethodDecl::new("wrongType")
                .with_param(ParamDecl::new("payload", "String").payload())
                .with_param(ParamDecl::new("headers", "Vec<String>").headers()),
        );
        assert!(matches!(err, RabbitRpcError::HeaderMapType { ref type_name, .. } if type_name == "Vec<String>"));
    }

    #[test]
    fn test_binding_errors_for_addressing() {
        let err = compiler()
            .compile(
                &InterfaceDecl::new("Conflicting")
                    .with_defaults(SenderAttributes::new().with_exchange("orders").with_exchange_generator("gen"))
                    .with_method(string_method("send")),
            )
            .unwrap_err();
        assert!(matches!(err, RabbitRpcError::MutuallyExclusive { ref scope, .. } if scope == "Conflicting"));

        let err = compile_error(
            string_method("send").with_sender(SenderAttributes::new().with_routing_key("a").with_routing_key_generator("b")),
        );
        assert!(matches!(err, RabbitRpcError::MutuallyExclusive { field: "routing_key", .. }));

        let err = compile_error(string_method("send").with_sender(SenderAttributes::new().with_message_post_processor("nope")));
        assert!(matches!(err, RabbitRpcError::ComponentNotFound { .. }));
        assert!(err.is_binding_error());

        let err = compile_error(string_method("send").with_sender(SenderAttributes::new().with_exchange("${missing.exchange}")));
        assert!(matches!(err, RabbitRpcError::MissingProperty { .. }));
    }

    #[test]
    fn test_duplicate_header_and_method() {
        let err = compile_error(
            MethodDecl::new("send")
                .with_param(ParamDecl::new("payload", "String").payload())
                .with_param(ParamDecl::new("a", "String").named_header("trace"))
                .with_param(ParamDecl::new("b", "String").named_header("trace")),
        );
        assert!(matches!(err, RabbitRpcError::DuplicateHeader { ref header, .. } if header == "trace"));

        let err = compiler()
            .compile(
                &InterfaceDecl::new("Twice")
                    .with_method(string_method("send"))
                    .with_method(string_method("send")),
            )
            .unwrap_err();
        assert!(matches!(err, RabbitRpcError::DuplicateMethod { .. }));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let first = compiler().compile(&correct_client()).unwrap();
        let second = compiler().compile(&correct_client()).unwrap();
        let args = [json!("header"), json!("payload")];

        for (id, metadata) in first.iter() {
            let other = second.get(id).unwrap();
            assert_eq!(resolve(metadata.exchange(), &args), resolve(other.exchange(), &args));
            assert_eq!(resolve(metadata.routing_key(), &args), resolve(other.routing_key(), &args));
            assert_eq!(metadata.payload_index(), other.payload_index());
            assert_eq!(metadata.header_index_by_name(), other.header_index_by_name());
            assert_eq!(metadata.mode(), other.mode());
        }
    }
}
