//! Interface declarations: the input of the metadata compiler.
//!
//! A declaration describes a client contract the way `#[rabbit_client]`
//! sees it: interface-level addressing defaults, and per method the
//! parameter list with role annotations, the return type and optional
//! method-level overrides. Declarations are plain data and can be built by
//! hand for interfaces that do not go through the macro.

use std::borrow::{Borrow, Cow};
use std::fmt;

/// Addressing and post-processing attributes of a client or a single method
///
/// Empty strings are treated the same as unset values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderAttributes {
    /// Literal exchange name, may be a `${...}` property reference
    pub exchange: Option<String>,
    /// Name of a registered exchange generator
    pub exchange_generator: Option<String>,
    /// Literal routing key, may be a `${...}` property reference
    pub routing_key: Option<String>,
    /// Name of a registered routing key generator
    pub routing_key_generator: Option<String>,
    /// Name of a registered message post-processor
    pub message_post_processor: Option<String>,
}

impl SenderAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    pub fn with_exchange_generator(mut self, generator: impl Into<String>) -> Self {
        self.exchange_generator = Some(generator.into());
        self
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    pub fn with_routing_key_generator(mut self, generator: impl Into<String>) -> Self {
        self.routing_key_generator = Some(generator.into());
        self
    }

    pub fn with_message_post_processor(mut self, post_processor: impl Into<String>) -> Self {
        self.message_post_processor = Some(post_processor.into());
        self
    }

    pub(crate) fn exchange(&self) -> Option<&str> {
        non_empty(&self.exchange)
    }

    pub(crate) fn exchange_generator(&self) -> Option<&str> {
        non_empty(&self.exchange_generator)
    }

    pub(crate) fn routing_key(&self) -> Option<&str> {
        non_empty(&self.routing_key)
    }

    pub(crate) fn routing_key_generator(&self) -> Option<&str> {
        non_empty(&self.routing_key_generator)
    }

    pub(crate) fn message_post_processor(&self) -> Option<&str> {
        non_empty(&self.message_post_processor)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Role of a method parameter in the outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamRole {
    /// The parameter is the message body
    Payload,
    /// The parameter is a single header; the name defaults to the parameter name
    Header(Option<String>),
    /// The parameter is a map of headers
    HeaderMap,
}

/// Declared shape of a parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamShape {
    #[default]
    Value,
    /// A map keyed by strings, usable as a header map
    StringMap,
}

/// One parameter of a method declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: String,
    pub type_name: String,
    pub shape: ParamShape,
    pub role: Option<ParamRole>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            shape: ParamShape::Value,
            role: None,
        }
    }

    pub fn with_shape(mut self, shape: ParamShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_role(mut self, role: ParamRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Mark the parameter as the payload
    pub fn payload(self) -> Self {
        self.with_role(ParamRole::Payload)
    }

    /// Mark the parameter as a header named after the parameter
    pub fn header(self) -> Self {
        self.with_role(ParamRole::Header(None))
    }

    /// Mark the parameter as a header with an explicit name
    pub fn named_header(self, header: impl Into<String>) -> Self {
        self.with_role(ParamRole::Header(Some(header.into())))
    }

    /// Mark the parameter as a header map
    pub fn headers(self) -> Self {
        self.with_role(ParamRole::HeaderMap)
    }

    pub fn is_payload(&self) -> bool {
        matches!(self.role, Some(ParamRole::Payload))
    }

    pub fn is_header(&self) -> bool {
        matches!(self.role, Some(ParamRole::Header(_)))
    }

    pub fn is_header_map(&self) -> bool {
        matches!(self.role, Some(ParamRole::HeaderMap))
    }

    /// Header name of a header parameter
    pub fn header_name(&self) -> Option<&str> {
        match &self.role {
            Some(ParamRole::Header(Some(name))) if !name.is_empty() => Some(name),
            Some(ParamRole::Header(_)) => Some(&self.name),
            _ => None,
        }
    }
}

/// Return type of a method declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    /// No value: the call is fire-and-forget
    Unit,
    /// A value decoded from the reply
    Value(String),
}

impl ReturnType {
    /// Return type named `type_name`; `"()"` is [`ReturnType::Unit`]
    pub fn value(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        if type_name == "()" {
            Self::Unit
        } else {
            Self::Value(type_name)
        }
    }

    pub fn is_unit(&self) -> bool {
        match self {
            Self::Unit => true,
            Self::Value(name) => name == "()",
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::Unit => "()",
            Self::Value(name) => name,
        }
    }
}

/// One method of an interface declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub return_type: ReturnType,
    /// Method-level overrides; `None` when the method carries no sender attribute
    pub sender: Option<SenderAttributes>,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: ReturnType::Unit,
            sender: None,
        }
    }

    pub fn with_param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_sender(mut self, sender: SenderAttributes) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Signature-aware identity of this method
    pub fn id(&self) -> MethodId {
        MethodId::new(
            self.return_type.type_name(),
            &self.name,
            self.params.iter().map(|p| p.type_name.as_str()),
        )
    }
}

/// A client contract: interface-level defaults plus its methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDecl {
    pub name: String,
    pub defaults: SenderAttributes,
    pub methods: Vec<MethodDecl>,
}

impl InterfaceDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: SenderAttributes::default(),
            methods: Vec::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: SenderAttributes) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    /// `Interface.method` name used in diagnostics
    pub fn qualified_name(&self, method: &MethodDecl) -> String {
        format!("{}.{}", self.name, method.name)
    }
}

/// Method identity: return type, name and ordered parameter types
///
/// Rendered as `ret::name::p1::p2`, so overloads with different parameter
/// lists get different identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(Cow<'static, str>);

impl MethodId {
    pub fn new<'a>(
        return_type: &str,
        name: &str,
        param_types: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let params: Vec<&str> = param_types.into_iter().collect();
        Self(Cow::Owned(format!(
            "{}::{}::{}",
            return_type,
            name,
            params.join("::")
        )))
    }

    /// Identity from a signature computed at compile time
    pub const fn from_static(signature: &'static str) -> Self {
        Self(Cow::Borrowed(signature))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MethodId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
