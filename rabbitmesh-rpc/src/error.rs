use std::fmt;

use thiserror::Error;

/// Result type alias for rabbitmesh-rpc operations
pub type Result<T> = std::result::Result<T, RabbitRpcError>;

/// Kind of named component a client declaration can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    ExchangeGenerator,
    RoutingKeyGenerator,
    MessagePostProcessor,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExchangeGenerator => "exchange generator",
            Self::RoutingKeyGenerator => "routing key generator",
            Self::MessagePostProcessor => "message post-processor",
        };
        f.write_str(name)
    }
}

/// Error types for client binding and call dispatch
///
/// Binding errors are raised once, when an interface is compiled into a
/// client. Everything else is raised by an individual call.
#[derive(Error, Debug)]
pub enum RabbitRpcError {
    /// A literal and a generator were both given for the same address field
    #[error("Both '{field}' and '{generator_field}' specified in {scope}, although they are mutually exclusive")]
    MutuallyExclusive {
        scope: String,
        field: &'static str,
        generator_field: &'static str,
    },

    /// A named generator or post-processor is missing from the component registry
    #[error("Required {kind} with name \"{name}\" could not be found, although it is required by {scope}")]
    ComponentNotFound {
        name: String,
        kind: ComponentKind,
        scope: String,
    },

    #[error("No payload parameter found in {method}. At least one payload parameter must be present; a single parameter not marked as a header is also considered the payload")]
    NoPayload { method: String },

    #[error("Multiple parameters specified in {method}, but none of them is marked as payload")]
    AmbiguousPayload { method: String },

    #[error("Multiple payload parameters ({params}) specified in {method}, while exactly one is allowed")]
    MultiplePayloads { method: String, params: String },

    #[error("Multiple header-map parameters specified in {method}, while a maximum of 1 is allowed")]
    MultipleHeaderMaps { method: String },

    #[error("Header-map parameter '{param}' of {method} must be a string-keyed map, while it has type {type_name}")]
    HeaderMapType {
        method: String,
        param: String,
        type_name: String,
    },

    #[error("Header '{header}' is bound to more than one parameter of {method}")]
    DuplicateHeader { method: String, header: String },

    #[error("Method signature {signature} is declared more than once in {interface}")]
    DuplicateMethod { interface: String, signature: String },

    /// Placeholder could not be resolved and carries no default value
    #[error("Could not resolve placeholder '{key}': missing required property")]
    MissingProperty { key: String },

    #[error("Circular placeholder reference '{key}' in property definitions")]
    CircularPlaceholder { key: String },

    #[error("Client '{qualifier}' is registered more than once")]
    DuplicateClient { qualifier: String },

    #[error("No client registered under '{qualifier}'")]
    ClientNotFound { qualifier: String },

    /// Method identity missing from a compiled client
    #[error("No call metadata for {signature} in {interface}")]
    UnknownMethod { interface: String, signature: String },

    #[error("{method} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("Header-map argument of {method} must be a JSON object, got {actual}")]
    InvalidHeaderMap { method: String, actual: String },

    #[error("{method} is dispatched as {actual}, but was invoked as {requested}")]
    DispatchMode {
        method: String,
        actual: crate::metadata::DispatchMode,
        requested: crate::metadata::DispatchMode,
    },

    /// Reply arrived but does not match the declared return type
    #[error("Failed to decode reply of {method} into {type_name}: {source}")]
    Decode {
        method: String,
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    /// AMQP connection errors
    #[error("AMQP connection error: {0}")]
    Connection(#[from] lapin::Error),

    /// Message serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reply timeout
    #[error("RPC call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Message post-processing failed: {0}")]
    PostProcess(String),

    /// Settings loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Internal framework errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic errors from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RabbitRpcError {
    /// Create a new transport error
    pub fn transport_error<T: ToString>(message: T) -> Self {
        Self::Transport(message.to_string())
    }

    /// Create a new post-processing error
    pub fn post_process_error<T: ToString>(message: T) -> Self {
        Self::PostProcess(message.to_string())
    }

    /// Create a new internal error
    pub fn internal_error<T: ToString>(message: T) -> Self {
        Self::Internal(message.to_string())
    }

    /// Check if the error was raised while binding a client declaration
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            Self::MutuallyExclusive { .. }
                | Self::ComponentNotFound { .. }
                | Self::NoPayload { .. }
                | Self::AmbiguousPayload { .. }
                | Self::MultiplePayloads { .. }
                | Self::MultipleHeaderMaps { .. }
                | Self::HeaderMapType { .. }
                | Self::DuplicateHeader { .. }
                | Self::DuplicateMethod { .. }
                | Self::MissingProperty { .. }
                | Self::CircularPlaceholder { .. }
                | Self::DuplicateClient { .. }
        )
    }

    /// Check if error is recoverable (the caller may retry the call)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let binding = RabbitRpcError::AmbiguousPayload {
            method: "OrderClient.place".to_string(),
        };
        assert!(binding.is_binding_error());
        assert!(!binding.is_recoverable());

        let timeout = RabbitRpcError::Timeout { timeout_ms: 5_000 };
        assert!(!timeout.is_binding_error());
        assert!(timeout.is_recoverable());

        let internal = RabbitRpcError::Internal("Reply channel closed".to_string());
        assert!(!internal.is_recoverable());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = RabbitRpcError::ComponentNotFound {
            name: "shardRouter".to_string(),
            kind: ComponentKind::RoutingKeyGenerator,
            scope: "OrderClient.place".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("routing key generator"));
        assert!(message.contains("shardRouter"));
        assert!(message.contains("OrderClient.place"));
    }
}
