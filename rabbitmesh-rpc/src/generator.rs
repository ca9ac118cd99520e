//! Address resolution for the exchange and routing key of a call.
//!
//! A resolver either carries a value fixed at bind time or forwards every
//! call to a named [`KeyGenerator`], so routing can depend on the arguments
//! of the call (sharding by a payload field, per-tenant exchanges, ...)
//! without the dispatcher knowing which one it got.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::declaration::MethodId;
use crate::error::{ComponentKind, RabbitRpcError, Result};
use crate::properties::PropertyResolver;
use crate::registry::ComponentRegistry;

/// A single call as seen by key generators
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Name of the client interface the call goes through
    pub interface: &'a str,
    pub method: &'a MethodId,
    /// Serialized arguments in declaration order
    pub args: &'a [Value],
}

impl<'a> Invocation<'a> {
    pub fn new(interface: &'a str, method: &'a MethodId, args: &'a [Value]) -> Self {
        Self {
            interface,
            method,
            args,
        }
    }

    /// Argument at `index`, if present
    pub fn arg(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index)
    }
}

/// Computes an exchange or routing key per call
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, invocation: &Invocation<'_>) -> Option<String>;
}

impl<F> KeyGenerator for F
where
    F: Fn(&Invocation<'_>) -> Option<String> + Send + Sync,
{
    fn generate(&self, invocation: &Invocation<'_>) -> Option<String> {
        self(invocation)
    }
}

/// Which address component a resolver produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressComponent {
    Exchange,
    RoutingKey,
}

impl AddressComponent {
    fn field(self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::RoutingKey => "routing_key",
        }
    }

    fn generator_field(self) -> &'static str {
        match self {
            Self::Exchange => "exchange_generator",
            Self::RoutingKey => "routing_key_generator",
        }
    }

    pub(crate) fn generator_kind(self) -> ComponentKind {
        match self {
            Self::Exchange => ComponentKind::ExchangeGenerator,
            Self::RoutingKey => ComponentKind::RoutingKeyGenerator,
        }
    }
}

/// Resolver for one address component of a method
#[derive(Clone)]
pub enum AddressResolver {
    /// Value fixed at bind time; `None` lets the transport use its default
    Constant(Option<String>),
    /// Forwards every call to a registered generator
    Delegating {
        name: String,
        generator: Arc<dyn KeyGenerator>,
    },
}

impl AddressResolver {
    /// Resolver that never yields an address
    pub fn absent() -> Self {
        Self::Constant(None)
    }

    pub fn constant(value: impl Into<String>) -> Self {
        Self::Constant(Some(value.into()))
    }

    pub fn delegating(name: impl Into<String>, generator: Arc<dyn KeyGenerator>) -> Self {
        Self::Delegating {
            name: name.into(),
            generator,
        }
    }

    pub fn resolve(&self, invocation: &Invocation<'_>) -> Option<String> {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Delegating { generator, .. } => generator.generate(invocation),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Constant(None))
    }

    /// Build the resolver declared by one precedence level
    ///
    /// Returns `Ok(None)` when neither the literal nor the generator is set,
    /// so the caller can fall back to the next level.
    pub(crate) fn from_declaration(
        literal: Option<&str>,
        generator: Option<&str>,
        component: AddressComponent,
        scope: &str,
        properties: &PropertyResolver,
        components: &ComponentRegistry,
    ) -> Result<Option<Self>> {
        match (literal, generator) {
            (Some(_), Some(_)) => Err(RabbitRpcError::MutuallyExclusive {
                scope: scope.to_string(),
                field: component.field(),
                generator_field: component.generator_field(),
            }),
            (Some(literal), None) => {
                let value = properties.replace_if_property(literal)?;
                Ok(Some(Self::Constant(Some(value))))
            }
            (None, Some(name)) => {
                let generator = components.require_generator(component.generator_kind(), name, scope)?;
                Ok(Some(Self::delegating(name, generator)))
            }
            (None, None) => Ok(None),
        }
    }
}

impl Default for AddressResolver {
    fn default() -> Self {
        Self::absent()
    }
}

impl fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Delegating { name, .. } => f.debug_struct("Delegating").field("name", name).finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn shard_generator() -> Arc<dyn KeyGenerator> {
        Arc::new(|invocation: &Invocation<'_>| {
            invocation
                .arg(0)
                .and_then(|payload| payload.get("region"))
                .and_then(Value::as_str)
                .map(|region| format!("orders.{}", region))
        })
    }

    #[test]
    fn test_constant_ignores_inputs() {
        let method = MethodId::from_static("()::send::String");
        let resolver = AddressResolver::constant("orders");
        let args = [json!("payload")];

        assert_eq!(resolver.resolve(&Invocation::new("OrderClient", &method, &args)), Some("orders".to_string()));
        assert_eq!(AddressResolver::absent().resolve(&Invocation::new("OrderClient", &method, &[])), None);
    }

    #[test]
    fn test_delegating_forwards_invocation() {
        let method = MethodId::from_static("()::place::Order");
        let resolver = AddressResolver::delegating("shard", shard_generator());

        let eu = [json!({"region": "eu"})];
        let none = [json!({"id": 1})];
        assert_eq!(resolver.resolve(&Invocation::new("OrderClient", &method, &eu)), Some("orders.eu".to_string()));
        assert_eq!(resolver.resolve(&Invocation::new("OrderClient", &method, &none)), None);
    }

    #[test]
    fn test_from_declaration_rules() {
        let mut properties = HashMap::new();
        properties.insert("orders.exchange".to_string(), "orders-prod".to_string());
        let properties = PropertyResolver::new(properties);
        let components = ComponentRegistry::new().with_routing_key_generator("shard", shard_generator());

        let both = AddressResolver::from_declaration(
            Some("orders"),
            Some("shard"),
            AddressComponent::Exchange,
            "OrderClient",
            &properties,
            &components,
        );
        assert!(matches!(both, Err(RabbitRpcError::MutuallyExclusive { field: "exchange", .. })));

        let literal = AddressResolver::from_declaration(
            Some("${orders.exchange}"),
            None,
            AddressComponent::Exchange,
            "OrderClient",
            &properties,
            &components,
        )
        .unwrap();
        assert!(matches!(literal, Some(AddressResolver::Constant(Some(ref v))) if v == "orders-prod"));

        // Generators are looked up per component kind
        let wrong_kind = AddressResolver::from_declaration(
            None,
            Some("shard"),
            AddressComponent::Exchange,
            "OrderClient",
            &properties,
            &components,
        );
        assert!(matches!(
            wrong_kind,
            Err(RabbitRpcError::ComponentNotFound { kind: ComponentKind::ExchangeGenerator, .. })
        ));

        let unset = AddressResolver::from_declaration(
            None,
            None,
            AddressComponent::RoutingKey,
            "OrderClient",
            &properties,
            &components,
        )
        .unwrap();
        assert!(unset.is_none());
    }
}
