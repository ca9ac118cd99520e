use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ComponentKind, RabbitRpcError, Result};
use crate::generator::KeyGenerator;
use crate::message::MessagePostProcessor;

/// Named components client declarations can refer to
///
/// Declarations refer to generators and post-processors by name; the
/// registry is handed to the metadata compiler, which resolves every name
/// once when a client is bound.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    exchange_generators: HashMap<String, Arc<dyn KeyGenerator>>,
    routing_key_generators: HashMap<String, Arc<dyn KeyGenerator>>,
    post_processors: HashMap<String, Arc<dyn MessagePostProcessor>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exchange_generator(mut self, name: impl Into<String>, generator: Arc<dyn KeyGenerator>) -> Self {
        self.register_exchange_generator(name, generator);
        self
    }

    pub fn with_routing_key_generator(mut self, name: impl Into<String>, generator: Arc<dyn KeyGenerator>) -> Self {
        self.register_routing_key_generator(name, generator);
        self
    }

    pub fn with_post_processor(mut self, name: impl Into<String>, post_processor: Arc<dyn MessagePostProcessor>) -> Self {
        self.register_post_processor(name, post_processor);
        self
    }

    pub fn register_exchange_generator(&mut self, name: impl Into<String>, generator: Arc<dyn KeyGenerator>) {
        self.exchange_generators.insert(name.into(), generator);
    }

    pub fn register_routing_key_generator(&mut self, name: impl Into<String>, generator: Arc<dyn KeyGenerator>) {
        self.routing_key_generators.insert(name.into(), generator);
    }

    pub fn register_post_processor(&mut self, name: impl Into<String>, post_processor: Arc<dyn MessagePostProcessor>) {
        self.post_processors.insert(name.into(), post_processor);
    }

    /// Look up a generator of the given kind
    pub fn generator(&self, kind: ComponentKind, name: &str) -> Option<Arc<dyn KeyGenerator>> {
        let generators = match kind {
            ComponentKind::ExchangeGenerator => &self.exchange_generators,
            ComponentKind::RoutingKeyGenerator => &self.routing_key_generators,
            ComponentKind::MessagePostProcessor => return None,
        };
        generators.get(name).cloned()
    }

    pub fn post_processor(&self, name: &str) -> Option<Arc<dyn MessagePostProcessor>> {
        self.post_processors.get(name).cloned()
    }

    pub(crate) fn require_generator(&self, kind: ComponentKind, name: &str, scope: &str) -> Result<Arc<dyn KeyGenerator>> {
        self.generator(kind, name).ok_or_else(|| RabbitRpcError::ComponentNotFound {
            name: name.to_string(),
            kind,
            scope: scope.to_string(),
        })
    }

    pub(crate) fn require_post_processor(&self, name: &str, scope: &str) -> Result<Arc<dyn MessagePostProcessor>> {
        self.post_processor(name).ok_or_else(|| RabbitRpcError::ComponentNotFound {
            name: name.to_string(),
            kind: ComponentKind::MessagePostProcessor,
            scope: scope.to_string(),
        })
    }
}

fn sorted_names<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("exchange_generators", &sorted_names(&self.exchange_generators))
            .field("routing_key_generators", &sorted_names(&self.routing_key_generators))
            .field("post_processors", &sorted_names(&self.post_processors))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Invocation;
    use crate::message::IdentityPostProcessor;

    #[test]
    fn test_lookup_by_kind() {
        let generator: Arc<dyn KeyGenerator> = Arc::new(|_: &Invocation<'_>| Some("orders".to_string()));
        let registry = ComponentRegistry::new()
            .with_exchange_generator("tenantExchange", generator)
            .with_post_processor("identity", Arc::new(IdentityPostProcessor));

        assert!(registry.generator(ComponentKind::ExchangeGenerator, "tenantExchange").is_some());
        assert!(registry.generator(ComponentKind::RoutingKeyGenerator, "tenantExchange").is_none());
        assert!(registry.post_processor("identity").is_some());

        let err = registry.require_post_processor("missing", "OrderClient").err().unwrap();
        assert!(matches!(
            err,
            RabbitRpcError::ComponentNotFound { kind: ComponentKind::MessagePostProcessor, .. }
        ));
    }
}
