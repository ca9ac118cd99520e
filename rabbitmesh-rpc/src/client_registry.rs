//! Registry of bound clients.
//!
//! `#[rabbit_client]` submits a [`ClientDescriptor`] through `inventory`, so
//! every client linked into the binary can be bound in one step at startup.

use std::collections::BTreeMap;

use tracing::info;

use crate::declaration::InterfaceDecl;
use crate::dispatcher::GeneratedClient;
use crate::error::{RabbitRpcError, Result};
use crate::factory::{RabbitClientDefinition, RabbitClientFactory};

/// Client definition registered by `#[rabbit_client]`
#[derive(Debug)]
pub struct ClientDescriptor {
    pub qualifier: &'static str,
    pub declaration: fn() -> InterfaceDecl,
}

impl ClientDescriptor {
    pub const fn new(qualifier: &'static str, declaration: fn() -> InterfaceDecl) -> Self {
        Self { qualifier, declaration }
    }
}

inventory::collect!(ClientDescriptor);

/// All client descriptors linked into the binary
pub fn registered_clients() -> Vec<&'static ClientDescriptor> {
    inventory::iter::<ClientDescriptor>.into_iter().collect()
}

/// Bound clients by qualifier
#[derive(Debug, Default, Clone)]
pub struct ClientRegistry {
    clients: BTreeMap<String, GeneratedClient>,
}

impl ClientRegistry {
    /// Bind every registered client
    ///
    /// Stops at the first binding error; no partial registry is returned.
    pub fn bind_all(factory: &RabbitClientFactory) -> Result<Self> {
        Self::bind_descriptors(factory, registered_clients())
    }

    pub fn bind_descriptors<'a>(
        factory: &RabbitClientFactory,
        descriptors: impl IntoIterator<Item = &'a ClientDescriptor>,
    ) -> Result<Self> {
        let mut registry = Self::default();
        for descriptor in descriptors {
            let client = factory.bind(&(descriptor.declaration)())?;
            registry.insert(descriptor.qualifier, client)?;
        }
        info!("Bound {} clients", registry.clients.len());
        Ok(registry)
    }

    /// Add a client bound elsewhere
    pub fn insert(&mut self, qualifier: impl Into<String>, client: GeneratedClient) -> Result<()> {
        let qualifier = qualifier.into();
        if self.clients.contains_key(&qualifier) {
            return Err(RabbitRpcError::DuplicateClient { qualifier });
        }
        self.clients.insert(qualifier, client);
        Ok(())
    }

    pub fn client(&self, qualifier: &str) -> Result<&GeneratedClient> {
        self.clients.get(qualifier).ok_or_else(|| RabbitRpcError::ClientNotFound {
            qualifier: qualifier.to_string(),
        })
    }

    /// Typed client registered under its own qualifier
    pub fn get<C: RabbitClientDefinition>(&self) -> Result<C> {
        self.get_named(C::qualifier())
    }

    /// Typed client registered under `qualifier`
    pub fn get_named<C: RabbitClientDefinition>(&self, qualifier: &str) -> Result<C> {
        self.client(qualifier).cloned().map(C::from_client)
    }

    pub fn qualifiers(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{MethodDecl, ParamDecl};
    use crate::memory::MemoryTransport;
    use crate::metadata::MetadataCompiler;
    use crate::properties::PropertyResolver;
    use crate::registry::ComponentRegistry;
    use std::sync::Arc;

    fn audit() -> InterfaceDecl {
        InterfaceDecl::new("AuditClient").with_method(MethodDecl::new("record").with_param(ParamDecl::new("event", "String")))
    }

    fn broken() -> InterfaceDecl {
        InterfaceDecl::new("BrokenClient").with_method(MethodDecl::new("record"))
    }

    fn factory() -> RabbitClientFactory {
        RabbitClientFactory::new(
            Arc::new(MemoryTransport::new()),
            MetadataCompiler::new(PropertyResolver::empty(), Arc::new(ComponentRegistry::new())),
        )
    }

    #[test]
    fn test_bind_descriptors() {
        let descriptors = [ClientDescriptor::new("audit", audit)];
        let registry = ClientRegistry::bind_descriptors(&factory(), &descriptors).unwrap();

        assert_eq!(registry.qualifiers().collect::<Vec<_>>(), vec!["audit"]);
        assert_eq!(registry.client("audit").unwrap().interface_name(), "AuditClient");
        assert!(matches!(
            registry.client("missing").unwrap_err(),
            RabbitRpcError::ClientNotFound { .. }
        ));
    }

    #[test]
    fn test_duplicate_qualifier() {
        let descriptors = [ClientDescriptor::new("audit", audit), ClientDescriptor::new("audit", audit)];
        let err = ClientRegistry::bind_descriptors(&factory(), &descriptors).unwrap_err();
        assert!(matches!(err, RabbitRpcError::DuplicateClient { ref qualifier } if qualifier == "audit"));
    }

    #[test]
    fn test_first_binding_error_aborts() {
        let descriptors = [ClientDescriptor::new("audit", audit), ClientDescriptor::new("broken", broken)];
        let err = ClientRegistry::bind_descriptors(&factory(), &descriptors).unwrap_err();
        assert!(matches!(err, RabbitRpcError::NoPayload { .. }));
    }
}
