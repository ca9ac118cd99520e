use std::sync::Arc;

use tracing::info;

use crate::declaration::InterfaceDecl;
use crate::dispatcher::GeneratedClient;
use crate::error::Result;
use crate::metadata::MetadataCompiler;
use crate::transport::Transport;

/// Implemented by every `#[rabbit_client]` struct
pub trait RabbitClientDefinition: Sized + Send + Sync + 'static {
    /// Registry name of the client
    fn qualifier() -> &'static str;

    fn declaration() -> InterfaceDecl;

    /// Wrap a client bound from [`RabbitClientDefinition::declaration`]
    fn from_client(client: GeneratedClient) -> Self;

    fn client(&self) -> &GeneratedClient;
}

/// Binds interface declarations to a transport
#[derive(Clone)]
pub struct RabbitClientFactory {
    transport: Arc<dyn Transport>,
    compiler: MetadataCompiler,
}

impl RabbitClientFactory {
    pub fn new(transport: Arc<dyn Transport>, compiler: MetadataCompiler) -> Self {
        Self { transport, compiler }
    }

    pub fn compiler(&self) -> &MetadataCompiler {
        &self.compiler
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Compile `interface` and attach the transport
    ///
    /// Every binding error of the declaration surfaces here.
    pub fn bind(&self, interface: &InterfaceDecl) -> Result<GeneratedClient> {
        let compiled = self.compiler.compile(interface)?;
        info!("Bound client {}", interface.name);
        Ok(GeneratedClient::new(compiled, self.transport.clone()))
    }

    /// Bind a generated client type
    pub fn create<C: RabbitClientDefinition>(&self) -> Result<C> {
        self.bind(&C::declaration()).map(C::from_client)
    }
}

impl std::fmt::Debug for RabbitClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitClientFactory")
            .field("compiler", &self.compiler)
            .finish()
    }
}
