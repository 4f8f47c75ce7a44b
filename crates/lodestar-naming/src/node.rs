//! Wiring of a single naming node.

use std::sync::Arc;
use tracing::info;

use crate::client::InMemoryClientDirectory;
use crate::config::NamingConfig;
use crate::event::FanoutEventSink;
use crate::handler::RequestHandler;
use crate::instance::InstanceValidator;
use crate::operation::EphemeralClientOperationService;
use crate::service::InMemoryServiceRegistry;

/// Registry, directory, event sink, operations and handler of one node.
pub struct NamingNode {
    pub registry: Arc<InMemoryServiceRegistry>,
    pub clients: Arc<InMemoryClientDirectory>,
    pub events: Arc<FanoutEventSink>,
    pub operations: Arc<EphemeralClientOperationService>,
    pub handler: RequestHandler,
}

impl NamingNode {
    /// Builds a node from configuration.
    pub fn new(config: &NamingConfig) -> Self {
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let clients = Arc::new(InMemoryClientDirectory::new());
        let events = Arc::new(FanoutEventSink::new());

        let operations = Arc::new(EphemeralClientOperationService::new(
            registry.clone(),
            clients.clone(),
            events.clone(),
            InstanceValidator::new(config.validation.clone()),
        ));
        let handler = RequestHandler::new(operations.clone());

        info!(
            min_weight = config.validation.min_weight,
            max_weight = config.validation.max_weight,
            "Naming node initialised"
        );

        Self {
            registry,
            clients,
            events,
            operations,
            handler,
        }
    }
}

impl Default for NamingNode {
    fn default() -> Self {
        Self::new(&NamingConfig::default())
    }
}
