//! Common test utilities for naming integration tests.

#![allow(dead_code)]

pub mod fixtures;

use lodestar_naming::{
    ChannelEventSink, Client, EphemeralClientOperationService, InMemoryClientDirectory,
    InMemoryServiceRegistry, InstanceValidator, NamingEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Registry, directory and operations wired to a lossless event channel.
pub struct TestNaming {
    pub registry: Arc<InMemoryServiceRegistry>,
    pub clients: Arc<InMemoryClientDirectory>,
    pub operations: Arc<EphemeralClientOperationService>,
    pub events: UnboundedReceiver<NamingEvent>,
}

impl TestNaming {
    /// Creates a harness with default validation limits.
    pub fn new() -> Self {
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let clients = Arc::new(InMemoryClientDirectory::new());
        let (sink, events) = ChannelEventSink::channel();

        let operations = Arc::new(EphemeralClientOperationService::new(
            registry.clone(),
            clients.clone(),
            Arc::new(sink),
            InstanceValidator::default(),
        ));

        Self {
            registry,
            clients,
            operations,
            events,
        }
    }

    /// Connects an ephemeral client.
    pub fn connect_ephemeral(&self, id: &str) -> Arc<Client> {
        self.clients.connect(Client::new(id, true)).unwrap()
    }

    /// Connects a persistent client.
    pub fn connect_persistent(&self, id: &str) -> Arc<Client> {
        self.clients.connect(Client::new(id, false)).unwrap()
    }

    /// Returns every event published so far.
    pub fn drain_events(&mut self) -> Vec<NamingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for TestNaming {
    fn default() -> Self {
        Self::new()
    }
}
