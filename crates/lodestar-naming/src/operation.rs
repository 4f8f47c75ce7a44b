//! Client operations for ephemeral clients and services.
//!
//! Each operation resolves the service singleton and the client, mutates the
//! client under its lock and then publishes events while still holding that
//! lock. Publishing under the lock makes the event order for one client match
//! the order in which its mutations were applied.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::client::{Client, ClientDirectory, Subscriber};
use crate::error::{NamingError, Result};
use crate::event::{EventSink, NamingEvent};
use crate::instance::{BatchInstancePublishInfo, Instance, InstancePublishInfo, InstanceValidator, Publication};
use crate::service::{Service, ServiceRegistry};

/// Result of an operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// State was mutated and events were emitted.
    Applied,
    /// Nothing was mutated and no event was emitted.
    Skipped(SkipReason),
}

impl Outcome {
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Why an operation was tolerated as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The client is no longer in the directory.
    ClientDisconnected,
    /// The client is persistent and the operation needs an ephemeral one.
    ClientNotEphemeral,
    /// Deregistration against a service that was never created.
    ServiceNotFound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientDisconnected => "client connection already disconnected",
            Self::ClientNotEphemeral => "client connection type is not ephemeral",
            Self::ServiceNotFound => "service does not exist",
        })
    }
}

/// Checks that a looked-up client may take part in an ephemeral operation.
pub fn check_ephemeral_client(client: Option<Arc<Client>>) -> std::result::Result<Arc<Client>, SkipReason> {
    let client = check_connected(client)?;
    if client.is_ephemeral() {
        Ok(client)
    } else {
        Err(SkipReason::ClientNotEphemeral)
    }
}

/// Checks only that a looked-up client is still connected.
pub fn check_connected(client: Option<Arc<Client>>) -> std::result::Result<Arc<Client>, SkipReason> {
    client.ok_or(SkipReason::ClientDisconnected)
}

/// Register, deregister and subscription operations bound to a client.
pub trait ClientOperationService: Send + Sync {
    /// Publishes one instance under a service.
    fn register_instance(&self, service: &Service, instance: &Instance, client_id: &str) -> Result<Outcome>;

    /// Publishes several instances under a service as one record.
    fn batch_register_instance(
        &self,
        service: &Service,
        instances: &[Instance],
        client_id: &str,
    ) -> Result<Outcome>;

    /// Withdraws the client's publication under a service.
    fn deregister_instance(&self, service: &Service, instance: &Instance, client_id: &str) -> Result<Outcome>;

    /// Starts watching a service.
    fn subscribe_service(&self, service: &Service, subscriber: Subscriber, client_id: &str) -> Result<Outcome>;

    /// Stops watching a service.
    fn unsubscribe_service(&self, service: &Service, subscriber: &Subscriber, client_id: &str) -> Result<Outcome>;
}

/// Client operations for connection-bound (ephemeral) clients.
pub struct EphemeralClientOperationService {
    registry: Arc<dyn ServiceRegistry>,
    clients: Arc<dyn ClientDirectory>,
    events: Arc<dyn EventSink>,
    validator: InstanceValidator,
}

impl EphemeralClientOperationService {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        clients: Arc<dyn ClientDirectory>,
        events: Arc<dyn EventSink>,
        validator: InstanceValidator,
    ) -> Self {
        Self {
            registry,
            clients,
            events,
            validator,
        }
    }

    /// Resolves the singleton and rejects persistent services.
    fn ephemeral_singleton(&self, service: &Service, operation: &'static str) -> Result<Arc<Service>> {
        let singleton = self.registry.get_or_create(service);
        if singleton.is_ephemeral() {
            Ok(singleton)
        } else {
            Err(NamingError::ServiceTypeMismatch {
                service: singleton.grouped_name(),
                operation,
            })
        }
    }

    /// Resolves the singleton without creating one.
    fn existing_or_descriptor(&self, service: &Service) -> Arc<Service> {
        self.registry
            .get_if_exists(service)
            .unwrap_or_else(|| Arc::new(service.clone()))
    }

    /// Shared tail of single and batch registration.
    fn publish(&self, singleton: Arc<Service>, publication: Publication, client: &Client, bump_revision: bool) {
        let metadata_id = publication.metadata_id().clone();

        let mut state = client.lock();
        state.set_publication(Arc::clone(&singleton), publication);
        state.touch();
        if bump_revision {
            state.bump_revision();
        }

        debug!(
            client_id = %client.id(),
            service = %singleton,
            revision = state.revision(),
            "Instance registered"
        );

        self.events.publish(NamingEvent::ClientRegisterService {
            service: Arc::clone(&singleton),
            client_id: client.id().to_owned(),
        });
        self.events.publish(NamingEvent::InstanceMetadata {
            service: singleton,
            metadata_id,
            removed: false,
        });
    }
}

impl ClientOperationService for EphemeralClientOperationService {
    fn register_instance(&self, service: &Service, instance: &Instance, client_id: &str) -> Result<Outcome> {
        self.validator.validate(instance)?;

        let singleton = self.ephemeral_singleton(service, "register")?;

        let client = match check_ephemeral_client(self.clients.get(client_id)) {
            Ok(client) => client,
            Err(reason) => return Ok(Outcome::Skipped(reason)),
        };

        let info = InstancePublishInfo::from_instance(instance);
        self.publish(singleton, Publication::Single(info), &client, true);
        Ok(Outcome::Applied)
    }

    // No per-instance legality check and no revision bump on this path.
    fn batch_register_instance(
        &self,
        service: &Service,
        instances: &[Instance],
        client_id: &str,
    ) -> Result<Outcome> {
        let singleton = self.ephemeral_singleton(service, "batch register")?;

        let client = match check_ephemeral_client(self.clients.get(client_id)) {
            Ok(client) => client,
            Err(reason) => return Ok(Outcome::Skipped(reason)),
        };

        let batch = BatchInstancePublishInfo::from_instances(instances);
        self.publish(singleton, Publication::Batch(batch), &client, false);
        Ok(Outcome::Applied)
    }

    fn deregister_instance(&self, service: &Service, instance: &Instance, client_id: &str) -> Result<Outcome> {
        let Some(singleton) = self.registry.get_if_exists(service) else {
            return Ok(Outcome::Skipped(SkipReason::ServiceNotFound));
        };

        let client = match check_ephemeral_client(self.clients.get(client_id)) {
            Ok(client) => client,
            Err(reason) => return Ok(Outcome::Skipped(reason)),
        };

        let mut state = client.lock();
        let removed = state.remove_publication(&singleton);
        state.touch();
        state.bump_revision();

        debug!(
            client_id = %client_id,
            service = %singleton,
            ip = %instance.ip,
            port = instance.port,
            removed = removed.is_some(),
            revision = state.revision(),
            "Instance deregistered"
        );

        if let Some(removed) = removed {
            self.events.publish(NamingEvent::ClientDeregisterService {
                service: Arc::clone(&singleton),
                client_id: client_id.to_owned(),
            });
            self.events.publish(NamingEvent::InstanceMetadata {
                service: singleton,
                metadata_id: removed.metadata_id().clone(),
                removed: true,
            });
        }

        Ok(Outcome::Applied)
    }

    fn subscribe_service(&self, service: &Service, subscriber: Subscriber, client_id: &str) -> Result<Outcome> {
        let singleton = self.existing_or_descriptor(service);

        let client = match check_connected(self.clients.get(client_id)) {
            Ok(client) => client,
            Err(reason) => return Ok(Outcome::Skipped(reason)),
        };

        let mut state = client.lock();
        state.set_subscriber(Arc::clone(&singleton), subscriber);
        state.touch();

        debug!(client_id = %client_id, service = %singleton, "Service subscribed");

        self.events.publish(NamingEvent::ClientSubscribeService {
            service: singleton,
            client_id: client_id.to_owned(),
        });

        Ok(Outcome::Applied)
    }

    // Emits even when there was no subscriber to remove.
    fn unsubscribe_service(&self, service: &Service, subscriber: &Subscriber, client_id: &str) -> Result<Outcome> {
        let singleton = self.existing_or_descriptor(service);

        let client = match check_connected(self.clients.get(client_id)) {
            Ok(client) => client,
            Err(reason) => return Ok(Outcome::Skipped(reason)),
        };

        let mut state = client.lock();
        let removed = state.remove_subscriber(&singleton);
        state.touch();

        debug!(
            client_id = %client_id,
            service = %singleton,
            agent = %subscriber.agent,
            removed = removed.is_some(),
            "Service unsubscribed"
        );

        self.events.publish(NamingEvent::ClientUnsubscribeService {
            service: singleton,
            client_id: client_id.to_owned(),
        });

        Ok(Outcome::Applied)
    }
}
