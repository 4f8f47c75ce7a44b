//! Connected clients and the directory that tracks them.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{NamingError, Result};
use crate::instance::Publication;
use crate::service::Service;

/// Unique client identifier, assigned by the connection layer.
pub type ClientId = String;

/// An agent watching a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    /// Address the agent connected from.
    pub addr: String,
    /// Client agent string (name and version).
    pub agent: String,
    /// Application the agent belongs to.
    pub app: String,
    pub ip: String,
    pub port: u16,
    /// Namespace the agent watches.
    pub namespace_id: String,
    /// `group@@name` of the watched service.
    pub service_name: String,
    /// Comma-separated clusters of interest, empty for all.
    pub cluster: String,
}

/// A live client connection.
///
/// The connection layer creates and disposes of clients; client operations
/// only mutate the state behind [`Client::lock`].
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    ephemeral: bool,
    connected_at: DateTime<Utc>,
    state: Mutex<ClientState>,
}

impl Client {
    /// Creates a client with no publications or subscriptions.
    pub fn new(id: impl Into<ClientId>, ephemeral: bool) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            ephemeral,
            connected_at: now,
            state: Mutex::new(ClientState::new(now)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the client's publications are bound to its session.
    pub const fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Locks the client's mutable state.
    ///
    /// All mutations of one client are serialised through this lock.
    pub fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock()
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.state.lock().last_updated
    }

    /// Returns a copy of the publication under a service.
    pub fn publication(&self, service: &Service) -> Option<Publication> {
        self.state.lock().publication(service).cloned()
    }

    /// Returns a copy of the subscriber for a service.
    pub fn subscriber(&self, service: &Service) -> Option<Subscriber> {
        self.state.lock().subscriber(service).cloned()
    }

    pub fn published_services(&self) -> Vec<Arc<Service>> {
        self.state.lock().publications.keys().cloned().collect()
    }

    pub fn subscribed_services(&self) -> Vec<Arc<Service>> {
        self.state.lock().subscriptions.keys().cloned().collect()
    }
}

/// Mutable per-client state.
#[derive(Debug)]
pub struct ClientState {
    publications: HashMap<Arc<Service>, Publication>,
    subscriptions: HashMap<Arc<Service>, Subscriber>,
    last_updated: DateTime<Utc>,
    revision: u64,
}

impl ClientState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            publications: HashMap::new(),
            subscriptions: HashMap::new(),
            last_updated: now,
            revision: 0,
        }
    }

    /// Replaces the publication under a service, returning the previous one.
    pub fn set_publication(&mut self, service: Arc<Service>, publication: Publication) -> Option<Publication> {
        self.publications.insert(service, publication)
    }

    pub fn remove_publication(&mut self, service: &Service) -> Option<Publication> {
        self.publications.remove(service)
    }

    pub fn publication(&self, service: &Service) -> Option<&Publication> {
        self.publications.get(service)
    }

    /// Replaces the subscriber for a service, returning the previous one.
    pub fn set_subscriber(&mut self, service: Arc<Service>, subscriber: Subscriber) -> Option<Subscriber> {
        self.subscriptions.insert(service, subscriber)
    }

    pub fn remove_subscriber(&mut self, service: &Service) -> Option<Subscriber> {
        self.subscriptions.remove(service)
    }

    pub fn subscriber(&self, service: &Service) -> Option<&Subscriber> {
        self.subscriptions.get(service)
    }

    /// Records that the client changed now.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Advances the revision, returning the new value.
    pub fn bump_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

/// Lookup of live clients by id.
pub trait ClientDirectory: Send + Sync {
    /// Returns the client if it is still connected.
    fn get(&self, client_id: &str) -> Option<Arc<Client>>;
}

/// In-memory client directory.
///
/// The connection layer calls [`connect`](Self::connect) and
/// [`disconnect`](Self::disconnect); client operations only look clients up.
#[derive(Debug, Default)]
pub struct InMemoryClientDirectory {
    clients: DashMap<ClientId, Arc<Client>>,
}

impl InMemoryClientDirectory {
    /// Creates a new empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a newly connected client.
    pub fn connect(&self, client: Client) -> Result<Arc<Client>> {
        match self.clients.entry(client.id.clone()) {
            Entry::Occupied(entry) => {
                debug!(client_id = %entry.key(), "Client already connected");
                Err(NamingError::ClientAlreadyConnected(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                info!(client_id = %client.id, ephemeral = client.ephemeral, "Client connected");
                let client = Arc::new(client);
                entry.insert(Arc::clone(&client));
                Ok(client)
            }
        }
    }

    /// Removes a client, returning it if it was connected.
    pub fn disconnect(&self, client_id: &str) -> Option<Arc<Client>> {
        let removed = self.clients.remove(client_id).map(|(_, client)| client);
        if removed.is_some() {
            info!(client_id = %client_id, "Client disconnected");
        } else {
            debug!(client_id = %client_id, "Client not found for disconnect");
        }
        removed
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Returns all connected client ids.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|r| r.key().clone()).collect()
    }

    /// Returns the number of connected clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no client is connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl ClientDirectory for InMemoryClientDirectory {
    fn get(&self, client_id: &str) -> Option<Arc<Client>> {
        self.clients.get(client_id).map(|r| Arc::clone(r.value()))
    }
}
