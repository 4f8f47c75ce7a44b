//! Service descriptors and the singleton registry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::info;

/// Namespace used when a request does not name one.
pub const DEFAULT_NAMESPACE: &str = "public";

/// Group used when a request does not name one.
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

const GROUP_SEPARATOR: &str = "@@";

/// A service descriptor.
///
/// Identity is `(namespace, group, name)`. The `ephemeral` flag is not part of
/// identity: the registry keeps whichever flag the first lookup carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    namespace: String,
    group: String,
    name: String,
    ephemeral: bool,
}

impl Service {
    /// Creates a descriptor.
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
        ephemeral: bool,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            name: name.into(),
            ephemeral,
        }
    }

    /// Creates an ephemeral descriptor.
    pub fn ephemeral(
        namespace: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(namespace, group, name, true)
    }

    /// Creates a persistent descriptor.
    pub fn persistent(
        namespace: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(namespace, group, name, false)
    }

    /// Creates an ephemeral descriptor in the default namespace and group.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::ephemeral(DEFAULT_NAMESPACE, DEFAULT_GROUP, name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Returns `group@@name`.
    pub fn grouped_name(&self) -> String {
        format!("{}{GROUP_SEPARATOR}{}", self.group, self.name)
    }
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.group == other.group && self.name == other.name
    }
}

impl Eq for Service {}

impl Hash for Service {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.group.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{GROUP_SEPARATOR}{}", self.namespace, self.group, self.name)
    }
}

/// Interns service descriptors to canonical singleton handles.
pub trait ServiceRegistry: Send + Sync {
    /// Returns the singleton for this identity, creating it from the
    /// descriptor on first use. Concurrent first lookups yield one singleton.
    fn get_or_create(&self, service: &Service) -> Arc<Service>;

    /// Returns the singleton if one has been created.
    fn get_if_exists(&self, service: &Service) -> Option<Arc<Service>>;

    /// Returns true if a singleton exists for this identity.
    fn contains(&self, service: &Service) -> bool {
        self.get_if_exists(service).is_some()
    }
}

/// In-memory service registry for a single naming node.
///
/// Singletons live for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct InMemoryServiceRegistry {
    singletons: DashMap<Service, Arc<Service>>,
    /// Index of namespaces to the services created in them.
    namespaces: DashMap<String, HashSet<Arc<Service>>>,
}

impl InMemoryServiceRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists the singletons created in a namespace.
    pub fn services_in_namespace(&self, namespace: &str) -> Vec<Arc<Service>> {
        self.namespaces
            .get(namespace)
            .map(|services| services.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Lists namespaces that hold at least one service.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.iter().map(|r| r.key().clone()).collect()
    }

    /// Returns the number of singletons.
    pub fn len(&self) -> usize {
        self.singletons.len()
    }

    /// Returns true if no singleton has been created.
    pub fn is_empty(&self) -> bool {
        self.singletons.is_empty()
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn get_or_create(&self, service: &Service) -> Arc<Service> {
        if let Some(existing) = self.singletons.get(service) {
            return Arc::clone(existing.value());
        }

        match self.singletons.entry(service.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let singleton = Arc::new(service.clone());
                self.namespaces
                    .entry(singleton.namespace().to_owned())
                    .or_default()
                    .insert(Arc::clone(&singleton));
                entry.insert(Arc::clone(&singleton));
                info!(
                    service = %singleton,
                    ephemeral = singleton.is_ephemeral(),
                    "Service singleton created"
                );
                singleton
            }
        }
    }

    fn get_if_exists(&self, service: &Service) -> Option<Arc<Service>> {
        self.singletons.get(service).map(|r| Arc::clone(r.value()))
    }
}
