//! Test fixtures for naming integration tests.

#![allow(dead_code)]

use lodestar_naming::{Instance, Service, Subscriber};
use std::collections::BTreeMap;

/// The ephemeral `orders` service in the default namespace and group.
pub fn orders() -> Service {
    Service::with_defaults("orders")
}

/// The persistent `ledger` service in the default namespace and group.
pub fn ledger() -> Service {
    Service::persistent("public", "DEFAULT_GROUP", "ledger")
}

/// Builder for creating test Instance values.
pub struct InstanceBuilder {
    ip: String,
    port: u32,
    weight: f64,
    cluster_name: String,
    metadata: BTreeMap<String, String>,
}

impl InstanceBuilder {
    /// Creates a builder for the given address.
    pub fn new(ip: &str, port: u32) -> Self {
        Self {
            ip: ip.to_string(),
            port,
            weight: 1.0,
            cluster_name: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the instance weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Sets the instance cluster.
    pub fn with_cluster(mut self, cluster: &str) -> Self {
        self.cluster_name = cluster.to_string();
        self
    }

    /// Adds one metadata entry.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Builds the Instance.
    pub fn build(self) -> Instance {
        Instance {
            ip: self.ip,
            port: self.port,
            weight: self.weight,
            cluster_name: self.cluster_name,
            metadata: self.metadata,
            ..Instance::default()
        }
    }
}

/// Builder for creating test Subscriber values.
pub struct SubscriberBuilder {
    ip: String,
    port: u16,
    app: String,
    service: Service,
}

impl SubscriberBuilder {
    /// Creates a builder for a subscriber watching `service`.
    pub fn new(service: &Service) -> Self {
        Self {
            ip: "10.0.0.9".to_string(),
            port: 5000,
            app: "billing".to_string(),
            service: service.clone(),
        }
    }

    /// Sets the watching application.
    pub fn with_app(mut self, app: &str) -> Self {
        self.app = app.to_string();
        self
    }

    /// Builds the Subscriber.
    pub fn build(self) -> Subscriber {
        Subscriber {
            addr: format!("{}:{}", self.ip, self.port),
            agent: "lodestar-client/1.0".to_string(),
            app: self.app,
            ip: self.ip,
            port: self.port,
            namespace_id: self.service.namespace().to_string(),
            service_name: self.service.grouped_name(),
            cluster: String::new(),
        }
    }
}
