//! Instances as sent by clients and as published on their behalf.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ValidationConfig;
use crate::error::{NamingError, Result};

/// Cluster used when an instance does not name one.
pub const DEFAULT_CLUSTER: &str = "DEFAULT";

/// Weight used when an instance does not set one.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Metadata key overriding the heartbeat interval, in milliseconds.
pub const HEARTBEAT_INTERVAL_KEY: &str = "preserved.heart.beat.interval";

/// Metadata key overriding the heartbeat timeout, in milliseconds.
pub const HEARTBEAT_TIMEOUT_KEY: &str = "preserved.heart.beat.timeout";

/// Metadata key overriding the ip-delete timeout, in milliseconds.
pub const IP_DELETE_TIMEOUT_KEY: &str = "preserved.ip.delete.timeout";

const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;
const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_IP_DELETE_TIMEOUT_MS: u64 = 30_000;

/// An instance as described by the registering client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Instance {
    pub ip: String,
    pub port: u32,
    pub weight: f64,
    pub healthy: bool,
    pub enabled: bool,
    pub ephemeral: bool,
    pub cluster_name: String,
    pub metadata: BTreeMap<String, String>,
}

impl Instance {
    /// Creates a healthy, enabled, ephemeral instance with default weight.
    pub fn new(ip: impl Into<String>, port: u32) -> Self {
        Self {
            ip: ip.into(),
            port,
            ..Self::default()
        }
    }

    fn heartbeat_setting(&self, key: &'static str, default_ms: u64) -> Result<u64> {
        match self.metadata.get(key) {
            None => Ok(default_ms),
            Some(raw) => raw.trim().parse().map_err(|_| {
                NamingError::validation("metadata", format!("{key} must be milliseconds, got {raw:?}"))
            }),
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: 0,
            weight: DEFAULT_WEIGHT,
            healthy: true,
            enabled: true,
            ephemeral: true,
            cluster_name: String::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Structural legality rules for single-instance registration.
#[derive(Debug, Clone, Default)]
pub struct InstanceValidator {
    config: ValidationConfig,
}

impl InstanceValidator {
    #[must_use]
    pub const fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Checks an instance, naming the first offending field.
    pub fn validate(&self, instance: &Instance) -> Result<()> {
        if instance.ip.trim().is_empty() {
            return Err(NamingError::validation("ip", "must not be empty"));
        }

        if !(1..=u32::from(u16::MAX)).contains(&instance.port) {
            return Err(NamingError::validation(
                "port",
                format!("{} is outside 1-65535", instance.port),
            ));
        }

        let weight = instance.weight;
        if !weight.is_finite() || weight < self.config.min_weight || weight > self.config.max_weight {
            return Err(NamingError::validation(
                "weight",
                format!(
                    "{weight} is outside {}-{}",
                    self.config.min_weight, self.config.max_weight
                ),
            ));
        }

        if !is_valid_cluster_name(&instance.cluster_name) {
            return Err(NamingError::validation(
                "clusterName",
                format!("{:?} may only contain [0-9a-zA-Z-]", instance.cluster_name),
            ));
        }

        if instance.metadata.keys().any(String::is_empty) {
            return Err(NamingError::validation("metadata", "keys must not be empty"));
        }

        let interval = instance.heartbeat_setting(HEARTBEAT_INTERVAL_KEY, DEFAULT_HEARTBEAT_INTERVAL_MS)?;
        let timeout = instance.heartbeat_setting(HEARTBEAT_TIMEOUT_KEY, DEFAULT_HEARTBEAT_TIMEOUT_MS)?;
        let delete_timeout = instance.heartbeat_setting(IP_DELETE_TIMEOUT_KEY, DEFAULT_IP_DELETE_TIMEOUT_MS)?;
        if timeout < interval || delete_timeout < interval {
            return Err(NamingError::validation(
                "metadata",
                "heartbeat interval must not exceed heartbeat timeout or ip delete timeout",
            ));
        }

        Ok(())
    }
}

fn is_valid_cluster_name(name: &str) -> bool {
    name.is_empty() || name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Fingerprint of published metadata.
///
/// Address and port are excluded so that downstream consumers can detect
/// metadata-only changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataId(String);

impl MetadataId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetadataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const DELIMITER: &[u8] = b"\x00";

/// One instance published by a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstancePublishInfo {
    pub ip: String,
    pub port: u32,
    pub cluster: String,
    pub weight: f64,
    pub healthy: bool,
    pub enabled: bool,
    pub metadata: BTreeMap<String, String>,
    metadata_id: MetadataId,
}

impl InstancePublishInfo {
    /// Builds the server-side record for a client instance.
    pub fn from_instance(instance: &Instance) -> Self {
        let cluster = if instance.cluster_name.is_empty() {
            DEFAULT_CLUSTER.to_owned()
        } else {
            instance.cluster_name.clone()
        };

        let metadata_id = fingerprint(
            &cluster,
            instance.weight,
            instance.enabled,
            instance.healthy,
            &instance.metadata,
        );

        Self {
            ip: instance.ip.clone(),
            port: instance.port,
            cluster,
            weight: instance.weight,
            healthy: instance.healthy,
            enabled: instance.enabled,
            metadata: instance.metadata.clone(),
            metadata_id,
        }
    }

    pub const fn metadata_id(&self) -> &MetadataId {
        &self.metadata_id
    }
}

fn fingerprint(
    cluster: &str,
    weight: f64,
    enabled: bool,
    healthy: bool,
    metadata: &BTreeMap<String, String>,
) -> MetadataId {
    let mut hasher = Sha256::new();

    hasher.update(cluster.as_bytes());
    hasher.update(DELIMITER);
    hasher.update(weight.to_bits().to_be_bytes());
    hasher.update([u8::from(enabled), u8::from(healthy)]);

    // BTreeMap iterates in key order
    for (key, value) in metadata {
        hasher.update(DELIMITER);
        hasher.update(key.as_bytes());
        hasher.update(DELIMITER);
        hasher.update(value.as_bytes());
    }

    MetadataId(hex::encode(hasher.finalize()))
}

/// Several instances published by one client under one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchInstancePublishInfo {
    instances: Vec<InstancePublishInfo>,
    metadata_id: MetadataId,
}

impl BatchInstancePublishInfo {
    /// Builds a batch record, keeping caller order.
    pub fn from_instances(instances: &[Instance]) -> Self {
        let instances: Vec<_> = instances.iter().map(InstancePublishInfo::from_instance).collect();

        let mut hasher = Sha256::new();
        for info in &instances {
            hasher.update(info.metadata_id.as_str().as_bytes());
            hasher.update(DELIMITER);
        }

        Self {
            instances,
            metadata_id: MetadataId(hex::encode(hasher.finalize())),
        }
    }

    pub fn instances(&self) -> &[InstancePublishInfo] {
        &self.instances
    }

    pub const fn metadata_id(&self) -> &MetadataId {
        &self.metadata_id
    }
}

/// A client's publication under one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Publication {
    Single(InstancePublishInfo),
    Batch(BatchInstancePublishInfo),
}

impl Publication {
    pub const fn metadata_id(&self) -> &MetadataId {
        match self {
            Self::Single(info) => info.metadata_id(),
            Self::Batch(batch) => batch.metadata_id(),
        }
    }

    /// Returns the published instances.
    pub fn instances(&self) -> &[InstancePublishInfo] {
        match self {
            Self::Single(info) => std::slice::from_ref(info),
            Self::Batch(batch) => batch.instances(),
        }
    }
}
