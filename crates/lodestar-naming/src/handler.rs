//! Request handlers for the ephemeral registration path.
//!
//! Handlers own the logging of tolerated no-ops and turn errors into rejected
//! responses; the operations underneath stay free of both concerns.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::client::{ClientId, Subscriber};
use crate::error::{NamingError, Result};
use crate::instance::Instance;
use crate::operation::{ClientOperationService, Outcome};
use crate::service::{Service, DEFAULT_GROUP, DEFAULT_NAMESPACE};

/// Connection-level information attached to every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestMeta {
    pub client_id: ClientId,
    pub client_ip: String,
    pub client_port: u16,
    pub client_version: String,
    pub app: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_owned()
}

fn default_group() -> String {
    DEFAULT_GROUP.to_owned()
}

/// Kind of a single-instance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceRequestKind {
    RegisterInstance,
    BatchRegisterInstance,
    DeregisterInstance,
}

/// Register or deregister one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRequest {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_group")]
    pub group_name: String,
    pub service_name: String,
    #[serde(rename = "type")]
    pub kind: InstanceRequestKind,
    pub instance: Instance,
}

/// Register several instances under one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInstanceRequest {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_group")]
    pub group_name: String,
    pub service_name: String,
    pub instances: Vec<Instance>,
}

/// Subscribe to or unsubscribe from a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeServiceRequest {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_group")]
    pub group_name: String,
    pub service_name: String,
    #[serde(default)]
    pub clusters: String,
    pub subscribe: bool,
}

/// Answer to an instance or batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<InstanceRequestKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InstanceResponse {
    fn success(kind: Option<InstanceRequestKind>) -> Self {
        Self {
            success: true,
            kind,
            error_code: None,
            message: None,
        }
    }

    fn failure(kind: Option<InstanceRequestKind>, error: &NamingError) -> Self {
        Self {
            success: false,
            kind,
            error_code: Some(error.error_code()),
            message: Some(error.to_string()),
        }
    }
}

/// Answer to a subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeServiceResponse {
    pub success: bool,
    pub subscribed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Dispatches decoded requests to client operations.
#[derive(Clone)]
pub struct RequestHandler {
    operations: Arc<dyn ClientOperationService>,
}

impl RequestHandler {
    pub fn new(operations: Arc<dyn ClientOperationService>) -> Self {
        Self { operations }
    }

    /// Handles a register or deregister request.
    pub fn handle_instance(&self, request: &InstanceRequest, meta: &RequestMeta) -> InstanceResponse {
        let service = Service::ephemeral(&request.namespace, &request.group_name, &request.service_name);
        let client_id = meta.client_id.as_str();

        let result = require_ephemeral(std::slice::from_ref(&request.instance)).and_then(|()| match request.kind {
            InstanceRequestKind::RegisterInstance => {
                self.operations
                    .register_instance(&service, &request.instance, client_id)
            }
            InstanceRequestKind::BatchRegisterInstance => self.operations.batch_register_instance(
                &service,
                std::slice::from_ref(&request.instance),
                client_id,
            ),
            InstanceRequestKind::DeregisterInstance => {
                self.operations
                    .deregister_instance(&service, &request.instance, client_id)
            }
        });

        match log_outcome(result, &service, client_id) {
            Ok(()) => InstanceResponse::success(Some(request.kind)),
            Err(e) => InstanceResponse::failure(Some(request.kind), &e),
        }
    }

    /// Handles a batch register request.
    pub fn handle_batch(&self, request: &BatchInstanceRequest, meta: &RequestMeta) -> InstanceResponse {
        let service = Service::ephemeral(&request.namespace, &request.group_name, &request.service_name);
        let client_id = meta.client_id.as_str();

        let result = require_ephemeral(&request.instances).and_then(|()| {
            self.operations
                .batch_register_instance(&service, &request.instances, client_id)
        });

        let kind = Some(InstanceRequestKind::BatchRegisterInstance);
        match log_outcome(result, &service, client_id) {
            Ok(()) => InstanceResponse::success(kind),
            Err(e) => InstanceResponse::failure(kind, &e),
        }
    }

    /// Handles a subscribe or unsubscribe request.
    pub fn handle_subscribe(&self, request: &SubscribeServiceRequest, meta: &RequestMeta) -> SubscribeServiceResponse {
        let service = Service::ephemeral(&request.namespace, &request.group_name, &request.service_name);
        let subscriber = Subscriber {
            addr: format!("{}:{}", meta.client_ip, meta.client_port),
            agent: meta.client_version.clone(),
            app: meta.app.clone(),
            ip: meta.client_ip.clone(),
            port: meta.client_port,
            namespace_id: request.namespace.clone(),
            service_name: service.grouped_name(),
            cluster: request.clusters.clone(),
        };
        let client_id = meta.client_id.as_str();

        let result = if request.subscribe {
            self.operations.subscribe_service(&service, subscriber, client_id)
        } else {
            self.operations.unsubscribe_service(&service, &subscriber, client_id)
        };

        match log_outcome(result, &service, client_id) {
            Ok(()) => SubscribeServiceResponse {
                success: true,
                subscribed: request.subscribe,
                error_code: None,
                message: None,
            },
            Err(e) => SubscribeServiceResponse {
                success: false,
                subscribed: false,
                error_code: Some(e.error_code()),
                message: Some(e.to_string()),
            },
        }
    }
}

/// Rejects persistent instances, which are not bound to a connection.
fn require_ephemeral(instances: &[Instance]) -> Result<()> {
    if instances.iter().all(|instance| instance.ephemeral) {
        Ok(())
    } else {
        Err(NamingError::validation(
            "ephemeral",
            "persistent instances cannot be registered over a client connection",
        ))
    }
}

/// Logs skipped and failed operations; skipped ones still count as handled.
fn log_outcome(result: Result<Outcome>, service: &Service, client_id: &str) -> Result<()> {
    match result {
        Ok(Outcome::Applied) => Ok(()),
        Ok(Outcome::Skipped(reason)) => {
            warn!(client_id = %client_id, service = %service, reason = %reason, "Client operation skipped");
            Ok(())
        }
        Err(e) => {
            warn!(client_id = %client_id, service = %service, error = %e, "Client operation rejected");
            Err(e)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn instance_request_defaults() {
        let request: InstanceRequest = serde_json::from_str(
            r#"{
                "serviceName": "orders",
                "type": "registerInstance",
                "instance": {"ip": "10.0.0.1", "port": 8080}
            }"#,
        )
        .unwrap();

        assert_eq!(request.namespace, DEFAULT_NAMESPACE);
        assert_eq!(request.group_name, DEFAULT_GROUP);
        assert_eq!(request.kind, InstanceRequestKind::RegisterInstance);
        assert_eq!(request.instance.port, 8080);
    }

    #[test]
    fn success_response_omits_error_fields() {
        let response = InstanceResponse::success(Some(InstanceRequestKind::DeregisterInstance));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["kind"], "deregisterInstance");
        assert!(json.get("errorCode").is_none());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn persistent_instances_are_refused() {
        let mut persistent = Instance::new("10.0.0.2", 8080);
        persistent.ephemeral = false;

        assert!(require_ephemeral(&[Instance::new("10.0.0.1", 8080)]).is_ok());
        let error = require_ephemeral(&[Instance::new("10.0.0.1", 8080), persistent]).unwrap_err();
        assert!(matches!(error, NamingError::Validation { field: "ephemeral", .. }));
    }

    #[test]
    fn failure_response_carries_code() {
        let error = NamingError::validation("port", "0 is outside 1-65535");
        let response = InstanceResponse::failure(None, &error);

        assert!(!response.success);
        assert_eq!(response.error_code, Some(400));
        assert_eq!(response.message.as_deref(), Some("invalid instance port: 0 is outside 1-65535"));
    }
}
