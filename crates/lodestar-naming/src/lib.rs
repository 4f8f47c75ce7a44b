//! Lodestar naming - ephemeral client-operation registry.
//!
//! Binds live client connections to the instances they publish and the
//! services they subscribe to:
//!
//! - **Service registry**: interns service descriptors to singleton handles
//! - **Client directory**: looks up live clients by connection id
//! - **Client operations**: register, batch-register, deregister, subscribe
//!   and unsubscribe, enforcing the ephemeral/persistent split
//! - **Events**: ordered domain events for replication, metadata indexing
//!   and push
//!
//! # Example
//!
//! ```ignore
//! use lodestar_naming::{Client, Instance, NamingConfig, NamingNode, Service};
//! use lodestar_naming::operation::ClientOperationService;
//!
//! let node = NamingNode::new(&NamingConfig::load()?);
//! node.clients.connect(Client::new("conn-1", true))?;
//! node.operations.register_instance(
//!     &Service::with_defaults("orders"),
//!     &Instance::new("10.0.0.1", 8080),
//!     "conn-1",
//! )?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod instance;
pub mod node;
pub mod operation;
pub mod service;
pub mod telemetry;

// Re-export main types
pub use client::{Client, ClientDirectory, ClientId, ClientState, InMemoryClientDirectory, Subscriber};
pub use config::{LoggingConfig, NamingConfig, ValidationConfig};
pub use error::{NamingError, Result};
pub use event::{ChannelEventSink, EventSink, FanoutEventSink, NamingEvent};
pub use handler::RequestHandler;
pub use instance::{
    BatchInstancePublishInfo, Instance, InstancePublishInfo, InstanceValidator, MetadataId, Publication,
};
pub use node::NamingNode;
pub use operation::{ClientOperationService, EphemeralClientOperationService, Outcome, SkipReason};
pub use service::{InMemoryServiceRegistry, Service, ServiceRegistry};
