//! Domain events emitted by client operations.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use crate::client::ClientId;
use crate::instance::MetadataId;
use crate::service::Service;

/// A mutation observed by replication, metadata indexing and push.
#[derive(Debug, Clone, PartialEq)]
pub enum NamingEvent {
    /// A client published instances under a service.
    ClientRegisterService {
        service: Arc<Service>,
        client_id: ClientId,
    },
    /// A client withdrew its publication under a service.
    ClientDeregisterService {
        service: Arc<Service>,
        client_id: ClientId,
    },
    /// A client started watching a service.
    ClientSubscribeService {
        service: Arc<Service>,
        client_id: ClientId,
    },
    /// A client stopped watching a service.
    ClientUnsubscribeService {
        service: Arc<Service>,
        client_id: ClientId,
    },
    /// Instance metadata under a service appeared or went away.
    InstanceMetadata {
        service: Arc<Service>,
        metadata_id: MetadataId,
        removed: bool,
    },
}

impl NamingEvent {
    pub fn service(&self) -> &Arc<Service> {
        match self {
            Self::ClientRegisterService { service, .. }
            | Self::ClientDeregisterService { service, .. }
            | Self::ClientSubscribeService { service, .. }
            | Self::ClientUnsubscribeService { service, .. }
            | Self::InstanceMetadata { service, .. } => service,
        }
    }

    /// Returns the client that caused a client operation event.
    pub fn client_id(&self) -> Option<&str> {
        match self {
            Self::ClientRegisterService { client_id, .. }
            | Self::ClientDeregisterService { client_id, .. }
            | Self::ClientSubscribeService { client_id, .. }
            | Self::ClientUnsubscribeService { client_id, .. } => Some(client_id),
            Self::InstanceMetadata { .. } => None,
        }
    }

    /// Short name for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ClientRegisterService { .. } => "client_register_service",
            Self::ClientDeregisterService { .. } => "client_deregister_service",
            Self::ClientSubscribeService { .. } => "client_subscribe_service",
            Self::ClientUnsubscribeService { .. } => "client_unsubscribe_service",
            Self::InstanceMetadata { .. } => "instance_metadata",
        }
    }
}

/// Publish capability for naming events.
///
/// `publish` must not block on consumers. Events published in sequence from
/// one thread are delivered to each consumer in that sequence.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: NamingEvent);
}

/// Lossless sink for any number of consumers.
///
/// Each subscriber owns an unbounded queue. A consumer that falls behind
/// keeps every event and never holds up the publisher. Subscribers whose
/// receiver was dropped are pruned on the next publish.
#[derive(Debug, Default)]
pub struct FanoutEventSink {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<NamingEvent>>>,
}

impl FanoutEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to events published after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<NamingEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Number of subscribers whose receiver is still open.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }
}

impl EventSink for FanoutEventSink {
    fn publish(&self, event: NamingEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());

        if subscribers.is_empty() {
            trace!(kind = event.kind(), service = %event.service(), "No event subscribers");
        }
    }
}

/// Lossless sink for a single consumer.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<NamingEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NamingEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: NamingEvent) {
        if let Err(mpsc::error::SendError(event)) = self.sender.send(event) {
            trace!(kind = event.kind(), service = %event.service(), "Event receiver closed");
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn publish(&self, event: NamingEvent) {
        (**self).publish(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::instance::{Instance, InstancePublishInfo};

    fn register(client_id: &str) -> NamingEvent {
        NamingEvent::ClientRegisterService {
            service: Arc::new(Service::with_defaults("orders")),
            client_id: client_id.to_owned(),
        }
    }

    #[test]
    fn accessors() {
        let event = register("c1");
        assert_eq!(event.client_id(), Some("c1"));
        assert_eq!(event.service().name(), "orders");
        assert_eq!(event.kind(), "client_register_service");

        let info = InstancePublishInfo::from_instance(&Instance::new("10.0.0.1", 8080));
        let metadata = NamingEvent::InstanceMetadata {
            service: Arc::new(Service::with_defaults("orders")),
            metadata_id: info.metadata_id().clone(),
            removed: false,
        };
        assert_eq!(metadata.client_id(), None);
    }

    #[tokio::test]
    async fn fanout_reaches_every_subscriber_in_order() {
        let sink = FanoutEventSink::new();
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 2);

        sink.publish(register("c1"));
        sink.publish(register("c2"));

        for receiver in [&mut first, &mut second] {
            assert_eq!(receiver.recv().await.unwrap(), register("c1"));
            assert_eq!(receiver.recv().await.unwrap(), register("c2"));
        }
    }

    #[test]
    fn fanout_does_not_replay_to_late_subscribers() {
        let sink = FanoutEventSink::new();
        sink.publish(register("c1"));

        let mut late = sink.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn fanout_keeps_everything_for_an_idle_subscriber() {
        let sink = FanoutEventSink::new();
        let mut idle = sink.subscribe();

        for i in 0..5_000 {
            sink.publish(register(&format!("c{i}")));
        }

        for i in 0..5_000 {
            let event = idle.try_recv().unwrap();
            assert_eq!(event.client_id(), Some(format!("c{i}").as_str()));
        }
        assert!(idle.try_recv().is_err());
    }

    #[test]
    fn fanout_prunes_dropped_subscribers() {
        let sink = FanoutEventSink::new();
        let mut kept = sink.subscribe();
        let dropped = sink.subscribe();
        drop(dropped);

        sink.publish(register("c1"));

        assert_eq!(sink.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), register("c1"));
    }

    #[tokio::test]
    async fn channel_sink_is_lossless() {
        let (sink, mut receiver) = ChannelEventSink::channel();
        for i in 0..100 {
            sink.publish(register(&format!("c{i}")));
        }

        for i in 0..100 {
            let event = receiver.recv().await.unwrap();
            assert_eq!(event.client_id(), Some(format!("c{i}").as_str()));
        }
    }

    #[test]
    fn closed_channel_does_not_panic() {
        let (sink, receiver) = ChannelEventSink::channel();
        drop(receiver);
        sink.publish(register("c1"));
    }
}
