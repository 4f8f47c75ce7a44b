//! Integration tests for concurrent client operations.

mod common;

use common::fixtures::{orders, InstanceBuilder};
use common::TestNaming;
use lodestar_naming::{
    Client, ClientDirectory, ClientOperationService, EphemeralClientOperationService, EventSink,
    FanoutEventSink, InMemoryClientDirectory, InMemoryServiceRegistry, InstanceValidator, NamingEvent, Service,
    ServiceRegistry,
};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const CALLS_PER_THREAD: usize = 50;

#[test]
fn interleaved_register_deregister_on_one_client() {
    let mut naming = TestNaming::new();
    let c1 = naming.connect_ephemeral("C1");
    naming.registry.get_or_create(&orders());

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let operations = Arc::clone(&naming.operations);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let instance = InstanceBuilder::new(&format!("10.0.0.{}", t + 1), 8080).build();
                barrier.wait();
                for i in 0..CALLS_PER_THREAD {
                    if (t + i) % 2 == 0 {
                        operations.register_instance(&orders(), &instance, "C1").unwrap();
                    } else {
                        operations.deregister_instance(&orders(), &instance, "C1").unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Every call advanced the revision exactly once.
    assert_eq!(c1.revision(), (THREADS * CALLS_PER_THREAD) as u64);

    // Events arrive as whole pairs in the order the calls were applied.
    let events = naming.drain_events();
    assert_eq!(events.len() % 2, 0);
    let mut published = false;
    for pair in events.chunks(2) {
        match (&pair[0], &pair[1]) {
            (NamingEvent::ClientRegisterService { .. }, NamingEvent::InstanceMetadata { removed: false, .. }) => {
                published = true;
            }
            (NamingEvent::ClientDeregisterService { .. }, NamingEvent::InstanceMetadata { removed: true, .. }) => {
                assert!(published, "deregister event without a preceding registration");
                published = false;
            }
            other => panic!("unexpected event pair {other:?}"),
        }
    }

    // The final state matches the last applied call.
    assert_eq!(c1.publication(&orders()).is_some(), published);
}

#[test]
fn clients_proceed_independently() {
    let naming = TestNaming::new();
    let clients: Vec<_> = (0..THREADS)
        .map(|t| naming.connect_ephemeral(&format!("C{t}")))
        .collect();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let operations = Arc::clone(&naming.operations);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let client_id = format!("C{t}");
                barrier.wait();
                for i in 0..CALLS_PER_THREAD {
                    let service = Service::with_defaults(format!("svc-{}", i % 5));
                    let instance = InstanceBuilder::new("10.0.0.1", 8000 + t as u32).build();
                    operations.register_instance(&service, &instance, &client_id).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for client in &clients {
        assert_eq!(client.revision(), CALLS_PER_THREAD as u64);
        assert_eq!(client.published_services().len(), 5);
    }
    // Concurrent first access created each service once.
    assert_eq!(naming.registry.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fanout_subscribers_see_every_event() {
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let clients = Arc::new(InMemoryClientDirectory::new());
    let sink = Arc::new(FanoutEventSink::new());
    let mut first = sink.subscribe();
    let mut second = sink.subscribe();

    let operations = Arc::new(EphemeralClientOperationService::new(
        registry.clone(),
        clients.clone(),
        sink.clone(),
        InstanceValidator::default(),
    ));

    for id in ["A", "B"] {
        clients.connect(Client::new(id, true)).unwrap();
    }

    let tasks: Vec<_> = ["A", "B"]
        .into_iter()
        .map(|id| {
            let operations = Arc::clone(&operations);
            tokio::task::spawn_blocking(move || {
                for i in 0..100u32 {
                    let instance = InstanceBuilder::new("10.0.0.1", 8080)
                        .with_metadata("seq", &i.to_string())
                        .build();
                    operations.register_instance(&orders(), &instance, id).unwrap();
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    // Every call reached each subscriber exactly once, in the same order.
    let first_events: Vec<_> = std::iter::from_fn(|| first.try_recv().ok()).collect();
    let second_events: Vec<_> = std::iter::from_fn(|| second.try_recv().ok()).collect();
    assert_eq!(first_events.len(), 400);
    assert_eq!(first_events, second_events);

    let mut per_client = std::collections::HashMap::new();
    for client_id in first_events.iter().filter_map(NamingEvent::client_id) {
        *per_client.entry(client_id).or_insert(0u32) += 1;
    }
    assert_eq!(per_client["A"], 100);
    assert_eq!(per_client["B"], 100);
    assert_eq!(clients.get("A").unwrap().revision(), 100);
    assert_eq!(registry.len(), 1);

    // Publishing after all receivers are gone is harmless.
    drop((first, second));
    sink.publish(NamingEvent::ClientSubscribeService {
        service: registry.get_or_create(&orders()),
        client_id: "A".to_owned(),
    });
    assert_eq!(sink.subscriber_count(), 0);
}
