//! End-to-end tests of two agents exchanging events over the in-process
//! broker.

use bytes::Bytes;
use coaty_core::{
    CommunicationManager, CommunicationOptions, CorrelationSignal, InboundEvent, ManagerError,
};
use coaty_protocol::{EventType, Topic};
use coaty_transport::{InMemoryBroker, Transport};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn agent(
    broker: &Arc<InMemoryBroker>,
    namespace: &str,
) -> Arc<CommunicationManager> {
    let _ = tracing_subscriber::fmt::try_init();
    let transport: Arc<dyn Transport> = Arc::clone(broker) as Arc<dyn Transport>;
    CommunicationManager::start(transport, CommunicationOptions::with_namespace(namespace))
        .unwrap()
}

#[tokio::test]
async fn advertise_between_agents() {
    let broker = Arc::new(InMemoryBroker::new());
    let publisher = agent(&broker, "com.example");
    let observer = agent(&broker, "com.example");

    let mut advertises = observer.observe_advertise("Task").await.unwrap();
    publisher
        .publish_advertise("Task", &br#"{"name":"inspect"}"#[..])
        .await
        .unwrap();

    let event = advertises.recv().await.unwrap();
    assert_eq!(event.topic.event_type, EventType::Advertise);
    assert_eq!(event.topic.event_filter.as_deref(), Some("Task"));
    assert_eq!(event.topic.source_id, publisher.options().source_id);
    assert_eq!(&event.payload[..], br#"{"name":"inspect"}"#);

    publisher.stop();
    observer.stop();
}

#[tokio::test]
async fn namespace_isolation() {
    let broker = Arc::new(InMemoryBroker::new());
    let publisher = agent(&broker, "ns-a");
    let same_ns = agent(&broker, "ns-a");
    let other_ns = agent(&broker, "ns-b");

    let mut hits = same_ns.observe_advertise("Task").await.unwrap();
    let mut misses = other_ns.observe_advertise("Task").await.unwrap();

    publisher.publish_advertise("Task", &b"{}"[..]).await.unwrap();

    assert!(hits.recv().await.is_some());
    // The broker never matched ns-b's filter, so nothing is in flight.
    assert!(misses.try_recv().is_none());
}

#[tokio::test]
async fn discover_collects_multiple_resolves() {
    let broker = Arc::new(InMemoryBroker::new());
    let requester = agent(&broker, "com.example");
    let responder_a = agent(&broker, "com.example");
    let responder_b = agent(&broker, "com.example");

    for responder in [&responder_a, &responder_b] {
        let responder = Arc::clone(responder);
        let mut discovers = responder.observe_discover().await.unwrap();
        tokio::spawn(async move {
            while let Some(request) = discovers.recv().await {
                responder
                    .publish_resolve(&request, &br#"{"objectId":"1"}"#[..])
                    .await
                    .unwrap();
            }
        });
    }

    let mut responses = requester.publish_discover(&b"{}"[..]).await.unwrap();
    for _ in 0..2 {
        match responses.recv().await.unwrap() {
            CorrelationSignal::Response(event) => {
                assert_eq!(event.topic.event_type, EventType::Resolve);
                assert_eq!(
                    event.topic.correlation_id.as_deref(),
                    Some(responses.correlation_id())
                );
            }
            CorrelationSignal::TimedOut => panic!("unexpected timeout"),
        }
    }

    // Discover accepts any number of responders; the exchange stays open
    // until the caller disposes it.
    assert_eq!(requester.open_request_count(), 1);
    responses.dispose();
    responses.dispose();
    assert_eq!(requester.open_request_count(), 0);
}

#[tokio::test]
async fn update_closes_after_first_complete() {
    let broker = Arc::new(InMemoryBroker::new());
    let requester = agent(&broker, "com.example");
    let responder = agent(&broker, "com.example");

    let mut updates = responder.observe_update("Task").await.unwrap();
    let responder_task = Arc::clone(&responder);
    tokio::spawn(async move {
        let request = updates.recv().await.unwrap();
        responder_task
            .publish_complete(&request, &b"{}"[..])
            .await
            .unwrap();
    });

    let mut responses = requester.publish_update("Task", &b"{}"[..]).await.unwrap();
    assert!(matches!(
        responses.recv().await,
        Some(CorrelationSignal::Response(_))
    ));
    // Single-response exchange: closed after the first Complete.
    assert!(responses.recv().await.is_none());
    assert_eq!(requester.open_request_count(), 0);
}

#[tokio::test]
async fn call_return_with_operation_filter() {
    let broker = Arc::new(InMemoryBroker::new());
    let caller = agent(&broker, "com.example");
    let callee = agent(&broker, "com.example");

    let mut calls = callee.observe_call("lights.switch").await.unwrap();
    let callee_task = Arc::clone(&callee);
    tokio::spawn(async move {
        let request = calls.recv().await.unwrap();
        assert_eq!(request.topic.event_filter.as_deref(), Some("lights.switch"));
        callee_task
            .publish_return(&request, &br#"{"result":true}"#[..])
            .await
            .unwrap();
    });

    let mut responses = caller
        .publish_call("lights.switch", &br#"{"on":true}"#[..])
        .await
        .unwrap();
    match responses.recv().await.unwrap() {
        CorrelationSignal::Response(event) => {
            assert_eq!(event.topic.event_type, EventType::Return);
            assert_eq!(&event.payload[..], br#"{"result":true}"#);
        }
        CorrelationSignal::TimedOut => panic!("unexpected timeout"),
    }
}

#[tokio::test(start_paused = true)]
async fn discover_times_out_without_responders() {
    let broker = Arc::new(InMemoryBroker::new());
    let transport: Arc<dyn Transport> = Arc::clone(&broker) as Arc<dyn Transport>;
    let requester = CommunicationManager::start(
        transport,
        CommunicationOptions::with_namespace("com.example")
            .response_timeout(Duration::from_secs(3)),
    )
    .unwrap();

    let mut responses = requester.publish_discover(&b"{}"[..]).await.unwrap();
    assert!(matches!(
        responses.recv().await,
        Some(CorrelationSignal::TimedOut)
    ));
    assert!(responses.recv().await.is_none());
    assert_eq!(requester.open_request_count(), 0);
}

#[tokio::test]
async fn raw_traffic_reaches_raw_observers_only() {
    let broker = Arc::new(InMemoryBroker::new());
    let observer = agent(&broker, "com.example");

    let mut typed = observer.observe_advertise("Task").await.unwrap();
    let mut raw = observer.observe_raw("sensors/#").await.unwrap();

    broker
        .publish("sensors/temp/1", Bytes::from_static(b"21.5"))
        .await
        .unwrap();

    let event = raw.recv().await.unwrap();
    assert_eq!(event.topic, "sensors/temp/1");
    assert_eq!(&event.payload[..], b"21.5");
    assert!(typed.try_recv().is_none());
}

#[tokio::test]
async fn invalid_publish_fails_before_transport() {
    let broker = Arc::new(InMemoryBroker::new());
    let publisher = agent(&broker, "com.example");

    // Advertise without an object type never reaches the broker.
    let err = publisher.publish_advertise("", &b"{}"[..]).await.unwrap_err();
    assert!(matches!(err, ManagerError::Topic(_)));

    // Responding to a one-way event is rejected up front.
    let topic = Topic::parse(&format!(
        "coaty/1/com.example/ADV:Task/{}",
        Uuid::new_v4()
    ))
    .unwrap();
    let fake_request = InboundEvent::new(topic, Bytes::new());
    let err = publisher
        .publish_resolve(&fake_request, &b"{}"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::RequestTypeMismatch { .. }));
}

#[tokio::test]
async fn invalid_options_rejected_at_start() {
    let broker = Arc::new(InMemoryBroker::new());
    let transport: Arc<dyn Transport> = Arc::clone(&broker) as Arc<dyn Transport>;
    let result = CommunicationManager::start(
        transport,
        CommunicationOptions::with_namespace("bad/namespace"),
    );
    assert!(matches!(result, Err(ManagerError::Options(_))));
}

#[tokio::test]
async fn sibling_observation_survives_disposal() {
    let broker = Arc::new(InMemoryBroker::new());
    let publisher = agent(&broker, "com.example");
    let observer = agent(&broker, "com.example");

    // Two observations on the same event type and filter share one
    // transport subscription string.
    let mut first = observer.observe_advertise("Task").await.unwrap();
    let mut second = observer.observe_advertise("Task").await.unwrap();

    first.dispose();
    tokio::task::yield_now().await;

    // The survivor must keep receiving after its sibling is gone.
    publisher.publish_advertise("Task", &b"{}"[..]).await.unwrap();
    assert!(second.recv().await.is_some());
    assert!(first.try_recv().is_none());

    // The transport subscription is released once the last user closes.
    second.dispose();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(broker.filter_count(), 0);
}

#[tokio::test]
async fn observation_disposal_is_idempotent() {
    let broker = Arc::new(InMemoryBroker::new());
    let publisher = agent(&broker, "com.example");
    let observer = agent(&broker, "com.example");

    let mut advertises = observer.observe_advertise("Task").await.unwrap();
    advertises.dispose();
    advertises.dispose();

    // A disposed observation no longer receives anything.
    publisher.publish_advertise("Task", &b"{}"[..]).await.unwrap();
    assert!(advertises.recv().await.is_none());
}
