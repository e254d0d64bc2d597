//! Integration tests for the invalidation listener over the in-memory transport.

use async_trait::async_trait;
use keyspace_invalidator::notify::{
    Connector, MemoryConnector, MemoryPublisher, MemorySubscription, RawMessage,
};
use keyspace_invalidator::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn config() -> InvalidatorConfig {
    InvalidatorConfig::new("localhost", 6379).with_reconnect(
        ReconnectConfig::default()
            .with_max_attempts(3)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5)),
    )
}

/// A handler that forwards every key to a channel.
fn recording_handler() -> (
    impl Fn(&str) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<String>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |key: &str| {
        let _ = tx.send(key.to_string());
    };
    (handler, rx)
}

async fn next_key(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for invalidation")
        .expect("handler dropped")
}

async fn spawn_listener(
    config: InvalidatorConfig,
) -> (
    ListenerHandle,
    MemoryPublisher,
    Arc<MemoryConnector>,
    mpsc::UnboundedReceiver<String>,
) {
    let (connector, publisher) = MemoryConnector::new();
    let connector = Arc::new(connector);
    let (handler, rx) = recording_handler();

    let handle = InvalidationListener::new(Arc::clone(&connector), config).spawn(handler);
    assert_eq!(handle.subscribed().await, ListenerState::Subscribed);

    (handle, publisher, connector, rx)
}

#[tokio::test]
async fn test_keys_are_dispatched_in_order() {
    let (handle, publisher, _connector, mut rx) = spawn_listener(config()).await;

    publisher.publish_keyspace(0, "user:42", "set");
    publisher.publish_keyspace(0, "user:43", "del");
    publisher.publish_keyspace(0, "order:7", "expired");

    assert_eq!(next_key(&mut rx).await, "user:42");
    assert_eq!(next_key(&mut rx).await, "user:43");
    assert_eq!(next_key(&mut rx).await, "order:7");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_messages_outside_pattern_are_never_dispatched() {
    let (handle, publisher, _connector, mut rx) =
        spawn_listener(config().with_key_pattern("user:*")).await;

    publisher.publish_keyspace(0, "order:7", "set");
    publisher.publish_keyspace(1, "user:1", "set");
    publisher.publish(RawMessage::new("__keyevent@0__:set", Some("user:2".into())));
    publisher.publish_keyspace(0, "user:3", "set");

    // Delivery is ordered, so the three skipped messages were handled first.
    assert_eq!(next_key(&mut rx).await, "user:3");
    assert_eq!(handle.stats().received(), 4);
    assert_eq!(handle.stats().skipped(), 3);
    assert_eq!(handle.stats().dispatched(), 1);
    assert!(rx.try_recv().is_err());

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_empty_reply_does_not_dispatch_or_terminate() {
    let (handle, publisher, connector, mut rx) = spawn_listener(config()).await;

    publisher.publish_empty();
    publisher.publish_empty();
    publisher.publish_keyspace(0, "user:1", "set");

    assert_eq!(next_key(&mut rx).await, "user:1");
    assert_eq!(handle.stats().empty_replies(), 2);
    assert_eq!(handle.stats().dispatched(), 1);
    assert_eq!(handle.state(), ListenerState::Subscribed);
    assert_eq!(connector.subscribe_count(), 1);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_handler_panic_does_not_stop_the_loop() {
    let (connector, publisher) = MemoryConnector::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = move |key: &str| {
        if key == "poison" {
            panic!("cannot evict {key}");
        }
        let _ = tx.send(key.to_string());
    };

    let handle = InvalidationListener::new(connector, config()).spawn(handler);
    publisher.publish_keyspace(0, "poison", "set");
    publisher.publish_keyspace(0, "user:9", "set");

    assert_eq!(next_key(&mut rx).await, "user:9");
    assert_eq!(handle.stats().handler_failures(), 1);
    assert_eq!(handle.stats().dispatched(), 1);
    assert!(!handle.is_finished());

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_initial_subscribe_failure_is_reported_promptly() {
    let (connector, _publisher) = MemoryConnector::new();
    let connector = Arc::new(
        connector.fail_next_subscribe(InvalidatorError::Connection("connection refused".into())),
    );

    let handle = InvalidationListener::new(Arc::clone(&connector), config()).spawn(|_: &str| {});
    let result = timeout(WAIT, handle.join()).await.unwrap();

    assert_eq!(
        result,
        Err(InvalidatorError::Connection("connection refused".into()))
    );
    assert_eq!(connector.subscribe_count(), 1);
}

/// A store that accepts the connection but never answers the subscribe.
struct UnresponsiveConnector;

#[async_trait]
impl Connector for UnresponsiveConnector {
    type Subscription = MemorySubscription;

    async fn subscribe(&self, _pattern: &KeyspacePattern) -> Result<Self::Subscription> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_unresponsive_subscribe_times_out_with_connection_error() {
    let config = config().with_connect_timeout(Duration::from_millis(50));
    let listener = InvalidationListener::new(UnresponsiveConnector, config);

    let result = timeout(WAIT, listener.run(|_: &str| {})).await.unwrap();

    match result {
        Err(InvalidatorError::Connection(msg)) => assert!(msg.contains("timed out after 50ms")),
        other => panic!("expected connection timeout, got {other:?}"),
    }
    assert_eq!(listener.state(), ListenerState::Terminated);
}

#[tokio::test]
async fn test_reconnects_after_transport_failure() {
    let (handle, publisher, connector, mut rx) = spawn_listener(config()).await;

    publisher.publish_keyspace(0, "user:1", "set");
    assert_eq!(next_key(&mut rx).await, "user:1");

    publisher.fail("connection reset by peer");
    publisher.publish_keyspace(0, "user:2", "set");

    assert_eq!(next_key(&mut rx).await, "user:2");
    assert_eq!(connector.subscribe_count(), 2);
    assert_eq!(handle.stats().reconnect_attempts(), 1);
    assert_eq!(handle.state(), ListenerState::Subscribed);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_retries_failed_attempts() {
    let (handle, publisher, connector, mut rx) = spawn_listener(config()).await;

    connector.push_subscribe_failure(InvalidatorError::Connection("refused".into()));
    publisher.fail("connection reset by peer");
    publisher.publish_keyspace(0, "user:5", "set");

    assert_eq!(next_key(&mut rx).await, "user:5");
    assert_eq!(connector.subscribe_count(), 3);
    assert_eq!(handle.stats().reconnect_attempts(), 2);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_exhausted_reconnects_terminate_with_transport_error() {
    let (handle, publisher, connector, _rx) = spawn_listener(config()).await;

    for _ in 0..3 {
        connector.push_subscribe_failure(InvalidatorError::Connection("refused".into()));
    }
    publisher.fail("connection reset by peer");

    let result = timeout(WAIT, handle.join()).await.unwrap();
    assert!(matches!(result, Err(InvalidatorError::Transport(_))));
    assert_eq!(connector.subscribe_count(), 4);
}

#[tokio::test]
async fn test_disabled_reconnect_terminates_on_first_failure() {
    let config = config().with_reconnect(ReconnectConfig::disabled());
    let (handle, publisher, connector, _rx) = spawn_listener(config).await;

    publisher.fail("connection reset by peer");

    let result = timeout(WAIT, handle.join()).await.unwrap();
    assert_eq!(
        result,
        Err(InvalidatorError::Transport("connection reset by peer".into()))
    );
    assert_eq!(connector.subscribe_count(), 1);
}

#[tokio::test]
async fn test_stop_terminates_cleanly() {
    let (handle, _publisher, _connector, _rx) = spawn_listener(config()).await;

    handle.cancel();
    let state = timeout(WAIT, handle.wait_for_state(ListenerState::is_terminated))
        .await
        .unwrap();
    assert_eq!(state, ListenerState::Terminated);
    assert_eq!(handle.stop().await, Ok(()));
}

#[tokio::test]
async fn test_shared_cancellation_token_stops_listener() {
    let shutdown = tokio_util::sync::CancellationToken::new();
    let (connector, _publisher) = MemoryConnector::new();

    let handle = InvalidationListener::new(connector, config())
        .with_cancellation_token(shutdown.child_token())
        .spawn(|_: &str| {});
    handle.subscribed().await;

    shutdown.cancel();
    assert_eq!(timeout(WAIT, handle.join()).await.unwrap(), Ok(()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_every_notification_dispatched_once_in_order(
        keys in prop::collection::vec("[a-z]{1,8}(:[0-9]{1,4})?", 0..40)
    ) {
        let seen = tokio_test::block_on(async {
            let (handle, publisher, _connector, mut rx) = spawn_listener(config()).await;
            for key in &keys {
                publisher.publish_keyspace(0, key, "set");
            }

            let mut seen = Vec::with_capacity(keys.len());
            for _ in 0..keys.len() {
                seen.push(next_key(&mut rx).await);
            }
            handle.stop().await.unwrap();
            seen
        });

        prop_assert_eq!(seen, keys);
    }
}
