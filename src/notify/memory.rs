//! In-memory transport for tests and local development.

use super::{Connector, KeyspacePattern, RawMessage, Subscription};
use crate::error::{InvalidatorError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

enum Event {
    Message(RawMessage),
    Empty,
    Fail(String),
}

/// Connector whose messages are pushed by a paired [`MemoryPublisher`].
///
/// Every subscription reads from the same queue, so messages published while
/// the listener is reconnecting are delivered after it resubscribes. Messages
/// are delivered exactly as published; pattern filtering is left to the
/// listener.
///
/// # Examples
///
/// ```rust
/// use keyspace_invalidator::notify::MemoryConnector;
///
/// let (connector, publisher) = MemoryConnector::new();
/// publisher.publish_keyspace(0, "user:42", "set");
/// assert_eq!(connector.subscribe_count(), 0);
/// ```
pub struct MemoryConnector {
    events: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>>,
    subscribe_failures: Mutex<VecDeque<InvalidatorError>>,
    subscribe_count: AtomicUsize,
}

/// Sending half of a [`MemoryConnector`].
#[derive(Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<Event>,
}

impl MemoryConnector {
    /// Create a connector and its publisher.
    pub fn new() -> (Self, MemoryPublisher) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: Arc::new(tokio::sync::Mutex::new(rx)),
                subscribe_failures: Mutex::new(VecDeque::new()),
                subscribe_count: AtomicUsize::new(0),
            },
            MemoryPublisher { tx },
        )
    }

    /// Make the next `subscribe` call fail with `error`.
    ///
    /// Calls queue up: each failure is consumed by one subscribe attempt.
    pub fn fail_next_subscribe(self, error: InvalidatorError) -> Self {
        self.push_subscribe_failure(error);
        self
    }

    /// Queue a subscribe failure on a shared connector.
    pub fn push_subscribe_failure(&self, error: InvalidatorError) {
        self.subscribe_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(error);
    }

    /// Number of subscribe attempts made so far, successful or not.
    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }
}

impl MemoryPublisher {
    /// Deliver a raw message.
    pub fn publish(&self, message: RawMessage) {
        let _ = self.tx.send(Event::Message(message));
    }

    /// Deliver a keyspace event for `key` in `database`.
    pub fn publish_keyspace(&self, database: i64, key: &str, operation: &str) {
        self.publish(RawMessage::keyspace(database, key, operation));
    }

    /// Deliver an empty reply.
    pub fn publish_empty(&self) {
        let _ = self.tx.send(Event::Empty);
    }

    /// Break the current subscription with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Event::Fail(reason.into()));
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Subscription = MemorySubscription;

    async fn subscribe(&self, pattern: &KeyspacePattern) -> Result<Self::Subscription> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);

        let failure = self
            .subscribe_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        tracing::trace!(pattern = %pattern, "memory subscription opened");
        Ok(MemorySubscription {
            events: Arc::clone(&self.events),
        })
    }
}

/// Subscription handed out by [`MemoryConnector`].
pub struct MemorySubscription {
    events: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_message(&mut self) -> Result<Option<RawMessage>> {
        let mut events = self.events.lock().await;
        match events.recv().await {
            Some(Event::Message(message)) => Ok(Some(message)),
            Some(Event::Empty) => Ok(None),
            Some(Event::Fail(reason)) => Err(InvalidatorError::Transport(reason)),
            None => Err(InvalidatorError::Transport(
                "memory publisher dropped".to_string(),
            )),
        }
    }
}
