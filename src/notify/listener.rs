//! The invalidation listener: subscribe, receive, dispatch, reconnect.

use super::handler::dispatch;
use super::{
    Connector, InvalidationHandler, KeyspacePattern, ListenerHandle, ListenerState, Notification,
    RawMessage, Subscription,
};
use crate::core::InvalidatorConfig;
use crate::error::{InvalidatorError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[cfg(feature = "metrics")]
use crate::metrics::ListenerMetrics;

/// Bridges a keyspace-notification subscription to cache invalidation.
///
/// For every message on the subscribed pattern the handler is called once,
/// synchronously, with the changed key. Messages are dispatched in the order
/// the transport delivers them and the next one is not read until the handler
/// returns. Delivery guarantees are those of the transport; nothing is
/// acknowledged or replayed.
///
/// # Examples
///
/// ```rust,no_run
/// use keyspace_invalidator::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let listener = InvalidatorBuilder::new().with_redis_env().build()?;
///
/// let handle = listener.spawn(|key: &str| {
///     println!("evicting {key}");
/// });
///
/// // ... on shutdown
/// handle.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct InvalidationListener<C: Connector> {
    connector: C,
    config: InvalidatorConfig,
    pattern: KeyspacePattern,
    token: CancellationToken,
    state: watch::Sender<ListenerState>,
    stats: Arc<ListenerStats>,
    #[cfg(feature = "metrics")]
    metrics: Option<ListenerMetrics>,
}

impl<C: Connector> InvalidationListener<C> {
    /// Create a listener for `config` on top of `connector`.
    pub fn new(connector: C, config: InvalidatorConfig) -> Self {
        let (state, _) = watch::channel(ListenerState::Connecting);
        Self {
            connector,
            pattern: config.pattern(),
            config,
            token: CancellationToken::new(),
            state,
            stats: Arc::new(ListenerStats::default()),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Report into OpenTelemetry instruments as well as [`ListenerStats`].
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: ListenerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stop the loop with this token instead of the listener's own.
    ///
    /// Useful to tie the listener to an application-wide shutdown token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// The token that stops [`run`](Self::run) when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The pattern this listener subscribes to.
    pub fn pattern(&self) -> &KeyspacePattern {
        &self.pattern
    }

    /// The listener's settings.
    pub fn config(&self) -> &InvalidatorConfig {
        &self.config
    }

    /// Counters shared with every handle of this listener.
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Run the receive loop on the current task until it is cancelled or fails.
    ///
    /// # Errors
    ///
    /// - [`InvalidatorError::Connection`] if the initial subscription cannot be
    ///   established. It is not retried.
    /// - [`InvalidatorError::Transport`] once reconnect attempts after a
    ///   mid-stream failure are exhausted.
    ///
    /// Handler panics are caught, logged and counted; they never end the loop.
    pub async fn run<H: InvalidationHandler>(&self, handler: H) -> Result<()> {
        let result = self.receive_loop(&handler).await;
        self.state.send_replace(ListenerState::Terminated);

        match &result {
            Ok(()) => info!(pattern = %self.pattern, "Invalidation listener stopped"),
            Err(e) => {
                error!(pattern = %self.pattern, error = %e, "Invalidation listener terminated")
            }
        }
        result
    }

    /// Run the receive loop on its own tokio task.
    ///
    /// The returned handle stops the loop and reports how it ended. Dropping
    /// the handle leaves the loop running.
    pub fn spawn<H: InvalidationHandler>(self, handler: H) -> ListenerHandle {
        let token = self.token.clone();
        let state = self.state.subscribe();
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(async move { self.run(handler).await });
        ListenerHandle::new(task, token, state, stats)
    }

    async fn receive_loop<H: InvalidationHandler>(&self, handler: &H) -> Result<()> {
        self.set_state(ListenerState::Connecting);

        let mut subscription = match self.connect().await {
            Ok(Some(subscription)) => subscription,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(
                    host = %self.config.host,
                    port = self.config.port,
                    pattern = %self.pattern,
                    error = %e,
                    "Failed to subscribe to keyspace notifications"
                );
                return Err(e);
            }
        };

        info!(pattern = %self.pattern, "Subscribed to keyspace notifications");
        self.set_state(ListenerState::Subscribed);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(()),
                next = subscription.next_message() => next,
            };

            match next {
                Ok(Some(message)) => self.handle_message(message, handler),
                Ok(None) => {
                    self.stats.empty_replies.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "metrics")]
                    if let Some(metrics) = &self.metrics {
                        metrics.record_empty_reply();
                    }
                    trace!("Empty reply from subscription");
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    drop(subscription);
                    subscription = match self.reconnect(e).await? {
                        Some(subscription) => subscription,
                        None => return Ok(()),
                    };
                }
            }
        }
    }

    fn handle_message<H: InvalidationHandler>(&self, message: RawMessage, handler: &H) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_received();
        }

        if !self.pattern.matches(&message.channel) {
            debug!(
                channel = %message.channel,
                pattern = %self.pattern,
                "Ignoring message outside subscribed pattern"
            );
            self.record_skipped();
            return;
        }

        let Some(notification) = Notification::decode(message, &self.pattern) else {
            debug!("Ignoring keyspace message without a key");
            self.record_skipped();
            return;
        };

        trace!(
            key = %notification.key,
            operation = notification.operation.as_deref().unwrap_or("-"),
            "Dispatching invalidation"
        );

        match dispatch(handler, &notification.key) {
            Ok(()) => {
                self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_dispatched();
                }
            }
            Err(e) => {
                self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_handler_failure();
                }
                error!(key = %notification.key, error = %e, "Invalidation handler panicked");
            }
        }
    }

    fn record_skipped(&self) {
        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_skipped();
        }
    }

    /// Subscribe once, bounded by the connect timeout.
    ///
    /// `Ok(None)` means the token was cancelled while waiting.
    async fn connect(&self) -> Result<Option<C::Subscription>> {
        let timeout = self.config.connect_timeout();

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Ok(None),
            result = tokio::time::timeout(timeout, self.connector.subscribe(&self.pattern)) => {
                match result {
                    Ok(Ok(subscription)) => Ok(Some(subscription)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(InvalidatorError::Connection(format!(
                        "timed out after {}ms subscribing to {}",
                        timeout.as_millis(),
                        self.pattern
                    ))),
                }
            }
        }
    }

    /// Resubscribe with bounded exponential backoff after `cause` broke the
    /// subscription.
    async fn reconnect(&self, cause: InvalidatorError) -> Result<Option<C::Subscription>> {
        let policy = &self.config.reconnect;
        if policy.max_attempts == 0 {
            return Err(into_transport(cause));
        }

        let mut last_error = cause;
        for attempt in 1..=policy.max_attempts {
            let backoff = policy.backoff_for(attempt);
            warn!(
                error = %last_error,
                attempt,
                max_attempts = policy.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                "Keyspace subscription lost, reconnecting"
            );
            self.set_state(ListenerState::Reconnecting { attempt });
            self.stats.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "metrics")]
            if let Some(metrics) = &self.metrics {
                metrics.record_reconnect_attempt();
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(None),
                _ = tokio::time::sleep(backoff) => {}
            }

            match self.connect().await {
                Ok(Some(subscription)) => {
                    info!(
                        attempt,
                        pattern = %self.pattern,
                        "Resubscribed to keyspace notifications"
                    );
                    self.set_state(ListenerState::Subscribed);
                    return Ok(Some(subscription));
                }
                Ok(None) => return Ok(None),
                Err(e) => last_error = e,
            }
        }

        Err(InvalidatorError::Transport(format!(
            "gave up after {} reconnect attempts: {}",
            policy.max_attempts, last_error
        )))
    }

    fn set_state(&self, state: ListenerState) {
        self.state.send_replace(state);
    }
}

fn into_transport(error: InvalidatorError) -> InvalidatorError {
    match error {
        InvalidatorError::Transport(_) => error,
        other => InvalidatorError::Transport(other.to_string()),
    }
}

/// Counters maintained by a running listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    received: AtomicU64,
    dispatched: AtomicU64,
    skipped: AtomicU64,
    empty_replies: AtomicU64,
    handler_failures: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl ListenerStats {
    /// Messages read from the subscription.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Handler invocations that returned normally.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Messages dropped because they were outside the pattern or had no key.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Empty replies read from the subscription.
    pub fn empty_replies(&self) -> u64 {
        self.empty_replies.load(Ordering::Relaxed)
    }

    /// Handler invocations that panicked.
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Resubscription attempts, successful or not.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryConnector;
    use std::sync::Mutex;
    use std::time::Duration;

    fn listener(connector: MemoryConnector) -> InvalidationListener<MemoryConnector> {
        InvalidationListener::new(connector, InvalidatorConfig::new("localhost", 6379))
    }

    #[tokio::test]
    async fn test_run_returns_ok_when_cancelled() {
        let (connector, _publisher) = MemoryConnector::new();
        let listener = listener(connector);
        let token = listener.cancellation_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        assert_eq!(listener.run(|_: &str| {}).await, Ok(()));
        assert_eq!(listener.state(), ListenerState::Terminated);
    }

    #[tokio::test]
    async fn test_initial_connection_error_is_not_retried() {
        let (connector, _publisher) = MemoryConnector::new();
        let connector =
            Arc::new(connector.fail_next_subscribe(InvalidatorError::Connection("refused".into())));
        let listener = InvalidationListener::new(
            Arc::clone(&connector),
            InvalidatorConfig::new("localhost", 6379),
        );

        let result = listener.run(|_: &str| {}).await;
        assert_eq!(result, Err(InvalidatorError::Connection("refused".into())));
        assert_eq!(connector.subscribe_count(), 1);
        assert_eq!(listener.stats().reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_dispatches_key_from_channel() {
        let (connector, publisher) = MemoryConnector::new();
        let listener = listener(connector);
        let token = listener.cancellation_token();
        let seen = Arc::new(Mutex::new(Vec::new()));

        publisher.publish_keyspace(0, "user:42", "set");

        let seen_clone = Arc::clone(&seen);
        let result = listener
            .run(move |key: &str| {
                seen_clone.lock().unwrap().push(key.to_string());
                token.cancel();
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(*seen.lock().unwrap(), vec!["user:42".to_string()]);
        assert_eq!(listener.stats().received(), 1);
        assert_eq!(listener.stats().dispatched(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_without_reconnects_fails() {
        let (connector, publisher) = MemoryConnector::new();
        let config = InvalidatorConfig::new("localhost", 6379)
            .with_reconnect(crate::core::ReconnectConfig::disabled());
        let listener = InvalidationListener::new(connector, config);

        publisher.fail("connection reset");

        let result = listener.run(|_: &str| {}).await;
        assert_eq!(
            result,
            Err(InvalidatorError::Transport("connection reset".into()))
        );
    }

    #[test]
    fn test_into_transport() {
        assert_eq!(
            into_transport(InvalidatorError::Transport("x".into())),
            InvalidatorError::Transport("x".into())
        );
        assert_eq!(
            into_transport(InvalidatorError::Connection("y".into())),
            InvalidatorError::Transport("Connection error: y".into())
        );
    }

    #[cfg(feature = "metrics")]
    #[tokio::test]
    async fn test_reports_into_metrics() {
        let (connector, publisher) = MemoryConnector::new();
        let metrics = ListenerMetrics::new(opentelemetry::global::meter("listener-test"));
        let listener = listener(connector).with_metrics(metrics);
        let token = listener.cancellation_token();

        publisher.publish_empty();
        publisher.publish_keyspace(0, "user:1", "set");

        let result = listener.run(move |_: &str| token.cancel()).await;
        assert!(result.is_ok());
        assert_eq!(listener.stats().empty_replies(), 1);
        assert_eq!(listener.stats().dispatched(), 1);
    }
}
