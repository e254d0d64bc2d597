//! Listener metrics tracking using OpenTelemetry.

use opentelemetry::metrics::{Counter, Gauge, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for an invalidation listener.
///
/// Cloning is cheap; clones report into the same instruments.
#[derive(Clone)]
pub struct ListenerMetrics {
    received: Counter<u64>,
    dispatched: Counter<u64>,
    skipped: Counter<u64>,
    empty_replies: Counter<u64>,
    handler_failures: Counter<u64>,
    reconnect_attempts: Counter<u64>,
    idle_seconds: Gauge<i64>,
    last_dispatch: Arc<parking_lot::Mutex<Instant>>,
}

impl ListenerMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let received = meter
            .u64_counter("keyspace_invalidator.notifications.received")
            .with_description("Messages read from the subscription")
            .build();

        let dispatched = meter
            .u64_counter("keyspace_invalidator.notifications.dispatched")
            .with_description("Handler invocations that completed")
            .build();

        let skipped = meter
            .u64_counter("keyspace_invalidator.notifications.skipped")
            .with_description("Messages outside the subscribed pattern or without a key")
            .build();

        let empty_replies = meter
            .u64_counter("keyspace_invalidator.replies.empty")
            .with_description("Empty replies from the transport")
            .build();

        let handler_failures = meter
            .u64_counter("keyspace_invalidator.handler.failures")
            .with_description("Handler invocations that panicked")
            .build();

        let reconnect_attempts = meter
            .u64_counter("keyspace_invalidator.reconnect.attempts")
            .with_description("Resubscription attempts after transport errors")
            .build();

        let idle_seconds = meter
            .i64_gauge("keyspace_invalidator.idle")
            .with_description("Time since the last dispatched notification in seconds")
            .with_unit("s")
            .build();

        Self {
            received,
            dispatched,
            skipped,
            empty_replies,
            handler_failures,
            reconnect_attempts,
            idle_seconds,
            last_dispatch: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Record a message read from the subscription.
    pub fn record_received(&self) {
        self.received.add(1, &[]);
        self.update_idle();
    }

    /// Record a completed handler invocation.
    pub fn record_dispatched(&self) {
        self.dispatched.add(1, &[]);
        *self.last_dispatch.lock() = Instant::now();
    }

    /// Record a message that was not dispatched.
    pub fn record_skipped(&self) {
        self.skipped.add(1, &[]);
    }

    /// Record an empty reply.
    pub fn record_empty_reply(&self) {
        self.empty_replies.add(1, &[]);
        self.update_idle();
    }

    /// Record a panicking handler invocation.
    pub fn record_handler_failure(&self) {
        self.handler_failures.add(1, &[]);
    }

    /// Record a reconnect attempt.
    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.add(1, &[]);
    }

    /// Update the idle gauge.
    ///
    /// Also refreshed on every received message and empty reply. Call it
    /// periodically as well; a growing value on a busy store means
    /// invalidations have stopped arriving.
    pub fn update_idle(&self) {
        let idle = self.last_dispatch.lock().elapsed().as_secs() as i64;
        self.idle_seconds.record(idle, &[]);
    }
}
