//! Built-in metrics for invalidation listeners.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Notifications received, dispatched, and skipped
//! - Empty replies
//! - Handler failures
//! - Reconnect attempts
//! - Time since the last dispatched notification
//!
//! # Examples
//!
//! ```rust,no_run
//! use keyspace_invalidator::prelude::*;
//! use keyspace_invalidator::metrics::ListenerMetrics;
//! use opentelemetry::global;
//!
//! # fn example() -> Result<()> {
//! let listener = InvalidatorBuilder::new()
//!     .with_redis_env()
//!     .build()?
//!     .with_metrics(ListenerMetrics::new(global::meter("my-app")));
//! # Ok(())
//! # }
//! ```

mod listener_metrics;

pub use listener_metrics::ListenerMetrics;
