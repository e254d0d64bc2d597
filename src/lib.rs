//! # keyspace-invalidator
//!
//! Cache invalidation driven by Redis keyspace notifications.
//!
//! ## Overview
//!
//! `keyspace-invalidator` subscribes to `__keyspace@<db>__:<pattern>` and calls
//! your handler with the name of every key that changes, so an in-process
//! cache can evict stale entries:
//! - Layered settings (files → `REDIS_*` env vars → validation)
//! - One dedicated subscription per listener, owned by its receive loop
//! - Panic-isolated, strictly ordered handler dispatch
//! - Bounded exponential-backoff reconnects after transport failures
//! - Cooperative shutdown through a [`ListenerHandle`](notify::ListenerHandle)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keyspace_invalidator::prelude::*;
//! use std::collections::HashMap;
//! use std::sync::{Arc, Mutex};
//!
//! # async fn example() -> keyspace_invalidator::error::Result<()> {
//! let cache: Arc<Mutex<HashMap<String, String>>> = Arc::default();
//!
//! // REDIS_HOST, REDIS_PORT, REDIS_PASS, REDIS_DATABASE, ...
//! let listener = InvalidatorBuilder::new()
//!     .with_optional_file("config/invalidator.yaml")
//!     .with_redis_env()
//!     .build()?;
//!
//! let evict = Arc::clone(&cache);
//! let handle = listener.spawn(move |key: &str| {
//!     evict.lock().unwrap().remove(key);
//! });
//!
//! // ... on shutdown
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `redis-transport` (default): the [`RedisConnector`](notify::RedisConnector)
//! - `metrics`: OpenTelemetry instruments for listeners
//!
//! ```toml
//! [dependencies]
//! keyspace-invalidator = { version = "0.1", features = ["metrics"] }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{InvalidatorBuilder, InvalidatorConfig, ReconnectConfig, Validate};
    pub use crate::error::{InvalidatorError, Result, ValidationError};
    pub use crate::notify::{
        InvalidationHandler, InvalidationListener, KeyspacePattern, ListenerHandle,
        ListenerState, Notification,
    };
}
