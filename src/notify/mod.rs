//! Keyspace-notification listening and cache invalidation.
//!
//! Subscribes to `__keyspace@<db>__:<pattern>` and hands the key of every
//! notification to an [`InvalidationHandler`]. The pub/sub client sits behind
//! the [`Connector`] and [`Subscription`] traits: [`RedisConnector`] talks to
//! a real server and [`MemoryConnector`] drives the listener from tests.

mod handle;
mod handler;
mod listener;
mod memory;
mod notification;
#[cfg(feature = "redis-transport")]
mod redis;
mod transport;

pub use handle::{ListenerHandle, ListenerState};
pub use handler::InvalidationHandler;
pub use listener::{InvalidationListener, ListenerStats};
pub use memory::{MemoryConnector, MemoryPublisher, MemorySubscription};
pub use notification::{KeyspacePattern, Notification, RawMessage};
#[cfg(feature = "redis-transport")]
pub use self::redis::{RedisConnector, RedisSubscription};
pub use transport::{Connector, Subscription};
