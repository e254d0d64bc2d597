//! Transport seam between the listener and the store's pub/sub client.

use super::{KeyspacePattern, RawMessage};
use crate::error::Result;
use async_trait::async_trait;

/// Opens pattern subscriptions.
///
/// The listener calls [`Connector::subscribe`] once at startup and again for
/// every reconnect attempt, so implementations must be able to produce a
/// fresh subscription each time.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The live subscription type.
    type Subscription: Subscription;

    /// Connect, enable notifications if configured, and pattern-subscribe.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidatorError::Connection`](crate::error::InvalidatorError::Connection)
    /// if the subscription cannot be established.
    async fn subscribe(&self, pattern: &KeyspacePattern) -> Result<Self::Subscription>;
}

/// A live pattern subscription, owned exclusively by the receive loop.
///
/// Dropping it releases the underlying connection.
#[async_trait]
pub trait Subscription: Send + 'static {
    /// Wait for the next message.
    ///
    /// - `Ok(Some(message))`: a message arrived.
    /// - `Ok(None)`: an empty reply; the connection is still usable.
    /// - `Err(InvalidatorError::Transport(_))`: the subscription is dead.
    async fn next_message(&mut self) -> Result<Option<RawMessage>>;
}

#[async_trait]
impl<C: Connector> Connector for std::sync::Arc<C> {
    type Subscription = C::Subscription;

    async fn subscribe(&self, pattern: &KeyspacePattern) -> Result<Self::Subscription> {
        (**self).subscribe(pattern).await
    }
}
