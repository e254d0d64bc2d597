//! Handles to spawned listeners.

use super::ListenerStats;
use crate::error::{InvalidatorError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of an invalidation listener.
///
/// `Connecting` → `Subscribed` → (`Reconnecting` → `Subscribed`)* → `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Establishing the initial subscription.
    Connecting,
    /// Subscribed and reading notifications.
    Subscribed,
    /// Subscription lost; waiting for or performing reconnect attempt `attempt` (1-based).
    Reconnecting {
        /// Current attempt number.
        attempt: u32,
    },
    /// The loop has exited. Final.
    Terminated,
}

impl ListenerState {
    /// Whether the loop has exited.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Handle to a listener running on its own task.
///
/// Returned by [`InvalidationListener::spawn`](super::InvalidationListener::spawn).
/// The caller communicates with the listener only through this handle and the
/// handler's side effects.
///
/// Dropping the handle does not stop the listener; call [`stop`](Self::stop),
/// [`cancel`](Self::cancel) or [`abort`](Self::abort).
pub struct ListenerHandle {
    task: JoinHandle<Result<()>>,
    token: CancellationToken,
    state: watch::Receiver<ListenerState>,
    stats: Arc<ListenerStats>,
}

impl ListenerHandle {
    pub(crate) fn new(
        task: JoinHandle<Result<()>>,
        token: CancellationToken,
        state: watch::Receiver<ListenerState>,
        stats: Arc<ListenerStats>,
    ) -> Self {
        Self {
            task,
            token,
            state,
            stats,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Wait until the state satisfies `predicate` and return it.
    ///
    /// If the listener exits without ever satisfying it, returns the final
    /// state instead.
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> ListenerState
    where
        F: FnMut(&ListenerState) -> bool,
    {
        let mut state = self.state.clone();
        let matched = state.wait_for(|s| predicate(s)).await.map(|s| *s);
        match matched {
            Ok(matched) => matched,
            Err(_) => *state.borrow(),
        }
    }

    /// Wait until the listener is subscribed (or has terminated).
    pub async fn subscribed(&self) -> ListenerState {
        self.wait_for_state(|s| matches!(s, ListenerState::Subscribed | ListenerState::Terminated))
            .await
    }

    /// Counters of the running listener.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// The listener's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Ask the loop to exit without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Abort the task immediately.
    ///
    /// Unlike [`cancel`](Self::cancel), this does not let the loop observe the
    /// stop signal; [`join`](Self::join) then reports [`InvalidatorError::Cancelled`].
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to release its connection.
    ///
    /// # Errors
    ///
    /// Returns the error the loop failed with if it had already terminated,
    /// or [`InvalidatorError::Cancelled`] if the task was aborted.
    pub async fn stop(self) -> Result<()> {
        self.token.cancel();
        self.join().await
    }

    /// Wait for the loop to finish on its own.
    ///
    /// # Errors
    ///
    /// See [`InvalidationListener::run`](super::InvalidationListener::run).
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(InvalidatorError::Cancelled),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}
