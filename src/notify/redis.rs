//! Redis transport.

use super::{Connector, KeyspacePattern, RawMessage, Subscription};
use crate::core::InvalidatorConfig;
use crate::error::{InvalidatorError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::fmt;
use tracing::{debug, info};

/// Opens keyspace-notification subscriptions on a Redis server.
///
/// Each call to [`Connector::subscribe`] opens a dedicated pub/sub
/// connection. When `configure_notifications` is set, notifications are
/// enabled first with `CONFIG SET notify-keyspace-events <flags>`.
pub struct RedisConnector {
    info: ConnectionInfo,
    notify_keyspace_events: String,
    configure_notifications: bool,
}

impl RedisConnector {
    /// Create a connector for the server described by `config`.
    pub fn new(config: &InvalidatorConfig) -> Self {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.database,
                username: config.username.clone(),
                password: config.password.clone(),
                ..Default::default()
            },
        };

        Self {
            info,
            notify_keyspace_events: config.notify_keyspace_events.clone(),
            configure_notifications: config.configure_notifications,
        }
    }

    /// Connection parameters handed to the Redis client.
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    async fn enable_notifications(&self, client: &redis::Client) -> Result<()> {
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| connection_error("failed to connect", e))?;

        redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg(&self.notify_keyspace_events)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| connection_error("failed to enable keyspace notifications", e))?;

        debug!(flags = %self.notify_keyspace_events, "Keyspace notifications enabled");
        Ok(())
    }
}

impl fmt::Debug for RedisConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnector")
            .field("addr", &self.info.addr)
            .field("db", &self.info.redis.db)
            .field("username", &self.info.redis.username)
            .field(
                "password",
                &self.info.redis.password.as_ref().map(|_| "<redacted>"),
            )
            .field("notify_keyspace_events", &self.notify_keyspace_events)
            .field("configure_notifications", &self.configure_notifications)
            .finish()
    }
}

fn connection_error(context: &str, e: redis::RedisError) -> InvalidatorError {
    InvalidatorError::Connection(format!("{context}: {e}"))
}

#[async_trait]
impl Connector for RedisConnector {
    type Subscription = RedisSubscription;

    async fn subscribe(&self, pattern: &KeyspacePattern) -> Result<Self::Subscription> {
        let client = redis::Client::open(self.info.clone())
            .map_err(|e| connection_error("invalid connection parameters", e))?;

        if self.configure_notifications {
            self.enable_notifications(&client).await?;
        }

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| connection_error("failed to open pub/sub connection", e))?;

        pubsub
            .psubscribe(pattern.as_str())
            .await
            .map_err(|e| connection_error("failed to subscribe", e))?;

        info!(addr = %self.info.addr, pattern = %pattern, "Redis pattern subscription opened");

        Ok(RedisSubscription {
            messages: pubsub.into_on_message().boxed(),
        })
    }
}

/// A live `PSUBSCRIBE` on a dedicated Redis connection.
pub struct RedisSubscription {
    messages: BoxStream<'static, redis::Msg>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_message(&mut self) -> Result<Option<RawMessage>> {
        match self.messages.next().await {
            Some(msg) => Ok(Some(RawMessage {
                channel: msg.get_channel_name().to_string(),
                payload: msg.get_payload::<String>().ok(),
            })),
            None => Err(InvalidatorError::Transport(
                "pub/sub stream ended".to_string(),
            )),
        }
    }
}

impl fmt::Debug for RedisSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSubscription").finish_non_exhaustive()
    }
}
