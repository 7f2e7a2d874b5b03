//! Redis substrate backend.
//!
//! Maps the substrate contract onto Redis: sorted keys are sorted sets,
//! set keys are plain sets, batches execute as one `MULTI`/`EXEC` pipeline
//! round trip, and channels are Redis pub/sub channels.

use crate::traits::{Batch, Command, ScoredMember, Subscription, Substrate, SubstrateError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, warn};

impl From<redis::RedisError> for SubstrateError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            SubstrateError::Connection(err.to_string())
        } else {
            SubstrateError::Backend(err.to_string())
        }
    }
}

/// Redis-backed substrate.
///
/// Mutations and reads share a multiplexed [`ConnectionManager`]; each
/// subscription opens its own pub/sub connection, which is what Redis
/// requires.
#[derive(Clone)]
pub struct RedisSubstrate {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisSubstrate {
    /// Connect to a Redis instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> Result<Self, SubstrateError> {
        let client = redis::Client::open(url)
            .map_err(|e| SubstrateError::Connection(e.to_string()))?;
        let conn = client.get_connection_manager().await?;
        debug!(url = %url, "Connected to redis substrate");
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Substrate for RedisSubstrate {
    async fn apply(&self, batch: Batch) -> Result<(), SubstrateError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in batch.into_commands() {
            match command {
                Command::SortedInsert { key, score, member } => {
                    pipe.zadd(key, member, score).ignore();
                }
                Command::SortedTrim { key, keep } => {
                    // Members below the top `keep` scores sit at ranks
                    // 0..-(keep+1) in ascending order.
                    pipe.zremrangebyrank(key, 0, -(keep as isize + 1)).ignore();
                }
                Command::SortedRemove { key, member } => {
                    pipe.zrem(key, member).ignore();
                }
                Command::SetAdd { key, member } => {
                    pipe.sadd(key, member).ignore();
                }
                Command::SetRemove { key, member } => {
                    pipe.srem(key, member).ignore();
                }
                Command::Delete { key } => {
                    pipe.del(key).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn sorted_members(&self, key: &str) -> Result<Vec<ScoredMember>, SubstrateError> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, f64)> = conn.zrange_withscores(key, 0, -1).await?;
        Ok(entries
            .into_iter()
            .map(|(member, score)| ScoredMember { score, member })
            .collect())
    }

    async fn sorted_len(&self, key: &str) -> Result<usize, SubstrateError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.zcard(key).await?;
        Ok(len)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, SubstrateError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), SubstrateError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload.as_ref()).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, SubstrateError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let channel = channel.to_string();
        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                let payload = Bytes::copy_from_slice(msg.get_payload_bytes());
                if tx.send(payload).is_err() {
                    break;
                }
            }
            warn!(channel = %channel, "Redis subscription ended");
        });

        Ok(Subscription::new(rx))
    }
}
