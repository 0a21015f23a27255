use crate::domain::models::message::{BrokerMessage, Envelope};
use crate::domain::ports::Broker;
use crate::error::AppError;
use async_trait::async_trait;
use deadpool_redis::redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Connection, Pool};
use std::time::Duration;
use tracing::warn;

/// Redis Streams backend: replicated append-only log with consumer groups.
/// `XREADGROUP` gives each message to exactly one live consumer,
/// `XAUTOCLAIM` re-surfaces entries whose consumer died before acking, and a
/// dedicated stream keeps dead-lettered envelopes for inspection.
pub struct RedisStreamBroker {
    pool: Pool,
    stream: String,
    dead_stream: String,
    group: String,
}

impl RedisStreamBroker {
    pub fn new(pool: Pool, stream: &str, group: &str) -> Self {
        Self {
            pool,
            stream: stream.to_string(),
            dead_stream: format!("{}:dead", stream),
            group: group.to_string(),
        }
    }

    async fn conn(&self) -> Result<Connection, AppError> {
        // fail fast: the pool wait timeout bounds this, the caller falls
        // back to the ledger path on error
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Broker(format!("Redis pool error: {}", e)))
    }

    /// Creates the consumer group, tolerating "already exists".
    pub async fn ensure_group(&self) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let created: Result<String, _> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "$")
            .await;
        match created {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(AppError::Broker(format!("XGROUP CREATE failed: {}", e))),
        }
    }

    fn decode_entry(&self, entry: &StreamId, redeliveries: u32) -> Option<BrokerMessage> {
        let intent_id: Option<String> = entry.get("intent_id");
        let correlation_id: Option<String> = entry.get("correlation_id");
        let enqueued_at: Option<String> = entry.get("enqueued_at");

        let Some(intent_id) = intent_id else {
            warn!(entry_id = %entry.id, "Dropping malformed broker entry without intent_id");
            return None;
        };

        Some(BrokerMessage {
            envelope: Envelope {
                intent_id,
                correlation_id: correlation_id.unwrap_or_default(),
                enqueued_at: enqueued_at
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or_else(chrono::Utc::now),
            },
            delivery_id: entry.id.clone(),
            redeliveries,
        })
    }
}

#[async_trait]
impl Broker for RedisStreamBroker {
    async fn publish(&self, envelope: &Envelope) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let _: String = conn
            .xadd(
                &self.stream,
                "*",
                &[
                    ("intent_id", envelope.intent_id.as_str()),
                    ("correlation_id", envelope.correlation_id.as_str()),
                    ("enqueued_at", &envelope.enqueued_at.to_rfc3339()),
                ],
            )
            .await
            .map_err(|e| AppError::Broker(format!("XADD failed: {}", e)))?;
        Ok(())
    }

    async fn consume(&self, consumer: &str, batch: usize, visibility: Duration) -> Result<Vec<BrokerMessage>, AppError> {
        let mut conn = self.conn().await?;
        let mut messages = Vec::new();

        // abandoned entries first: claims anything unacked longer than the
        // visibility timeout, regardless of which consumer held it
        let reclaimed: StreamAutoClaimReply = match conn
            .xautoclaim_options(
                &self.stream,
                &self.group,
                consumer,
                visibility.as_millis() as usize,
                "0-0",
                StreamAutoClaimOptions::default().count(batch),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) if e.to_string().contains("NOGROUP") => {
                // Redis was unreachable at boot; create the group now and
                // pick up entries on the next cycle
                self.ensure_group().await?;
                return Ok(messages);
            }
            Err(e) => return Err(AppError::Broker(format!("XAUTOCLAIM failed: {}", e))),
        };

        for entry in &reclaimed.claimed {
            if let Some(message) = self.decode_entry(entry, 1) {
                messages.push(message);
            }
        }

        if messages.len() < batch {
            let fresh: StreamReadReply = conn
                .xread_options(
                    &[&self.stream],
                    &[">"],
                    &StreamReadOptions::default()
                        .group(&self.group, consumer)
                        .count(batch - messages.len()),
                )
                .await
                .map_err(|e| AppError::Broker(format!("XREADGROUP failed: {}", e)))?;

            for key in &fresh.keys {
                for entry in &key.ids {
                    if let Some(message) = self.decode_entry(entry, 0) {
                        messages.push(message);
                    }
                }
            }
        }

        Ok(messages)
    }

    async fn ack(&self, message: &BrokerMessage) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .xack(&self.stream, &self.group, &[&message.delivery_id])
            .await
            .map_err(|e| AppError::Broker(format!("XACK failed: {}", e)))?;
        Ok(())
    }

    async fn dead_letter(&self, message: &BrokerMessage, reason: &str) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let _: String = conn
            .xadd(
                &self.dead_stream,
                "*",
                &[
                    ("intent_id", message.envelope.intent_id.as_str()),
                    ("correlation_id", message.envelope.correlation_id.as_str()),
                    ("reason", reason),
                ],
            )
            .await
            .map_err(|e| AppError::Broker(format!("XADD to dead stream failed: {}", e)))?;
        let _: i64 = conn
            .xack(&self.stream, &self.group, &[&message.delivery_id])
            .await
            .map_err(|e| AppError::Broker(format!("XACK failed: {}", e)))?;
        Ok(())
    }
}
