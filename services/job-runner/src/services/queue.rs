//! Priority queue the runner consumes from.

use crate::error::QueueError;
use crate::jobs::RawMessage;
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of prioritized job messages.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Wait up to `timeout` for up to `max_count` messages.
    ///
    /// Returning fewer than `max_count` messages (including none) is valid
    /// and means nothing else was immediately available.
    ///
    /// Not cancel-safe: messages may already be off the broker when the future
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the broker cannot be reached.
    async fn poll(&self, max_count: usize, timeout: Duration)
        -> Result<Vec<RawMessage>, QueueError>;

    /// Park a message whose job failed. The default discards it.
    ///
    /// # Errors
    ///
    /// Returns error if the broker cannot be reached.
    async fn dead_letter(&self, _message: &RawMessage, _reason: &str) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Entry pushed to the dead-letter list.
#[derive(Debug, Serialize)]
struct DeadLetterRecord<'a> {
    priority: i64,
    payload: &'a str,
    error: &'a str,
    failed_at: i64,
}

/// Redis sorted-set queue: score is the priority, members are JSON payloads.
#[derive(Clone)]
pub struct RedisPriorityQueue {
    /// Redis connection manager.
    conn: ConnectionManager,
    /// Sorted set holding pending messages.
    key: String,
    /// Optional list receiving failed messages.
    dead_letter_key: Option<String>,
}

impl RedisPriorityQueue {
    /// Create a queue reading from the sorted set at `key`.
    #[must_use]
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
            dead_letter_key: None,
        }
    }

    /// Push failed messages to the list at `key` instead of dropping them.
    #[must_use]
    pub fn with_dead_letter(mut self, key: impl Into<String>) -> Self {
        self.dead_letter_key = Some(key.into());
        self
    }

    /// Scores are stored as doubles; priorities are integral.
    #[allow(clippy::cast_possible_truncation)]
    fn to_message((body, score): (Vec<u8>, f64)) -> RawMessage {
        RawMessage::new(score as i64, body)
    }

    fn count(value: usize) -> isize {
        isize::try_from(value).unwrap_or(isize::MAX)
    }
}

#[async_trait]
impl JobQueue for RedisPriorityQueue {
    async fn poll(
        &self,
        max_count: usize,
        timeout: Duration,
    ) -> Result<Vec<RawMessage>, QueueError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();

        let ready: Vec<(Vec<u8>, f64)> = conn.zpopmax(&self.key, Self::count(max_count)).await?;
        if !ready.is_empty() {
            debug!(count = ready.len(), "ZPOPMAX");
            return Ok(ready.into_iter().map(Self::to_message).collect());
        }

        // Nothing ready: block for the first message, then drain without waiting.
        let first: Option<(String, Vec<u8>, f64)> =
            conn.bzpopmax(&self.key, timeout.as_secs_f64()).await?;
        let Some((_, body, score)) = first else {
            return Ok(Vec::new());
        };

        let mut messages = vec![Self::to_message((body, score))];
        if max_count > 1 {
            let rest: Vec<(Vec<u8>, f64)> =
                conn.zpopmax(&self.key, Self::count(max_count - 1)).await?;
            messages.extend(rest.into_iter().map(Self::to_message));
        }

        debug!(count = messages.len(), "BZPOPMAX");
        Ok(messages)
    }

    async fn dead_letter(&self, message: &RawMessage, reason: &str) -> Result<(), QueueError> {
        let Some(ref key) = self.dead_letter_key else {
            return Ok(());
        };

        let payload = String::from_utf8_lossy(message.body());
        let record = serde_json::to_string(&DeadLetterRecord {
            priority: message.priority(),
            payload: &payload,
            error: reason,
            failed_at: Utc::now().timestamp(),
        })?;

        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(key, record).await?;

        warn!(key = %key, priority = message.priority(), "Message moved to dead-letter list");
        Ok(())
    }
}
