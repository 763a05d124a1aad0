//! Ordered work queue interface and its in-memory FIFO implementation.
//!
//! Delivery contract:
//! - messages sharing a group id are delivered in send order
//! - no ordering across groups
//! - at-least-once: an unacknowledged message becomes visible again once
//!   its visibility timeout lapses

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::ProviderError;
use crate::ProviderResult;

/// Maximum messages returned by a single receive.
pub const MAX_RECEIVE_BATCH: usize = 10;

/// Maximum length of group and deduplication ids.
pub const MAX_ID_LEN: usize = 128;

/// Window in which a repeated deduplication id is dropped.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(5 * 60);

/// A message as stored by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub group_id: String,
    pub dedup_id: String,
    pub body: serde_json::Value,
    /// How many times the message has been handed to a consumer
    pub receive_count: u32,
}

/// Token proving a consumer holds an in-flight message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A message handed to a consumer together with its receipt.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub receipt: ReceiptHandle,
    pub message: QueueMessage,
}

/// Durable ordered work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a message. Returns `None` when `dedup_id` was already seen
    /// inside the deduplication window.
    async fn send(
        &self,
        group_id: &str,
        dedup_id: &str,
        body: serde_json::Value,
    ) -> ProviderResult<Option<String>>;

    /// Receive up to `max_messages` (1..=10) visible messages.
    async fn receive(&self, max_messages: usize) -> ProviderResult<Vec<ReceivedMessage>>;

    /// Acknowledge (delete) an in-flight message.
    async fn ack(&self, receipt: &ReceiptHandle) -> ProviderResult<()>;
}

#[derive(Debug)]
struct Stored {
    message: QueueMessage,
    in_flight: Option<(ReceiptHandle, Instant)>,
}

#[derive(Debug, Default)]
struct FifoState {
    messages: VecDeque<Stored>,
    dedup: HashMap<String, Instant>,
}

/// In-memory FIFO queue with group ordering, deduplication and
/// visibility-timeout redelivery.
///
/// Uses `tokio::time::Instant`, so tests can drive timeouts with
/// `tokio::time::pause` / `advance`.
#[derive(Debug)]
pub struct MemoryFifoQueue {
    state: Mutex<FifoState>,
    notify: Notify,
    visibility_timeout: Duration,
    receive_wait: Duration,
}

impl MemoryFifoQueue {
    pub fn new(visibility_timeout: Duration, receive_wait: Duration) -> Self {
        Self {
            state: Mutex::new(FifoState::default()),
            notify: Notify::new(),
            visibility_timeout,
            receive_wait,
        }
    }

    /// Messages not yet acknowledged (visible or in flight).
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages currently held by a consumer.
    pub fn in_flight(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|s| s.in_flight.is_some())
            .count()
    }

    fn take_visible(&self, max: usize) -> Vec<ReceivedMessage> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        for stored in state.messages.iter_mut() {
            if matches!(stored.in_flight, Some((_, deadline)) if deadline <= now) {
                stored.in_flight = None;
            }
        }

        // A group with anything in flight is locked until ack or expiry.
        let blocked: HashSet<String> = state
            .messages
            .iter()
            .filter(|s| s.in_flight.is_some())
            .map(|s| s.message.group_id.clone())
            .collect();

        let mut batch = Vec::new();
        for stored in state.messages.iter_mut() {
            if batch.len() >= max {
                break;
            }
            if stored.in_flight.is_some() || blocked.contains(&stored.message.group_id) {
                continue;
            }
            stored.message.receive_count += 1;
            let receipt = ReceiptHandle(uuid::Uuid::new_v4().to_string());
            stored.in_flight = Some((receipt.clone(), now + self.visibility_timeout));
            batch.push(ReceivedMessage {
                receipt,
                message: stored.message.clone(),
            });
        }
        batch
    }
}

fn validate_id(kind: &str, id: &str) -> ProviderResult<()> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(ProviderError::Queue(format!(
            "{kind} must be 1..={MAX_ID_LEN} characters, got {}",
            id.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl WorkQueue for MemoryFifoQueue {
    async fn send(
        &self,
        group_id: &str,
        dedup_id: &str,
        body: serde_json::Value,
    ) -> ProviderResult<Option<String>> {
        validate_id("group id", group_id)?;
        validate_id("deduplication id", dedup_id)?;

        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        state
            .dedup
            .retain(|_, seen| now.duration_since(*seen) < DEDUP_WINDOW);
        if state.dedup.contains_key(dedup_id) {
            tracing::debug!(dedup_id, "duplicate message dropped");
            return Ok(None);
        }
        state.dedup.insert(dedup_id.to_string(), now);

        let message_id = uuid::Uuid::new_v4().to_string();
        state.messages.push_back(Stored {
            message: QueueMessage {
                message_id: message_id.clone(),
                group_id: group_id.to_string(),
                dedup_id: dedup_id.to_string(),
                body,
                receive_count: 0,
            },
            in_flight: None,
        });
        drop(state);

        self.notify.notify_one();
        Ok(Some(message_id))
    }

    async fn receive(&self, max_messages: usize) -> ProviderResult<Vec<ReceivedMessage>> {
        if max_messages == 0 || max_messages > MAX_RECEIVE_BATCH {
            return Err(ProviderError::Queue(format!(
                "max_messages must be 1..={MAX_RECEIVE_BATCH}, got {max_messages}"
            )));
        }

        let batch = self.take_visible(max_messages);
        if !batch.is_empty() || self.receive_wait.is_zero() {
            return Ok(batch);
        }

        // Long poll: wait for a send (or the window to close) before retrying.
        let _ = tokio::time::timeout(self.receive_wait, self.notify.notified()).await;
        Ok(self.take_visible(max_messages))
    }

    async fn ack(&self, receipt: &ReceiptHandle) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .messages
            .iter()
            .position(|s| matches!(&s.in_flight, Some((r, _)) if r == receipt));
        match position {
            Some(index) => {
                state.messages.remove(index);
                Ok(())
            }
            None => Err(ProviderError::Queue(format!(
                "unknown or expired receipt handle: {}",
                receipt.as_str()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue() -> MemoryFifoQueue {
        MemoryFifoQueue::new(Duration::from_secs(30), Duration::ZERO)
    }

    #[tokio::test]
    async fn rejects_out_of_range_batch() {
        let q = queue();
        assert!(q.receive(0).await.is_err());
        assert!(q.receive(MAX_RECEIVE_BATCH + 1).await.is_err());
    }

    #[tokio::test]
    async fn rejects_empty_group_id() {
        let q = queue();
        assert!(q.send("", "d1", json!({})).await.is_err());
        assert!(q.send("g", &"d".repeat(MAX_ID_LEN + 1), json!({})).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_dedup_id_is_dropped() {
        let q = queue();
        assert!(q.send("g", "d1", json!(1)).await.unwrap().is_some());
        assert!(q.send("g", "d1", json!(2)).await.unwrap().is_none());
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn ack_with_unknown_receipt_fails() {
        let q = queue();
        let bogus = ReceiptHandle("nope".to_string());
        assert!(q.ack(&bogus).await.is_err());
    }
}
