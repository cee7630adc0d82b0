// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process bus used by tests and single-node deployments.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use super::{Consumer, Message, Producer, bus_error};
use crate::error::Result;

/// Producer that records everything it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingProducer {
    sent: Mutex<Vec<Message>>,
    fail: AtomicBool,
}

impl RecordingProducer {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with a bus error.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all recorded messages.
    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recorded messages on one topic.
    pub fn on_topic(&self, topic: &str) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }

    /// Drain the recorded messages.
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait::async_trait]
impl Producer for RecordingProducer {
    async fn send(&self, messages: Vec<Message>) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(bus_error("send", "producer configured to fail"));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(messages);
        Ok(())
    }
}

/// FIFO queue that is both a producer and a consumer.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queue: Mutex<VecDeque<Message>>,
    ready: Notify,
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drain(&self) -> Vec<Message> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }
}

#[async_trait::async_trait]
impl Producer for MemoryQueue {
    async fn send(&self, messages: Vec<Message>) -> Result<()> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(messages);
        self.ready.notify_one();
        Ok(())
    }
}

#[async_trait::async_trait]
impl Consumer for MemoryQueue {
    async fn poll(&self, timeout: Duration) -> Result<Vec<Message>> {
        let batch = self.drain();
        if !batch.is_empty() {
            return Ok(batch);
        }
        let _ = tokio::time::timeout(timeout, self.ready.notified()).await;
        Ok(self.drain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn message(topic: &str) -> Message {
        Message {
            topic: topic.to_string(),
            key: "1".to_string(),
            headers: HashMap::new(),
            value: serde_json::json!({"type": "TEST"}),
        }
    }

    #[tokio::test]
    async fn test_recording_producer_failure_mode() {
        let producer = RecordingProducer::new();
        producer.send(vec![message("a")]).await.unwrap();

        producer.set_failing(true);
        let err = producer.send(vec![message("b")]).await.unwrap_err();
        assert_eq!(err.error_code(), "BUS_ERROR");

        assert_eq!(producer.on_topic("a").len(), 1);
        assert!(producer.on_topic("b").is_empty());
        assert_eq!(producer.take().len(), 1);
        assert!(producer.messages().is_empty());
    }

    #[tokio::test]
    async fn test_memory_queue_delivers_fifo() {
        let queue = MemoryQueue::new();
        queue.send(vec![message("a"), message("b")]).await.unwrap();

        let batch = queue.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].topic, "a");
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_queue_poll_times_out_empty() {
        let queue = MemoryQueue::new();
        let batch = queue.poll(Duration::from_millis(50)).await.unwrap();
        assert!(batch.is_empty());
    }
}
