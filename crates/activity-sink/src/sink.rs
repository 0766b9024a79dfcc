//! Sink trait and the in-memory implementations.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use huntr_core_types::BotStatus;

use crate::message::{ActivityKind, SinkMessage};

/// Messages retained per buffered sink before the oldest are dropped.
const MAX_BUFFERED_MESSAGES: usize = 10_000;

/// Notification channel for bot status and activity messages.
///
/// Every method is fire-and-forget: implementations swallow delivery
/// failures so a dead consumer can never abort the calling operation.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn send(&self, message: SinkMessage);

    async fn send_status(&self, status: BotStatus, message: &str) {
        self.send(SinkMessage::status(status, message)).await;
    }

    async fn send_activity(&self, message: &str, kind: ActivityKind, thread_title: Option<&str>) {
        self.send(
            SinkMessage::activity(message, kind)
                .with_thread(thread_title.map(str::to_string), None),
        )
        .await;
    }
}

/// Sink that drops everything. Useful when a caller has no consumer wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

#[async_trait]
impl ActivitySink for NullSink {
    async fn send(&self, _message: SinkMessage) {}
}

/// Broadcast-backed sink for live consumers (streaming transports, tests).
pub struct BroadcastSink {
    sender: broadcast::Sender<SinkMessage>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkMessage> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl ActivitySink for BroadcastSink {
    async fn send(&self, message: SinkMessage) {
        if let Err(err) = self.sender.send(message) {
            debug!("activity sink has no receivers, dropping message: {err}");
        }
    }
}

/// Materialise an mpsc receiver from a broadcast sink so callers can await
/// messages without handling broadcast lag semantics directly.
pub fn to_mpsc(sink: Arc<BroadcastSink>, capacity: usize) -> mpsc::Receiver<SinkMessage> {
    let mut rx = sink.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            if tx.send(msg).await.is_err() {
                break;
            }
        }
    });
    out_rx
}

/// Sink retaining recent messages for poll-style consumers.
///
/// Bounded so an unpolled run cannot grow without limit; the oldest
/// messages are discarded first.
#[derive(Default)]
pub struct BufferedSink {
    buffer: Mutex<VecDeque<SinkMessage>>,
}

impl BufferedSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take all buffered messages, oldest first.
    pub fn drain(&self) -> Vec<SinkMessage> {
        self.buffer.lock().drain(..).collect()
    }

    /// Copy of the buffer without consuming it.
    pub fn snapshot(&self) -> Vec<SinkMessage> {
        self.buffer.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

#[async_trait]
impl ActivitySink for BufferedSink {
    async fn send(&self, message: SinkMessage) {
        let mut buffer = self.buffer.lock();
        if buffer.len() == MAX_BUFFERED_MESSAGES {
            buffer.pop_front();
            debug!("buffered sink at capacity, dropped oldest message");
        }
        buffer.push_back(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_sink_delivers_to_subscriber() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        sink.send_status(BotStatus::Running, "bot started").await;
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.text(), "bot started");
    }

    #[tokio::test]
    async fn broadcast_sink_without_receivers_does_not_fail() {
        let sink = BroadcastSink::new(8);
        // No subscriber; send must still return normally.
        sink.send_activity("scanning results", ActivityKind::Thinking, None)
            .await;
    }

    #[tokio::test]
    async fn to_mpsc_forwards_broadcast_messages() {
        let sink = BroadcastSink::new(8);
        let mut rx = to_mpsc(sink.clone(), 8);
        sink.send_status(BotStatus::Paused, "bot paused").await;
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.text(), "bot paused");
    }

    #[tokio::test]
    async fn buffered_sink_caps_retention() {
        let sink = BufferedSink::new();
        for i in 0..(MAX_BUFFERED_MESSAGES + 5) {
            sink.send(SinkMessage::activity(format!("m{i}"), ActivityKind::Action))
                .await;
        }
        assert_eq!(sink.len(), MAX_BUFFERED_MESSAGES);
        let first = sink.snapshot().into_iter().next().unwrap();
        assert_eq!(first.text(), "m5");
    }

    #[tokio::test]
    async fn buffered_sink_drain_empties() {
        let sink = BufferedSink::new();
        sink.send_status(BotStatus::Stopped, "done").await;
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.is_empty());
    }
}
