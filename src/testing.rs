//! Test doubles shared by the consumer, stats, and shutdown tests.
//!
//! Compiled only for test builds. Everything here is channel-backed so the
//! orchestration paths run without a broker or a database.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::connection::{StreamSender, StreamSource, TopicStream};
use crate::handler::MessageHandler;
use crate::registry::RouterConnectionRegistry;
use crate::schema::TopicMessage;

pub fn message(topic: &str, offset: i64) -> TopicMessage {
    TopicMessage {
        topic: topic.to_string(),
        partition: 0,
        offset,
        key: None,
        payload: format!("{{\"seq\":{}}}", offset).into_bytes(),
        timestamp: None,
    }
}

/// Stream source backed by in-memory queues.
///
/// Keeps the producer half of every opened stream so tests can feed
/// records after the pool has started. Can be told to fail on a specific
/// topic to exercise all-or-nothing startup.
#[derive(Default)]
pub struct MockStreamSource {
    pub senders: HashMap<String, Vec<StreamSender>>,
    pub fail_on: Option<String>,
    pub opened: Vec<String>,
}

impl MockStreamSource {
    pub fn failing_on(topic: &str) -> Self {
        Self {
            fail_on: Some(topic.to_string()),
            ..Self::default()
        }
    }
}

impl StreamSource for MockStreamSource {
    fn open_stream(&mut self, topic: &str) -> anyhow::Result<TopicStream> {
        if self.fail_on.as_deref() == Some(topic) {
            anyhow::bail!("no leader available for {}", topic);
        }
        self.opened.push(topic.to_string());
        let (sender, stream) = TopicStream::bounded(topic, 64);
        self.senders.entry(topic.to_string()).or_default().push(sender);
        Ok(stream)
    }
}

/// Handler that counts successful deliveries, optionally taking a fixed
/// amount of (virtual) time per record.
#[derive(Default)]
pub struct CountingHandler {
    handled: AtomicU64,
    delay: Option<Duration>,
}

impl CountingHandler {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            handled: AtomicU64::new(0),
            delay: Some(delay),
        }
    }

    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageHandler for CountingHandler {
    async fn handle(
        &self,
        _msg: &TopicMessage,
        _registry: &RouterConnectionRegistry,
    ) -> anyhow::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Handler that rejects records with odd offsets, for failure-isolation
/// tests.
#[derive(Default)]
pub struct FailOddOffsets {
    attempted: AtomicU64,
}

impl FailOddOffsets {
    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageHandler for FailOddOffsets {
    async fn handle(
        &self,
        msg: &TopicMessage,
        _registry: &RouterConnectionRegistry,
    ) -> anyhow::Result<()> {
        self.attempted.fetch_add(1, Ordering::SeqCst);
        if msg.offset % 2 == 1 {
            anyhow::bail!("malformed record at offset {}", msg.offset);
        }
        Ok(())
    }
}

/// Handler that never returns; simulates a worker wedged mid-record.
pub struct StuckHandler;

#[async_trait::async_trait]
impl MessageHandler for StuckHandler {
    async fn handle(
        &self,
        _msg: &TopicMessage,
        _registry: &RouterConnectionRegistry,
    ) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Convenience: shared registry + handler pair used by pool tests.
pub fn registry_and_handler() -> (RouterConnectionRegistry, Arc<CountingHandler>) {
    (
        RouterConnectionRegistry::new(),
        Arc::new(CountingHandler::default()),
    )
}
