use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::connection::TopicStream;
use crate::handler::MessageHandler;
use crate::registry::RouterConnectionRegistry;

/// Cross-thread view of one worker's counters.
///
/// The worker writes, the stats reporter reads; nothing here locks.
#[derive(Clone, Debug)]
pub struct WorkerStats {
    pub id: usize,
    pub topic: String,
    read: Arc<AtomicU64>,
    queue: Arc<AtomicUsize>,
}

impl WorkerStats {
    /// Total records read since startup.
    pub fn message_count(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    /// Records currently queued on the worker's stream.
    pub fn queue_depth(&self) -> usize {
        self.queue.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
impl WorkerStats {
    /// Stats snapshot with preset counters, for reporter tests.
    pub fn fixed(id: usize, topic: &str, read: u64, queue: usize) -> Self {
        Self {
            id,
            topic: topic.to_string(),
            read: Arc::new(AtomicU64::new(read)),
            queue: Arc::new(AtomicUsize::new(queue)),
        }
    }
}

/// A spawned worker: its counters plus the task handle the shutdown
/// coordinator joins on.
#[derive(Debug)]
pub struct WorkerHandle {
    pub stats: WorkerStats,
    pub join: JoinHandle<()>,
}

/// Per-slot execution unit.
///
/// Runs an independent loop over its bound stream:
/// 1. Count the record (atomic, lock-free)
/// 2. Delegate the record and the shared registry to the handler
///
/// FAILURE ISOLATION:
/// - A handler error fails that record only; the loop logs and continues.
///
/// TERMINATION:
/// - Stream exhaustion (connection stopped) ends the loop.
/// - The stop signal is checked first on every iteration, so after it
///   fires the worker finishes the record in flight and starts no new one.
///
pub struct ConsumerWorker {
    id: usize,
    stream: TopicStream,
    handler: Arc<dyn MessageHandler>,
    registry: RouterConnectionRegistry,
    stop: watch::Receiver<bool>,
    read: Arc<AtomicU64>,
}

impl ConsumerWorker {
    pub fn new(
        id: usize,
        stream: TopicStream,
        handler: Arc<dyn MessageHandler>,
        registry: RouterConnectionRegistry,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            stream,
            handler,
            registry,
            stop,
            read: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            topic: self.stream.topic().to_string(),
            read: self.read.clone(),
            queue: self.stream.depth_gauge(),
        }
    }

    pub async fn run(mut self) {
        debug!("Worker {} consuming {}", self.id, self.stream.topic());

        loop {
            tokio::select! {
                biased;

                _ = self.stop.changed() => break,

                next = self.stream.next() => {
                    let Some(msg) = next else {
                        debug!("Worker {}: stream for {} exhausted", self.id, self.stream.topic());
                        break;
                    };

                    self.read.fetch_add(1, Ordering::Relaxed);

                    if let Err(err) = self.handler.handle(&msg, &self.registry).await {
                        warn!(
                            "Worker {}: failed to process {}[{}]@{}: {:#}",
                            self.id, msg.topic, msg.partition, msg.offset, err
                        );
                    }
                }
            }
        }

        debug!("Worker {} stopped", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TopicStream;
    use crate::testing::{CountingHandler, FailOddOffsets, message};
    use std::time::Duration;

    fn spawn_worker(
        stream: TopicStream,
        handler: Arc<dyn MessageHandler>,
    ) -> (WorkerStats, JoinHandle<()>, watch::Sender<bool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = ConsumerWorker::new(
            0,
            stream,
            handler,
            RouterConnectionRegistry::new(),
            stop_rx,
        );
        let stats = worker.stats();
        (stats, tokio::spawn(worker.run()), stop_tx)
    }

    #[tokio::test]
    async fn counts_and_delegates_every_record() {
        let (sender, stream) = TopicStream::bounded("openbmp.parsed.router", 16);
        let handler = Arc::new(CountingHandler::default());
        let (stats, join, _stop_tx) = spawn_worker(stream, handler.clone());

        for offset in 0..5 {
            sender.push(message("openbmp.parsed.router", offset)).await.unwrap();
        }
        drop(sender);
        join.await.unwrap();

        assert_eq!(stats.message_count(), 5);
        assert_eq!(handler.handled(), 5);
        assert_eq!(stats.queue_depth(), 0);
    }

    #[tokio::test]
    async fn handler_failure_does_not_stop_the_loop() {
        let (sender, stream) = TopicStream::bounded("openbmp.parsed.peer", 16);
        let handler = Arc::new(FailOddOffsets::default());
        let (stats, join, _stop_tx) = spawn_worker(stream, handler.clone());

        for offset in 0..4 {
            sender.push(message("openbmp.parsed.peer", offset)).await.unwrap();
        }
        drop(sender);
        join.await.unwrap();

        // Records 1 and 3 failed in the handler; all four were still read.
        assert_eq!(stats.message_count(), 4);
        assert_eq!(handler.attempted(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_ends_the_loop_without_new_records() {
        let (sender, stream) = TopicStream::bounded("openbmp.parsed.bmp_stat", 16);
        let handler = Arc::new(CountingHandler::default());
        let (stats, join, stop_tx) = spawn_worker(stream, handler.clone());

        sender.push(message("openbmp.parsed.bmp_stat", 0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handler.handled(), 1);

        stop_tx.send(true).unwrap();
        join.await.unwrap();

        // The worker is gone: its stream rejects further records and the
        // counters stay where the signal left them.
        assert!(sender.push(message("openbmp.parsed.bmp_stat", 1)).await.is_err());
        assert_eq!(stats.message_count(), 1);
        assert_eq!(handler.handled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_record_finishes_after_stop() {
        let (sender, stream) = TopicStream::bounded("openbmp.parsed.collector", 16);
        let handler = Arc::new(CountingHandler::with_delay(Duration::from_millis(200)));
        let (stats, join, stop_tx) = spawn_worker(stream, handler.clone());

        sender.push(message("openbmp.parsed.collector", 0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Record 0 is mid-handle; the signal must not cut it short.
        stop_tx.send(true).unwrap();
        join.await.unwrap();

        assert_eq!(handler.handled(), 1);
        assert_eq!(stats.message_count(), 1);
    }
}
