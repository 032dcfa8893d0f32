use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};
use rdkafka::ClientConfig;
use rdkafka::Message;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::BorrowedMessage;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use crate::config::Config;
use crate::schema::TopicMessage;

/// Fixed delay between connection attempts after a transient failure.
///
/// Deliberately constant and uncapped: the historical behavior is to retry
/// forever at this cadence until the coordination layer answers or the
/// process is stopped.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(1500);

/// How long one metadata probe may take before it counts as a timeout.
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-stream queue capacity between the Kafka forwarder and its worker.
const STREAM_QUEUE_CAPACITY: usize = 10_000;

/// Outcome classification for connection establishment.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Coordination handshake or metadata fetch timed out; worth retrying.
    #[error("transient kafka failure: {0}")]
    Transient(String),

    /// Unreachable host, malformed address, rejected credentials. Retrying
    /// cannot help; startup aborts.
    #[error("fatal kafka failure: {0}")]
    Fatal(String),

    /// The stop signal fired while the retry loop was still working.
    #[error("connection attempt interrupted by shutdown")]
    Interrupted,
}

/// Supervisor-visible connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// One attempt at establishing a connection.
///
/// The supervisor owns the retry policy; implementations only perform a
/// single attempt and classify its failure as transient or fatal.
#[async_trait::async_trait]
pub trait Connector {
    type Connection: Send;

    async fn attempt(&self) -> Result<Self::Connection, ConnectError>;

    /// Address shown in connection log lines.
    fn target(&self) -> &str;
}

/// Drives a `Connector` until it yields a live connection.
///
/// GUARANTEES:
/// - `state()` is `Connected` exactly when `connect` returned a handle.
/// - Transient failures retry forever at `CONNECT_RETRY_DELAY`, without
///   backoff growth.
/// - Fatal failures and the stop signal abort the loop; the loop never
///   hangs once stop fires.
///
pub struct ConnectionSupervisor<C: Connector> {
    connector: C,
    state: ConnectionState,
}

impl<C: Connector + Sync> ConnectionSupervisor<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            state: ConnectionState::Disconnected,
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub async fn connect(
        &mut self,
        mut stop: watch::Receiver<bool>,
    ) -> Result<C::Connection, ConnectError> {
        self.state = ConnectionState::Connecting;

        loop {
            if *stop.borrow() {
                self.state = ConnectionState::Failed;
                return Err(ConnectError::Interrupted);
            }

            debug!("Connecting to kafka: {}", self.connector.target());

            match self.connector.attempt().await {
                Ok(connection) => {
                    self.state = ConnectionState::Connected;
                    info!("Connected to kafka: {}", self.connector.target());
                    return Ok(connection);
                }

                Err(ConnectError::Transient(reason)) => {
                    warn!("Timeout connecting to kafka, will retry: {}", reason);

                    tokio::select! {
                        _ = stop.changed() => {
                            self.state = ConnectionState::Failed;
                            return Err(ConnectError::Interrupted);
                        }
                        _ = sleep(CONNECT_RETRY_DELAY) => {}
                    }
                }

                Err(err) => {
                    self.state = ConnectionState::Failed;
                    error!("Failed connection, check hostname/ip or kafka server: {}", err);
                    return Err(err);
                }
            }
        }
    }
}

// ------------------------------------------------------------
// Topic streams
// ------------------------------------------------------------
//
// A TopicStream is the worker-facing half of a bounded queue; the
// producer-facing half (StreamSender) lives inside the per-slot forwarder
// task. The shared depth gauge is what the stats reporter prints as the
// queue column.
//

/// Producer half of a topic stream.
pub struct StreamSender {
    tx: mpsc::Sender<TopicMessage>,
    depth: Arc<AtomicUsize>,
}

impl StreamSender {
    /// Enqueues one record, waiting when the queue is full.
    ///
    /// Errors only when the consuming worker is gone.
    pub async fn push(
        &self,
        msg: TopicMessage,
    ) -> Result<(), mpsc::error::SendError<TopicMessage>> {
        self.tx.send(msg).await?;
        self.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Consumer half of a topic stream; owned by exactly one worker.
pub struct TopicStream {
    topic: String,
    rx: mpsc::Receiver<TopicMessage>,
    depth: Arc<AtomicUsize>,
}

impl TopicStream {
    pub fn bounded(topic: &str, capacity: usize) -> (StreamSender, TopicStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let depth = Arc::new(AtomicUsize::new(0));
        (
            StreamSender {
                tx,
                depth: depth.clone(),
            },
            TopicStream {
                topic: topic.to_string(),
                rx,
                depth,
            },
        )
    }

    /// Next record, or `None` once the stream is exhausted (all senders
    /// dropped and the queue drained).
    pub async fn next(&mut self) -> Option<TopicMessage> {
        let msg = self.rx.recv().await;
        if msg.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        msg
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Shared gauge of records sitting unconsumed in this stream.
    pub fn depth_gauge(&self) -> Arc<AtomicUsize> {
        self.depth.clone()
    }
}

/// Anything able to hand out one stream per (topic, replica) slot.
pub trait StreamSource {
    fn open_stream(&mut self, topic: &str) -> anyhow::Result<TopicStream>;
}

// ------------------------------------------------------------
// Kafka implementation
// ------------------------------------------------------------

/// Builds the rdkafka client configuration and performs single connection
/// attempts against it.
pub struct KafkaConnector {
    client_config: ClientConfig,
    target: String,
}

impl KafkaConnector {
    pub fn new(cfg: &Config) -> Self {
        info!(
            "Using {} for Kafka offset reset",
            cfg.offset_reset.as_kafka()
        );

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &cfg.kafka_address)
            .set("group.id", &cfg.group_id)
            .set("client.id", cfg.client_id())
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("auto.offset.reset", cfg.offset_reset.as_kafka());

        Self {
            client_config,
            target: cfg.kafka_address.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Connector for KafkaConnector {
    type Connection = KafkaConnection;

    async fn attempt(&self) -> Result<KafkaConnection, ConnectError> {
        let client_config = self.client_config.clone();

        // librdkafka's metadata fetch is blocking; keep it off the runtime.
        tokio::task::spawn_blocking(move || {
            let probe: BaseConsumer = client_config.create().map_err(classify)?;
            probe
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map_err(classify)?;
            Ok(())
        })
        .await
        .map_err(|err| ConnectError::Fatal(format!("connection probe task failed: {}", err)))??;

        Ok(KafkaConnection::new(self.client_config.clone()))
    }

    fn target(&self) -> &str {
        &self.target
    }
}

/// Maps rdkafka failures onto the retry policy. Metadata timeouts mirror
/// the old coordination-session timeout and stay retryable; everything
/// else (transport, all brokers down, authentication, malformed config)
/// aborts startup.
fn classify(err: KafkaError) -> ConnectError {
    match &err {
        KafkaError::MetadataFetch(code) => match code {
            RDKafkaErrorCode::OperationTimedOut | RDKafkaErrorCode::RequestTimedOut => {
                ConnectError::Transient(err.to_string())
            }
            _ => ConnectError::Fatal(err.to_string()),
        },
        _ => ConnectError::Fatal(err.to_string()),
    }
}

/// Live connection to the Kafka cluster.
///
/// Hands out one stream per (topic, replica) slot. Each stream is fed by
/// its own background forwarder task, all of which observe the
/// connection-wide stop signal. `shutdown` stops every subscription and is
/// safe to call any number of times.
pub struct KafkaConnection {
    client_config: ClientConfig,
    stop_tx: watch::Sender<bool>,
}

impl KafkaConnection {
    pub fn new(client_config: ClientConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            client_config,
            stop_tx,
        }
    }

    /// Stops all topic subscriptions. Forwarder tasks drain out on their
    /// own; their streams then report exhaustion to the workers.
    pub fn shutdown(&self) {
        debug!("Stopping topic subscriptions");
        let _ = self.stop_tx.send(true);
    }
}

impl StreamSource for KafkaConnection {
    fn open_stream(&mut self, topic: &str) -> anyhow::Result<TopicStream> {
        let consumer: StreamConsumer = self
            .client_config
            .create()
            .with_context(|| format!("creating consumer for {}", topic))?;
        consumer
            .subscribe(&[topic])
            .with_context(|| format!("subscribing to {}", topic))?;

        let (sender, stream) = TopicStream::bounded(topic, STREAM_QUEUE_CAPACITY);
        let mut stop = self.stop_tx.subscribe();
        let topic_name = topic.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = stop.changed() => break,

                    received = consumer.recv() => match received {
                        Ok(msg) => {
                            if sender.push(to_owned_message(&msg)).await.is_err() {
                                // Worker is gone; nothing left to feed.
                                break;
                            }
                        }
                        Err(err) => {
                            warn!("Kafka read error on {}: {}", topic_name, err);
                        }
                    },
                }
            }

            consumer.unsubscribe();
            debug!("Subscription for {} stopped", topic_name);
        });

        Ok(stream)
    }
}

fn to_owned_message(msg: &BorrowedMessage<'_>) -> TopicMessage {
    TopicMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(|k| k.to_vec()),
        payload: msg.payload().map(|p| p.to_vec()).unwrap_or_default(),
        timestamp: match msg.timestamp() {
            rdkafka::Timestamp::CreateTime(t) | rdkafka::Timestamp::LogAppendTime(t) => Some(t),
            rdkafka::Timestamp::NotAvailable => None,
        },
    }
}
