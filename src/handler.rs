use std::sync::Arc;

use log::debug;

use crate::config::Config;
use crate::registry::RouterConnectionRegistry;
use crate::schema::TopicMessage;

/// MessageHandler is the seam between:
/// - The generic consumer-pool runtime
/// - The per-topic message processing (decode + storage writes)
///
/// One handler instance is shared by every worker, so implementations keep
/// their mutable state behind their own synchronization.
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - Called concurrently from all worker tasks
///
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes one raw record from a topic stream.
    ///
    /// PARAMETERS:
    /// - `msg`: undecoded record, exactly as read from the stream
    /// - `registry`: shared router-connection map; handlers for the
    ///   collector, router, and peer topics record connection changes here
    ///   as a side effect
    ///
    /// CONTRACT:
    /// - Must not panic on malformed payloads; return an error instead
    /// - An error fails this record only. The calling worker logs it and
    ///   moves on to the next record, so implementations must leave their
    ///   own state consistent on the error path.
    ///
    async fn handle(
        &self,
        msg: &TopicMessage,
        registry: &RouterConnectionRegistry,
    ) -> anyhow::Result<()>;
}

/// Handler used until a storage backend is attached.
///
/// Logs each record at debug level and drops it. Keeps the heartbeat
/// staleness threshold around because the storage handler needs it to age
/// out collectors that stopped reporting.
///
/// TODO:
/// - Port the per-topic MySQL writers and register them here.
///
pub struct LoggingHandler {
    expected_heartbeat_interval: u64,
}

impl LoggingHandler {
    pub fn new(cfg: &Config) -> Arc<Self> {
        Arc::new(Self {
            expected_heartbeat_interval: cfg.expected_heartbeat_interval,
        })
    }

    /// Max collector heartbeat age in milliseconds, as configured.
    #[allow(dead_code)]
    pub fn expected_heartbeat_interval(&self) -> u64 {
        self.expected_heartbeat_interval
    }
}

#[async_trait::async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(
        &self,
        msg: &TopicMessage,
        _registry: &RouterConnectionRegistry,
    ) -> anyhow::Result<()> {
        debug!(
            "{}[{}]@{}: {} bytes",
            msg.topic,
            msg.partition,
            msg.offset,
            msg.payload.len()
        );
        Ok(())
    }
}
