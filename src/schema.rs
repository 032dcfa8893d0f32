/// Undecoded Kafka record as handed from a topic stream to its worker.
///
/// This struct is the unit of exchange between:
/// - The per-slot stream forwarder (Kafka side)
/// - The ConsumerWorker loop
/// - The MessageHandler collaborator
///
/// The payload stays raw bytes on purpose: decoding the openbmp.parsed.*
/// wire format is the handler's job, not the consumer core's.
///
/// DESIGN NOTES:
/// - Owned data only, so messages can cross task boundaries freely.
/// - No rdkafka types leak through this seam; everything downstream of the
///   forwarder can be exercised without a broker.
///
#[derive(Debug, Clone)]
pub struct TopicMessage {
    /// Topic the record was read from (e.g. "openbmp.parsed.router")
    pub topic: String,

    /// Partition the record belongs to
    pub partition: i32,

    /// Offset of the record within its partition
    pub offset: i64,

    /// Record key, when the producer set one
    ///
    /// NOTE: carried for the storage handler; the core never reads it.
    #[allow(dead_code)]
    pub key: Option<Vec<u8>>,

    /// Raw record payload; empty for tombstones
    pub payload: Vec<u8>,

    /// Broker or producer timestamp in milliseconds, when available
    #[allow(dead_code)]
    pub timestamp: Option<i64>,
}
