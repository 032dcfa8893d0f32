/// Consumer module
///
/// This module groups all logic responsible for:
/// - Partitioning the topic catalog into worker slots
/// - Spawning and tracking one worker task per slot
/// - Running the per-slot read/delegate loop
///
/// The consumer layer sits between:
/// - The Kafka connection (stream supply)
/// - The MessageHandler collaborator (record processing)
///
/// Design notes:
/// - Topic-format knowledge MUST NOT live here
/// - Workers share nothing but the registry handle and the stop signal
pub mod pool;
pub mod worker;

pub use pool::start;
pub use worker::{WorkerHandle, WorkerStats};
