use std::sync::Arc;

use anyhow::Context;
use log::info;
use tokio::sync::watch;

use crate::connection::{StreamSource, TopicStream};
use crate::consumer::worker::{ConsumerWorker, WorkerHandle};
use crate::handler::MessageHandler;
use crate::registry::RouterConnectionRegistry;
use crate::topics::TopicCatalog;

/// Opens one stream per (topic, replica) slot and spawns the worker pool.
///
/// Worker ids are sequential from 0 in catalog order and never reused for
/// the lifetime of the run. The returned handles keep that order, which is
/// what the stats reporter and the shutdown coordinator iterate over.
///
/// All-or-nothing: every stream is opened before the first worker task is
/// spawned. If any topic cannot be attached the whole startup fails and no
/// worker ever runs.
///
pub fn start<S: StreamSource>(
    source: &mut S,
    catalog: &TopicCatalog,
    registry: RouterConnectionRegistry,
    handler: Arc<dyn MessageHandler>,
    stop: watch::Receiver<bool>,
) -> anyhow::Result<Vec<WorkerHandle>> {
    info!(
        "Creating/attaching {} topics and getting offsets. This can take a while, please wait...",
        catalog.topic_count()
    );

    let streams: Vec<TopicStream> = catalog
        .slots()
        .map(|topic| {
            source
                .open_stream(topic)
                .with_context(|| format!("attaching topic {}", topic))
        })
        .collect::<anyhow::Result<_>>()?;

    info!("Starting {} consumer workers", catalog.pool_size());

    let handles = streams
        .into_iter()
        .enumerate()
        .map(|(id, stream)| {
            let worker = ConsumerWorker::new(
                id,
                stream,
                handler.clone(),
                registry.clone(),
                stop.clone(),
            );
            let stats = worker.stats();
            WorkerHandle {
                stats,
                join: tokio::spawn(worker.run()),
            }
        })
        .collect();

    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockStreamSource, message, registry_and_handler};
    use crate::topics::TopicCatalog;

    fn stop_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn one_worker_per_slot_with_contiguous_ids() {
        let catalog = TopicCatalog::from_entries([("alpha", 1), ("beta", 2)]);
        let mut source = MockStreamSource::default();
        let (registry, handler) = registry_and_handler();
        let (stop_tx, stop_rx) = stop_channel();

        let workers = start(&mut source, &catalog, registry, handler, stop_rx).unwrap();

        assert_eq!(workers.len(), 3);
        let ids: Vec<usize> = workers.iter().map(|w| w.stats.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        let topics: Vec<&str> = workers.iter().map(|w| w.stats.topic.as_str()).collect();
        assert_eq!(topics, vec!["alpha", "beta", "beta"]);
        assert_eq!(source.senders["beta"].len(), 2);

        stop_tx.send(true).unwrap();
        for worker in workers {
            worker.join.await.unwrap();
        }
    }

    #[tokio::test]
    async fn full_catalog_spawns_nine_workers() {
        let catalog = crate::topics::OPENBMP_CATALOG.clone();
        let mut source = MockStreamSource::default();
        let (registry, handler) = registry_and_handler();
        let (stop_tx, stop_rx) = stop_channel();

        let workers = start(&mut source, &catalog, registry, handler, stop_rx).unwrap();

        assert_eq!(workers.len(), catalog.pool_size());
        assert_eq!(workers.len(), 9);

        stop_tx.send(true).unwrap();
        for worker in workers {
            worker.join.await.unwrap();
        }
    }

    #[tokio::test]
    async fn stream_failure_fails_the_whole_startup() {
        let catalog = TopicCatalog::from_entries([("alpha", 1), ("beta", 1), ("gamma", 1)]);
        let mut source = MockStreamSource::failing_on("beta");
        let (registry, handler) = registry_and_handler();
        let (_stop_tx, stop_rx) = stop_channel();

        let err = start(&mut source, &catalog, registry, handler, stop_rx).unwrap_err();

        assert!(err.to_string().contains("beta"));
        // Nothing was spawned: gamma was never even attached.
        assert_eq!(source.opened, vec!["alpha"]);
    }

    #[tokio::test]
    async fn workers_consume_their_own_streams() {
        let catalog = TopicCatalog::from_entries([("alpha", 1), ("beta", 1)]);
        let mut source = MockStreamSource::default();
        let (registry, handler) = registry_and_handler();
        let (_stop_tx, stop_rx) = stop_channel();

        let workers = start(&mut source, &catalog, registry, handler.clone(), stop_rx).unwrap();

        for sender in source.senders.values().flatten() {
            for offset in 0..3 {
                sender.push(message("t", offset)).await.unwrap();
            }
        }
        // Dropping the senders closes the streams; each worker drains and exits.
        source.senders.clear();

        for worker in workers {
            worker.join.await.unwrap();
        }
        assert_eq!(handler.handled(), 6);
    }
}
