use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, warn};
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;

use crate::connection::KafkaConnection;
use crate::consumer::WorkerHandle;

/// Maximum time shutdown waits for in-flight work before giving up.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(5000);

struct RunningApp {
    connection: KafkaConnection,
    workers: Vec<WorkerHandle>,
    stop: watch::Sender<bool>,
    grace: Duration,
}

/// Runs the termination sequence exactly once.
///
/// Order:
/// 1. Stop the topic subscriptions on the connection
/// 2. Signal every worker (and the stats reporter) to wind down
/// 3. Wait up to the grace period for the worker tasks to finish
/// 4. Past the grace period, warn and return anyway
///
/// The coordinator never blocks beyond the grace period, and a second
/// invocation is a no-op: the resources were taken by the first one.
///
/// TERMINAL GUARANTEE:
/// - After `run` returns no new record is processed; a record in flight
///   when the grace period expired may or may not have completed.
///
pub struct ShutdownCoordinator {
    app: Mutex<Option<RunningApp>>,
}

impl ShutdownCoordinator {
    pub fn new(
        connection: KafkaConnection,
        workers: Vec<WorkerHandle>,
        stop: watch::Sender<bool>,
        grace: Duration,
    ) -> Self {
        Self {
            app: Mutex::new(Some(RunningApp {
                connection,
                workers,
                stop,
                grace,
            })),
        }
    }

    pub async fn run(&self) {
        let Some(app) = self.app.lock().await.take() else {
            debug!("Shutdown already performed");
            return;
        };

        debug!("Shutting down MySQL consumer app");

        app.connection.shutdown();
        let _ = app.stop.send(true);

        let joins = app.workers.into_iter().map(|worker| worker.join);
        if timeout(app.grace, join_all(joins)).await.is_err() {
            warn!("Timed out waiting for consumer workers to shut down, exiting uncleanly");
        }
    }
}
