// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:     Configuration snapshot loaded from JSON
// - schema:     Raw record type handed to the handler
// - topics:     Fixed openbmp.parsed.* topic catalog
// - registry:   Shared collector/router connection counts
// - connection: Kafka connection supervisor and topic streams
// - handler:    Message-processing seam (decode + storage live behind it)
// - consumer:   Worker pool and per-slot consume loop
// - stats:      Periodic per-worker STAT lines
// - shutdown:   Idempotent, bounded termination sequence
//
mod config;
mod connection;
mod consumer;
mod handler;
mod registry;
mod schema;
mod shutdown;
mod stats;
mod topics;

#[cfg(test)]
mod testing;

// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use std::time::Duration;

use anyhow::Context;
use log::{error, info};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

use config::Config;
use connection::{ConnectionSupervisor, KafkaConnector};
use handler::LoggingHandler;
use registry::RouterConnectionRegistry;
use shutdown::{SHUTDOWN_GRACE, ShutdownCoordinator};
use topics::OPENBMP_CATALOG;

/// How long the startup probe waits for the database endpoint.
const DB_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Exit code when the database endpoint is unreachable at startup.
const EXIT_DB_UNREACHABLE: i32 = 2;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// This is the main runtime for the OpenBMP MySQL consumer.
//
// Responsibilities:
// - Initialize logging
// - Load the configuration snapshot
// - Probe the database endpoint before consuming anything
// - Establish the Kafka connection (retrying transient failures)
// - Start one consumer worker per topic slot
// - Report per-worker stats until interrupted
// - Run the bounded shutdown sequence on Ctrl-C
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --------------------------------------------------------
    // Load configuration
    //
    // Optional first argument: path to a JSON config file. Without it
    // every field keeps its default, which targets a local setup.
    // --------------------------------------------------------
    let config_path = std::env::args().nth(1);
    let cfg = match Config::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("{}", err);
            return Err(err.into());
        }
    };

    // --------------------------------------------------------
    // Validate DB connectivity
    //
    // The consumer core never writes to the database, but starting a
    // pool that the storage handler cannot drain is useless. A failed
    // probe exits with the dedicated status code before any topic is
    // attached.
    // --------------------------------------------------------
    if let Err(err) = probe_database(&cfg).await {
        error!("Database {} is not reachable: {:#}", cfg.db_host, err);
        std::process::exit(EXIT_DB_UNREACHABLE);
    }

    // --------------------------------------------------------
    // Connect to Kafka
    //
    // Transient coordination timeouts retry forever at a fixed delay;
    // fatal errors abort startup. Ctrl-C during the retry loop exits
    // normally without a pool ever starting.
    // --------------------------------------------------------
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut supervisor = ConnectionSupervisor::new(KafkaConnector::new(&cfg));

    let mut conn = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted during startup, exiting");
            return Ok(());
        }
        connected = supervisor.connect(stop_rx.clone()) => {
            connected.context("kafka connection failed")?
        }
    };

    // --------------------------------------------------------
    // Start the worker pool
    // --------------------------------------------------------
    let registry = RouterConnectionRegistry::new();
    let handler = LoggingHandler::new(&cfg);

    let workers = match consumer::start(
        &mut conn,
        &OPENBMP_CATALOG,
        registry.clone(),
        handler,
        stop_rx.clone(),
    ) {
        Ok(workers) => workers,
        Err(err) => {
            conn.shutdown();
            return Err(err);
        }
    };

    // --------------------------------------------------------
    // Start the stats reporter
    // --------------------------------------------------------
    let worker_stats: Vec<_> = workers.iter().map(|w| w.stats.clone()).collect();
    let reporter = tokio::spawn(stats::run(worker_stats, cfg.stats_interval, stop_rx));

    let coordinator = ShutdownCoordinator::new(conn, workers, stop_tx, SHUTDOWN_GRACE);

    // --------------------------------------------------------
    // Run until interrupted, then shut down in bounded time
    // --------------------------------------------------------
    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt signal")?;
    info!("Interrupt received, shutting down");

    coordinator.run().await;
    let _ = reporter.await;

    Ok(())
}

// ------------------------------------------------------------
// Database reachability probe
// ------------------------------------------------------------
//
// A plain TCP connect with a short timeout. Credentials and schema are
// the storage handler's concern; reachability is all that is checked
// here.
//
async fn probe_database(cfg: &Config) -> anyhow::Result<()> {
    timeout(DB_PROBE_TIMEOUT, TcpStream::connect(&cfg.db_host))
        .await
        .with_context(|| format!("timed out connecting to {}", cfg.db_host))?
        .with_context(|| format!("connecting to {}", cfg.db_host))?;
    Ok(())
}
