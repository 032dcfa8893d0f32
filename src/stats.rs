use std::time::Duration;

use log::info;
use tokio::sync::watch;
use tokio::time::{Instant, interval_at};

use crate::consumer::WorkerStats;

/// Idle slice used when periodic stats are disabled, so the task still
/// notices the stop signal promptly without spinning.
const IDLE_POLL: Duration = Duration::from_secs(15);

/// Periodic stats loop, one task for the whole pool.
///
/// Every tick prints one STAT line per worker from the shared counters;
/// the workers themselves are never touched. An interval of 0 disables
/// reporting entirely. Either way the loop exits as soon as the stop
/// signal fires.
pub async fn run(workers: Vec<WorkerStats>, interval_secs: u64, mut stop: watch::Receiver<bool>) {
    if interval_secs == 0 {
        info!("Stats reporting disabled");
        loop {
            tokio::select! {
                _ = stop.changed() => return,
                _ = tokio::time::sleep(IDLE_POLL) => {}
            }
        }
    }

    let period = Duration::from_secs(interval_secs);
    // First line one full interval after startup, not immediately.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop.changed() => return,
            _ = ticker.tick() => {
                for line in render(&workers) {
                    info!("{}", line);
                }
            }
        }
    }
}

/// One STAT line per worker, in worker-id order, historical format.
fn render(workers: &[WorkerStats]) -> Vec<String> {
    workers
        .iter()
        .map(|worker| {
            format!(
                "STAT: thread {} read: {:10} queue: {:10} topics: {}",
                worker.id,
                worker.message_count(),
                worker.queue_depth(),
                worker.topic
            )
        })
        .collect()
}
