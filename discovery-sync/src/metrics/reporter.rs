//! Periodic progress logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::SyncMetrics;

/// Log throughput every `period` until `cancel` fires.
pub async fn run_reporter(metrics: Arc<SyncMetrics>, period: Duration, cancel: CancellationToken) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    timer.tick().await;

    let mut prev_messages = metrics.messages_consumed();
    let mut prev_operations = metrics.operations_total();
    let mut prev_time = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {
                let messages = metrics.messages_consumed();
                let operations = metrics.operations_total();

                let now = Instant::now();
                let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                let rate = |current: u64, previous: u64| {
                    if elapsed_secs > 0.0 {
                        current.saturating_sub(previous) as f64 / elapsed_secs
                    } else {
                        0.0
                    }
                };

                let snapshot = metrics.snapshot();
                info!(
                    messages_consumed = messages,
                    operations = operations,
                    offsets_committed = snapshot.messages.committed,
                    retries_exhausted = snapshot.retries.exhausted,
                    messages_per_sec = format!("{:.2}", rate(messages, prev_messages)),
                    operations_per_sec = format!("{:.2}", rate(operations, prev_operations)),
                    "Sync progress"
                );

                prev_messages = messages;
                prev_operations = operations;
                prev_time = now;
            }
        }
    }
}
