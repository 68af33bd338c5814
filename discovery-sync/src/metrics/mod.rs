//! Sync metrics collection.
//!
//! `SyncMetrics` is created once at startup and shared as
//! `Arc<SyncMetrics>`. All recording is lock-free; readers take a
//! point-in-time `MetricsSnapshot`.

mod reporter;

pub use reporter::run_reporter;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use discovery_sync_shared::OperationKind;
use serde::Serialize;
use tracing::info;

use crate::errors::{ErrorClass, SyncError};

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram of non-negative integer observations.
#[derive(Debug)]
pub struct Histogram {
    bounds: &'static [u64],
    /// One bucket per bound plus the overflow bucket.
    buckets: Vec<Counter>,
    count: Counter,
    sum: Counter,
}

impl Histogram {
    pub fn new(bounds: &'static [u64]) -> Self {
        Self {
            bounds,
            buckets: (0..=bounds.len()).map(|_| Counter::new()).collect(),
            count: Counter::new(),
            sum: Counter::new(),
        }
    }

    pub fn observe(&self, value: u64) {
        let slot = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        self.buckets[slot].inc();
        self.count.inc();
        self.sum.add(value);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut buckets: Vec<BucketSnapshot> = self
            .bounds
            .iter()
            .zip(&self.buckets)
            .map(|(bound, counter)| BucketSnapshot {
                le: Some(*bound),
                count: counter.get(),
            })
            .collect();
        buckets.push(BucketSnapshot {
            le: None,
            count: self.buckets[self.bounds.len()].get(),
        });

        HistogramSnapshot {
            count: self.count.get(),
            sum: self.sum.get(),
            buckets,
        }
    }
}

/// Duration buckets, milliseconds.
const DURATION_BOUNDS_MS: &[u64] = &[5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000];

/// Payload size buckets, bytes.
const PAYLOAD_BOUNDS_BYTES: &[u64] = &[256, 1_024, 4_096, 16_384, 65_536, 262_144, 1_048_576];

const ERROR_CLASSES: [ErrorClass; 7] = [
    ErrorClass::Decode,
    ErrorClass::Validation,
    ErrorClass::StoreUnavailable,
    ErrorClass::Conflict,
    ErrorClass::RetryExhausted,
    ErrorClass::Provisioning,
    ErrorClass::Cancelled,
];

fn kind_slot(kind: OperationKind) -> usize {
    match kind {
        OperationKind::Create => 0,
        OperationKind::Update => 1,
        OperationKind::Delete => 2,
    }
}

fn class_slot(class: ErrorClass) -> usize {
    ERROR_CLASSES
        .iter()
        .position(|c| *c == class)
        .unwrap_or(ERROR_CLASSES.len() - 1)
}

/// Counters and histograms for one sync engine instance.
#[derive(Debug)]
pub struct SyncMetrics {
    entity: String,
    /// `[kind][0]` successes, `[kind][1]` failures.
    operations: [[Counter; 2]; 3],
    durations: [Histogram; 3],
    payload_sizes: Histogram,
    errors: [Counter; 7],
    bulk_batches_succeeded: Counter,
    bulk_batches_failed: Counter,
    bulk_operations: Counter,
    bulk_batch_sizes: Histogram,
    retry_attempts: Counter,
    retries_exhausted: Counter,
    messages_consumed: Counter,
    offsets_committed: Counter,
    tombstones_skipped: Counter,
}

impl SyncMetrics {
    pub fn new(entity: impl Into<String>) -> Self {
        info!("Metrics collector initialized");
        Self {
            entity: entity.into(),
            operations: Default::default(),
            durations: [
                Histogram::new(DURATION_BOUNDS_MS),
                Histogram::new(DURATION_BOUNDS_MS),
                Histogram::new(DURATION_BOUNDS_MS),
            ],
            payload_sizes: Histogram::new(PAYLOAD_BOUNDS_BYTES),
            errors: Default::default(),
            bulk_batches_succeeded: Counter::new(),
            bulk_batches_failed: Counter::new(),
            bulk_operations: Counter::new(),
            bulk_batch_sizes: Histogram::new(&[1, 10, 50, 100, 500, 1_000]),
            retry_attempts: Counter::new(),
            retries_exhausted: Counter::new(),
            messages_consumed: Counter::new(),
            offsets_committed: Counter::new(),
            tombstones_skipped: Counter::new(),
        }
    }

    /// Record one attempt at applying an operation.
    pub fn record_operation(
        &self,
        kind: OperationKind,
        duration: Duration,
        payload_bytes: usize,
        error: Option<&SyncError>,
    ) {
        let slot = kind_slot(kind);
        self.operations[slot][usize::from(error.is_some())].inc();
        self.durations[slot].observe(duration.as_millis() as u64);
        self.payload_sizes.observe(payload_bytes as u64);
        if let Some(err) = error {
            self.record_error(err);
        }
    }

    pub fn record_error(&self, error: &SyncError) {
        self.errors[class_slot(error.class())].inc();
    }

    /// Record one bulk submission and its outcome.
    pub fn record_bulk(&self, batch_size: usize, failed: bool) {
        if failed {
            self.bulk_batches_failed.inc();
        } else {
            self.bulk_batches_succeeded.inc();
            self.bulk_operations.add(batch_size as u64);
        }
        self.bulk_batch_sizes.observe(batch_size as u64);
    }

    pub fn record_retry_attempt(&self) {
        self.retry_attempts.inc();
    }

    pub fn record_retry_exhausted(&self) {
        self.retries_exhausted.inc();
    }

    pub fn record_message_consumed(&self) {
        self.messages_consumed.inc();
    }

    pub fn record_offset_committed(&self) {
        self.offsets_committed.inc();
    }

    pub fn record_tombstone(&self) {
        self.tombstones_skipped.inc();
    }

    pub fn operations_total(&self) -> u64 {
        self.operations
            .iter()
            .flat_map(|by_outcome| by_outcome.iter())
            .map(Counter::get)
            .sum()
    }

    pub fn messages_consumed(&self) -> u64 {
        self.messages_consumed.get()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut operations = Vec::with_capacity(6);
        let mut durations_ms = BTreeMap::new();
        for kind in OperationKind::ALL {
            let slot = kind_slot(kind);
            for (status, counter) in ["success", "failure"].iter().zip(&self.operations[slot]) {
                operations.push(OperationCount {
                    operation: kind.as_str(),
                    entity: self.entity.clone(),
                    status: *status,
                    count: counter.get(),
                });
            }
            durations_ms.insert(kind.as_str(), self.durations[slot].snapshot());
        }

        let errors = ERROR_CLASSES
            .iter()
            .zip(&self.errors)
            .map(|(class, counter)| (class.as_str(), counter.get()))
            .collect();

        MetricsSnapshot {
            operations,
            durations_ms,
            payload_bytes: self.payload_sizes.snapshot(),
            errors,
            bulk: BulkSnapshot {
                batches_succeeded: self.bulk_batches_succeeded.get(),
                batches_failed: self.bulk_batches_failed.get(),
                operations: self.bulk_operations.get(),
                batch_sizes: self.bulk_batch_sizes.snapshot(),
            },
            retries: RetrySnapshot {
                attempts: self.retry_attempts.get(),
                exhausted: self.retries_exhausted.get(),
            },
            messages: MessageSnapshot {
                consumed: self.messages_consumed.get(),
                committed: self.offsets_committed.get(),
                tombstones: self.tombstones_skipped.get(),
            },
        }
    }

    /// Log final totals. Called once at shutdown.
    pub fn cleanup(&self) {
        let snapshot = self.snapshot();
        info!(
            operations = self.operations_total(),
            messages_consumed = snapshot.messages.consumed,
            offsets_committed = snapshot.messages.committed,
            retries_exhausted = snapshot.retries.exhausted,
            bulk_batches = snapshot.bulk.batches_succeeded + snapshot.bulk.batches_failed,
            "Metrics collector shut down"
        );
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationCount {
    pub operation: &'static str,
    pub entity: String,
    pub status: &'static str,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketSnapshot {
    /// Upper bound, `None` for the overflow bucket.
    pub le: Option<u64>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: u64,
    pub buckets: Vec<BucketSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkSnapshot {
    pub batches_succeeded: u64,
    pub batches_failed: u64,
    pub operations: u64,
    pub batch_sizes: HistogramSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrySnapshot {
    pub attempts: u64,
    pub exhausted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageSnapshot {
    pub consumed: u64,
    pub committed: u64,
    pub tombstones: u64,
}

/// Point-in-time view of every metric.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub operations: Vec<OperationCount>,
    pub durations_ms: BTreeMap<&'static str, HistogramSnapshot>,
    pub payload_bytes: HistogramSnapshot,
    pub errors: BTreeMap<&'static str, u64>,
    pub bulk: BulkSnapshot,
    pub retries: RetrySnapshot,
    pub messages: MessageSnapshot,
}

impl MetricsSnapshot {
    /// Count for one operation kind and status (`success` or `failure`).
    pub fn operation_count(&self, kind: OperationKind, status: &str) -> u64 {
        self.operations
            .iter()
            .find(|c| c.operation == kind.as_str() && c.status == status)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}
