use crate::record::{LogBatch, LogRecord};
use crate::sink::BatchSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

/// Records per batch before a flush is forced.
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Delay that coalesces bursts of records into one request.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(100);
/// Recurring flush in case a delay timer stalls.
pub const DEFAULT_SAFETY_INTERVAL: Duration = Duration::from_secs(10);

/// Buffering and delivery settings of the transport.
///
/// **Fields**
/// - `channel_buffer`: records that may wait for the worker before new ones
///   are dropped.
/// - `batch_size`: queue length that triggers an immediate flush.
/// - `flush_delay`: how long the first record of a burst waits for company.
/// - `safety_interval`: period of the unconditional flush.
/// - `silent_on_error`: when `false`, a failed delivery is reported with
///   `warn!`.
/// - `flush_on_teardown`: flush whatever is queued once every handle is gone.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_delay: Duration,
    pub safety_interval: Duration,
    pub silent_on_error: bool,
    pub flush_on_teardown: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_delay: DEFAULT_FLUSH_DELAY,
            safety_interval: DEFAULT_SAFETY_INTERVAL,
            silent_on_error: true,
            flush_on_teardown: true,
        }
    }
}

/// Counters maintained by the transport.
#[derive(Debug, Default)]
pub struct TransportStats {
    /// Records handed to [`TransportHandle::enqueue`].
    pub total_records: AtomicU64,
    /// Records accepted by the worker.
    pub enqueued_records: AtomicU64,
    /// Records dropped because the channel was full or closed.
    pub dropped_records: AtomicU64,
    /// Batches the sink accepted.
    pub delivered_batches: AtomicU64,
    /// Batches the sink rejected. Their records are gone.
    pub failed_batches: AtomicU64,
}

impl TransportStats {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Append-only queue plus the deadline of the pending delayed flush.
///
/// Holds no timers itself; the worker sleeps until [`BatchQueue::deadline`].
#[derive(Debug)]
pub struct BatchQueue {
    records: Vec<LogRecord>,
    batch_size: usize,
    flush_delay: Duration,
    deadline: Option<Instant>,
}

impl BatchQueue {
    pub fn new(batch_size: usize, flush_delay: Duration) -> Self {
        BatchQueue {
            records: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
            flush_delay,
            deadline: None,
        }
    }

    /// Append a record. Returns the batch to send when the threshold is
    /// reached; otherwise arms the delayed flush if it is not armed yet.
    pub fn push(&mut self, record: LogRecord, now: Instant) -> Option<LogBatch> {
        self.records.push(record);
        if self.records.len() >= self.batch_size {
            return self.take();
        }
        if self.deadline.is_none() {
            self.deadline = Some(now + self.flush_delay);
        }
        None
    }

    /// Snapshot and clear the queue, disarming the delayed flush.
    pub fn take(&mut self) -> Option<LogBatch> {
        self.deadline = None;
        if self.records.is_empty() {
            None
        } else {
            Some(LogBatch::from(std::mem::take(&mut self.records)))
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timer_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

enum Command {
    Record(LogRecord),
    Flush,
    Close(oneshot::Sender<()>),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Record(_) => f.write_str("Record"),
            Command::Flush => f.write_str("Flush"),
            Command::Close(_) => f.write_str("Close"),
        }
    }
}

/// Producer side of the transport. Cheap to clone; every method returns
/// immediately and never fails from the caller's point of view.
#[derive(Clone, Debug)]
pub struct TransportHandle {
    sender: mpsc::Sender<Command>,
    stats: Arc<TransportStats>,
}

impl TransportHandle {
    /// Queue a record for delivery. Dropped (and counted) when the channel
    /// is full.
    pub fn enqueue(&self, record: LogRecord) {
        self.stats.total_records.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.sender.try_send(Command::Record(record)) {
            self.stats.dropped_records.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    debug!("console bridge channel full, dropping record")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    debug!("console bridge transport closed, dropping record")
                }
            }
        }
    }

    /// Ask the worker to flush now instead of waiting for a timer.
    pub fn flush(&self) {
        let _ = self.sender.try_send(Command::Flush);
    }

    /// Flush what is queued, wait for in-flight deliveries, and stop the
    /// worker.
    pub async fn close(self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Close(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn stats(&self) -> &Arc<TransportStats> {
        &self.stats
    }

    /// Handle with no worker behind it; queued records are read back with
    /// [`Detached::records`].
    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (TransportHandle, Detached) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = TransportHandle {
            sender: tx,
            stats: Arc::new(TransportStats::default()),
        };
        (handle, Detached(rx))
    }
}

#[cfg(test)]
pub(crate) struct Detached(mpsc::Receiver<Command>);

#[cfg(test)]
impl Detached {
    pub(crate) fn records(&mut self) -> Vec<LogRecord> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.0.try_recv() {
            if let Command::Record(record) = cmd {
                out.push(record);
            }
        }
        out
    }
}

/// Background batching worker.
pub struct Transport;

impl Transport {
    /// Spawn the worker on the current Tokio runtime and return the handle
    /// producers use to reach it.
    ///
    /// Minimal thresholds are enforced for `channel_buffer`, `batch_size` and
    /// the timers to avoid degenerate configurations.
    pub fn spawn(
        sink: Arc<dyn BatchSink>,
        config: TransportConfig,
    ) -> (TransportHandle, JoinHandle<()>) {
        let config = TransportConfig {
            channel_buffer: config.channel_buffer.max(16),
            batch_size: config.batch_size.max(1),
            flush_delay: config.flush_delay.max(Duration::from_millis(1)),
            safety_interval: config.safety_interval.max(Duration::from_millis(1)),
            ..config
        };

        let (tx, rx) = mpsc::channel(config.channel_buffer);
        let stats = Arc::new(TransportStats::default());
        let handle = tokio::spawn(run(rx, sink, config, Arc::clone(&stats)));

        (TransportHandle { sender: tx, stats }, handle)
    }
}

async fn run(
    mut rx: mpsc::Receiver<Command>,
    sink: Arc<dyn BatchSink>,
    config: TransportConfig,
    stats: Arc<TransportStats>,
) {
    let mut queue = BatchQueue::new(config.batch_size, config.flush_delay);
    let mut in_flight = JoinSet::new();
    let mut safety = time::interval_at(
        Instant::now() + config.safety_interval,
        config.safety_interval,
    );
    safety.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let deadline = queue.deadline();
        let event = tokio::select! {
            cmd = rx.recv() => Event::Command(cmd),
            _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Event::Due,
            _ = safety.tick() => Event::Due,
            finished = async {
                match in_flight.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => Event::Delivered(finished),
        };

        match event {
            Event::Command(Some(Command::Record(record))) => {
                stats.enqueued_records.fetch_add(1, Ordering::Relaxed);
                if let Some(batch) = queue.push(record, Instant::now()) {
                    dispatch(&mut in_flight, &sink, batch, &config, &stats);
                }
            }
            Event::Command(Some(Command::Flush)) | Event::Due => {
                if let Some(batch) = queue.take() {
                    dispatch(&mut in_flight, &sink, batch, &config, &stats);
                }
            }
            Event::Command(Some(Command::Close(ack))) => {
                if let Some(batch) = queue.take() {
                    dispatch(&mut in_flight, &sink, batch, &config, &stats);
                }
                drain(&mut in_flight).await;
                let _ = ack.send(());
                return;
            }
            Event::Command(None) => {
                if config.flush_on_teardown {
                    if let Some(batch) = queue.take() {
                        dispatch(&mut in_flight, &sink, batch, &config, &stats);
                    }
                } else if !queue.is_empty() {
                    debug!(count = queue.len(), "transport closed, discarding queued records");
                }
                drain(&mut in_flight).await;
                return;
            }
            Event::Delivered(Err(e)) if e.is_panic() => {
                error!("log batch delivery panicked: {:?}", e);
            }
            Event::Delivered(_) => {}
        }
    }
}

enum Event {
    Command(Option<Command>),
    Due,
    Delivered(Result<(), tokio::task::JoinError>),
}

/// Send one batch without waiting for it. Overlapping sends are allowed:
/// every batch is self-contained.
fn dispatch(
    in_flight: &mut JoinSet<()>,
    sink: &Arc<dyn BatchSink>,
    batch: LogBatch,
    config: &TransportConfig,
    stats: &Arc<TransportStats>,
) {
    let sink = Arc::clone(sink);
    let stats = Arc::clone(stats);
    let silent = config.silent_on_error;
    in_flight.spawn(async move {
        let count = batch.len();
        match sink.send(&batch).await {
            Ok(()) => {
                stats.delivered_batches.fetch_add(1, Ordering::Relaxed);
                trace!(count, "delivered console batch");
            }
            Err(e) => {
                stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                if !silent {
                    warn!(error = %e, count, "failed to deliver console batch, dropping it");
                }
            }
        }
    });
}

async fn drain(in_flight: &mut JoinSet<()>) {
    while let Some(finished) = in_flight.join_next().await {
        if let Err(e) = finished {
            if e.is_panic() {
                error!("log batch delivery panicked: {:?}", e);
            }
        }
    }
}
