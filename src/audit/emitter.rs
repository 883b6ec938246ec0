//! Background delivery of audit records.
//!
//! Records go through a bounded broadcast channel. The channel overwrites its
//! oldest entry when full, and the flush task learns how many were lost from
//! `RecvError::Lagged`, so emitting never blocks and never fails the caller.
//!
//! tokio rounds the channel up to a power of two, so the flush task also
//! discards the oldest pending records whenever more than `capacity` are
//! waiting. The configured capacity is the exact bound.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::sink::AuditSink;
use super::AuditRecord;

/// Largest accepted queue capacity.
pub const MAX_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Records buffered before the oldest are dropped, between 1 and
    /// [`MAX_CAPACITY`].
    pub capacity: usize,
    /// Delivery attempts per record, including the first.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Default)]
struct AuditStats {
    emitted: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl AuditStats {
    fn snapshot(&self) -> AuditSnapshot {
        AuditSnapshot {
            emitted: self.emitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Emitted records that were neither delivered nor counted as lost.
    fn unaccounted(&self) -> u64 {
        let snapshot = self.snapshot();
        snapshot
            .emitted
            .saturating_sub(snapshot.delivered + snapshot.dropped + snapshot.failed)
    }
}

/// Point-in-time counters of the emitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditSnapshot {
    pub emitted: u64,
    pub delivered: u64,
    /// Overwritten under backpressure, or emitted after shutdown.
    pub dropped: u64,
    /// Given up on after exhausting retries.
    pub failed: u64,
}

impl AuditSnapshot {
    pub fn lost(&self) -> u64 {
        self.dropped + self.failed
    }
}

/// Cheap, cloneable producer side of the emitter.
#[derive(Debug, Clone)]
pub struct AuditHandle {
    tx: broadcast::Sender<Arc<AuditRecord>>,
    stats: Arc<AuditStats>,
}

impl AuditHandle {
    /// Fire and forget. Never blocks, never errors.
    pub fn emit(&self, record: AuditRecord) {
        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(Arc::new(record)).is_err() {
            // No flush task listening anymore
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> AuditSnapshot {
        self.stats.snapshot()
    }
}

pub struct AuditEmitter {
    handle: AuditHandle,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl AuditEmitter {
    /// Starts the flush task on the current tokio runtime.
    /// Out-of-range capacities are clamped to `1..=MAX_CAPACITY`.
    pub fn spawn(sink: Arc<dyn AuditSink>, mut config: AuditConfig) -> Self {
        config.capacity = config.capacity.clamp(1, MAX_CAPACITY);
        let (tx, rx) = broadcast::channel(config.capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(AuditStats::default());

        let shutdown_timeout = config.shutdown_timeout;
        let task = tokio::spawn(flush_loop(
            rx,
            shutdown_rx,
            sink,
            Arc::clone(&stats),
            config,
        ));

        Self {
            handle: AuditHandle { tx, stats },
            shutdown_tx,
            task,
            shutdown_timeout,
        }
    }

    pub fn handle(&self) -> AuditHandle {
        self.handle.clone()
    }

    /// Signals the flush task, lets it drain what is buffered within the
    /// configured timeout, then stops it. Records abandoned at the deadline
    /// are counted as dropped.
    pub async fn shutdown(self) -> AuditSnapshot {
        let Self {
            handle,
            shutdown_tx,
            mut task,
            shutdown_timeout,
        } = self;

        let _ = shutdown_tx.send(true);

        let finished = tokio::time::timeout(shutdown_timeout, &mut task).await;
        match finished {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("audit flush task failed: {}", err),
            Err(_) => {
                task.abort();
                let _ = task.await;

                let abandoned = handle.stats.unaccounted();
                handle.stats.dropped.fetch_add(abandoned, Ordering::Relaxed);
                tracing::warn!(
                    timeout_ms = shutdown_timeout.as_millis() as u64,
                    dropped = abandoned,
                    "audit drain timed out, buffered records abandoned"
                );
            }
        }

        let snapshot = handle.stats();
        tracing::info!(
            emitted = snapshot.emitted,
            delivered = snapshot.delivered,
            dropped = snapshot.dropped,
            failed = snapshot.failed,
            "audit emitter stopped"
        );
        snapshot
    }
}

async fn flush_loop(
    mut rx: broadcast::Receiver<Arc<AuditRecord>>,
    mut shutdown_rx: watch::Receiver<bool>,
    sink: Arc<dyn AuditSink>,
    stats: Arc<AuditStats>,
    config: AuditConfig,
) {
    tracing::debug!(capacity = config.capacity, "audit flush task started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    drain(&mut rx, sink.as_ref(), &stats, &config).await;
                    break;
                }
            }

            received = rx.recv() => {
                match received {
                    Ok(_) if over_capacity(&rx, config.capacity) => {
                        stats.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(record) => deliver(sink.as_ref(), &record, &stats, &config).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        stats.dropped.fetch_add(n, Ordering::Relaxed);
                        tracing::warn!(
                            dropped = n,
                            "audit queue overflowed, oldest records dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn drain(
    rx: &mut broadcast::Receiver<Arc<AuditRecord>>,
    sink: &dyn AuditSink,
    stats: &AuditStats,
    config: &AuditConfig,
) {
    loop {
        match rx.try_recv() {
            Ok(_) if over_capacity(rx, config.capacity) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(record) => deliver(sink, &record, stats, config).await,
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                stats.dropped.fetch_add(n, Ordering::Relaxed);
            }
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }
}

/// True when the record just received is older than the newest `capacity`.
fn over_capacity(rx: &broadcast::Receiver<Arc<AuditRecord>>, capacity: usize) -> bool {
    rx.len() >= capacity
}

async fn deliver(
    sink: &dyn AuditSink,
    record: &AuditRecord,
    stats: &AuditStats,
    config: &AuditConfig,
) {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match sink.append(record).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(err) if attempt < max_attempts => {
                tracing::debug!(
                    record_id = %record.id,
                    attempt,
                    "audit delivery failed, retrying: {}",
                    err
                );
                tokio::time::sleep(config.retry_backoff * attempt).await;
                attempt += 1;
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    record_id = %record.id,
                    attempts = attempt,
                    "audit record lost: {}",
                    err
                );
                return;
            }
        }
    }
}
