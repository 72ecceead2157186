//! Multi-worker trap handler.
//!
//! Workers dequeue raw packets, claim the dedup lock, invoke the response
//! manager, normalize the result and push it onto the egress queue. The
//! lock is never released on the happy path: its TTL expiry is the release
//! mechanism, and the residual window suppresses retry storms of the same
//! payload.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::metrics::Metrics;
use super::normalize::to_trap_message;
use crate::engine::ResponseManager;
use crate::error::{Error, Result};
use crate::lock::DistributedLocker;
use crate::packet::RawPacket;
use crate::trap::TrapMessage;

/// Deadline on the lock-acquire RPC itself, so a stalled backend cannot
/// wedge a worker (or shutdown) for longer than this.
const LOCK_RPC_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a worker waits for egress space before discarding a result.
const EGRESS_SEND_TIMEOUT: Duration = Duration::from_millis(100);

struct HandlerState {
    running: bool,
    workers: Vec<JoinHandle<()>>,
}

/// Everything the worker tasks share.
struct HandlerInner<L> {
    locker: Arc<L>,
    response_manager: Arc<ResponseManager>,
    lock_timeout: Duration,
    ingress: Mutex<mpsc::Receiver<RawPacket>>,
    egress: mpsc::Sender<TrapMessage>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

/// Trap handler with a pool of worker tasks.
pub struct TrapHandler<L> {
    inner: Arc<HandlerInner<L>>,
    state: std::sync::Mutex<HandlerState>,
}

impl<L: DistributedLocker> TrapHandler<L> {
    /// Create a stopped handler wired to its queues.
    pub fn new(
        locker: Arc<L>,
        response_manager: Arc<ResponseManager>,
        lock_timeout: Duration,
        ingress: mpsc::Receiver<RawPacket>,
        egress: mpsc::Sender<TrapMessage>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                locker,
                response_manager,
                lock_timeout,
                ingress: Mutex::new(ingress),
                egress,
                metrics,
                cancel: CancellationToken::new(),
            }),
            state: std::sync::Mutex::new(HandlerState { running: false, workers: Vec::new() }),
        }
    }

    /// Spawn `worker_count` long-lived worker tasks.
    pub fn start(&self, worker_count: usize) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.running {
            return Err(Error::AlreadyStarted { component: "trap handler" });
        }

        for id in 0..worker_count {
            let inner = Arc::clone(&self.inner);
            state.workers.push(tokio::spawn(worker(inner, id)));
        }
        state.running = true;

        tracing::info!(target: "trapsink::handler", worker_count, "trap handler started");
        Ok(())
    }

    /// Signal cancellation and await all workers. Succeeds exactly once.
    pub async fn stop(&self) -> Result<()> {
        let workers = {
            let mut state = self.state.lock().unwrap();
            if !state.running {
                return Err(Error::AlreadyStopped { component: "trap handler" });
            }
            state.running = false;
            std::mem::take(&mut state.workers)
        };

        self.inner.cancel.cancel();
        for worker in workers {
            let _ = worker.await;
        }

        tracing::info!(target: "trapsink::handler", "trap handler stopped");
        Ok(())
    }

    /// Whether the handler is currently running.
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }
}

/// One worker: race cancellation against the ingress queue.
async fn worker<L: DistributedLocker>(inner: Arc<HandlerInner<L>>, id: usize) {
    tracing::debug!(target: "trapsink::handler", worker_id = id, "trap worker started");

    loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => {
                tracing::debug!(target: "trapsink::handler", worker_id = id, "trap worker stopping");
                return;
            }
            packet = next_packet(&inner.ingress) => {
                match packet {
                    Some(raw) => process_trap(&inner, raw).await,
                    None => {
                        tracing::debug!(target: "trapsink::handler", worker_id = id, "ingress queue closed, worker exiting");
                        return;
                    }
                }
            }
        }
    }
}

/// Dequeue the next packet; the queue is shared by all workers.
async fn next_packet(ingress: &Mutex<mpsc::Receiver<RawPacket>>) -> Option<RawPacket> {
    ingress.lock().await.recv().await
}

/// Process a single trap under the dedup lock.
async fn process_trap<L: DistributedLocker>(inner: &HandlerInner<L>, raw: RawPacket) {
    let started = Instant::now();
    let received_at = Utc::now();

    let lock_key = inner.locker.fingerprint_key(&raw.data);

    let acquired = match tokio::time::timeout(
        LOCK_RPC_TIMEOUT,
        inner.locker.acquire(&lock_key, inner.lock_timeout),
    )
    .await
    {
        Err(_) => {
            inner.metrics.lock_error();
            tracing::error!(target: "trapsink::handler", source = %raw.source, "lock acquire timed out");
            return;
        }
        Ok(Err(e)) => {
            inner.metrics.lock_error();
            tracing::error!(target: "trapsink::handler", source = %raw.source, error = %e, "failed to acquire lock for trap");
            return;
        }
        Ok(Ok(acquired)) => acquired,
    };

    if !acquired {
        inner.metrics.lock_busy();
        tracing::debug!(target: "trapsink::handler", source = %raw.source, "duplicate trap detected, skipping");
        return;
    }
    inner.metrics.lock_acquired();

    // Errors leave the lock held; its TTL acts as a negative cache against
    // the same duplicate payload retrying immediately.
    let decoded = match inner.response_manager.respond(&raw).await {
        Ok(decoded) => decoded,
        Err(e) => {
            inner.metrics.decode_failure();
            tracing::error!(target: "trapsink::handler", source = %raw.source, error = %e, "failed to decode SNMP packet");
            return;
        }
    };

    let message = to_trap_message(&decoded, &raw, received_at);

    tracing::debug!(
        target: "trapsink::handler",
        elapsed_ms = started.elapsed().as_millis() as u64,
        source = %message.source_ip,
        version = %message.version,
        "trap processed"
    );

    // Egress pressure must not stall workers.
    match inner.egress.send_timeout(message, EGRESS_SEND_TIMEOUT).await {
        Ok(()) => {}
        Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
            inner.metrics.egress_dropped();
            tracing::warn!(target: "trapsink::handler", source = %raw.source, "egress queue blocked, discarding trap result");
        }
        Err(mpsc::error::SendTimeoutError::Closed(_)) => {
            tracing::debug!(target: "trapsink::handler", "egress queue closed, discarding trap result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommunityEngineConfig, EngineSetConfig};
    use crate::lock::MemoryLocker;

    fn response_manager() -> Arc<ResponseManager> {
        let config = EngineSetConfig {
            v1: None,
            v2c: Some(CommunityEngineConfig {
                enabled: true,
                read_community: "public".into(),
                read_write_community: "private".into(),
            }),
            v3: None,
        };
        Arc::new(ResponseManager::new(&config).unwrap())
    }

    fn handler(
        ingress: mpsc::Receiver<RawPacket>,
        egress: mpsc::Sender<TrapMessage>,
    ) -> TrapHandler<MemoryLocker> {
        TrapHandler::new(
            Arc::new(MemoryLocker::new()),
            response_manager(),
            Duration::from_secs(5),
            ingress,
            egress,
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn test_start_stop_exactly_once() {
        let (_in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        let handler = handler(in_rx, out_tx);

        handler.start(2).unwrap();
        assert!(handler.is_running());
        assert!(matches!(
            handler.start(1).unwrap_err(),
            Error::AlreadyStarted { .. }
        ));

        handler.stop().await.unwrap();
        assert!(!handler.is_running());
        assert!(matches!(
            handler.stop().await.unwrap_err(),
            Error::AlreadyStopped { .. }
        ));
    }

    #[tokio::test]
    async fn test_workers_exit_when_ingress_closes() {
        let (in_tx, in_rx) = mpsc::channel::<RawPacket>(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        let handler = handler(in_rx, out_tx);

        handler.start(1).unwrap();
        drop(in_tx);

        // Workers notice the closed queue on their own; stop still succeeds.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handler.stop().await.unwrap();
    }
}
