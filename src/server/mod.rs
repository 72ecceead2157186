//! Server coordinator.
//!
//! Owns both bounded queues and the lifecycle of the receiver and the
//! handler. Start order: handler first (workers ready to consume), then
//! receiver (producers now have consumers). Stop order: receiver first to
//! halt the producer side, drain the ingress queue within a bounded grace,
//! then the handler.

mod handler;
mod metrics;
mod normalize;
mod receiver;

pub use handler::TrapHandler;
pub use metrics::{Metrics, MetricsSnapshot};
pub use receiver::UdpReceiver;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::engine::ResponseManager;
use crate::error::{Error, Result};
use crate::lock::DistributedLocker;
use crate::packet::RawPacket;
use crate::trap::TrapMessage;

/// Upper bound on waiting for the ingress queue to drain during stop.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Poll interval while draining.
const DRAIN_POLL: Duration = Duration::from_millis(100);

struct ServerState<L> {
    running: bool,
    receiver: Option<UdpReceiver>,
    handler: Option<Arc<TrapHandler<L>>>,
    ingress: Option<mpsc::Sender<RawPacket>>,
}

/// Coordinates the UDP receiver, the worker pool and the queues between
/// them.
pub struct TrapServer<L> {
    config: ServerConfig,
    locker: Arc<L>,
    response_manager: Arc<ResponseManager>,
    metrics: Arc<Metrics>,
    state: std::sync::Mutex<ServerState<L>>,
}

impl<L> std::fmt::Debug for TrapServer<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrapServer").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<L: DistributedLocker> TrapServer<L> {
    /// Create a stopped server.
    ///
    /// Fails on configuration values the pipeline cannot run with.
    pub fn new(
        config: ServerConfig,
        locker: Arc<L>,
        response_manager: Arc<ResponseManager>,
    ) -> Result<Self> {
        if config.handler.worker_count == 0 {
            return Err(Error::config("worker_count must be at least 1"));
        }
        if config.ingress_size == 0 {
            return Err(Error::config("ingress_size must be at least 1"));
        }

        Ok(Self {
            config,
            locker,
            response_manager,
            metrics: Arc::new(Metrics::new()),
            state: std::sync::Mutex::new(ServerState {
                running: false,
                receiver: None,
                handler: None,
                ingress: None,
            }),
        })
    }

    /// Operational counters shared by the receiver and the handler.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// The receiver's bound address while running (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state
            .lock()
            .unwrap()
            .receiver
            .as_ref()
            .and_then(|receiver| receiver.local_addr())
    }

    /// Start the pipeline and hand back the egress queue.
    ///
    /// The returned receiver is the downstream stage's end of the egress
    /// queue; dropping it causes workers to discard results.
    pub async fn start(&self) -> Result<mpsc::Receiver<TrapMessage>> {
        {
            let state = self.state.lock().unwrap();
            if state.running {
                return Err(Error::AlreadyStarted { component: "trap server" });
            }
        }

        let egress_size = self.config.egress_size();
        let (ingress_tx, ingress_rx) = mpsc::channel::<RawPacket>(self.config.ingress_size);
        let (egress_tx, egress_rx) = mpsc::channel::<TrapMessage>(egress_size);

        let handler = Arc::new(TrapHandler::new(
            Arc::clone(&self.locker),
            Arc::clone(&self.response_manager),
            Duration::from_secs(self.config.handler.lock_timeout_seconds),
            ingress_rx,
            egress_tx,
            Arc::clone(&self.metrics),
        ));

        // Handler first: workers must be ready before producers exist.
        handler.start(self.config.handler.worker_count)?;

        let receiver = UdpReceiver::new(ingress_tx.clone(), Arc::clone(&self.metrics));
        if let Err(e) = receiver.start(self.config.receiver.port) {
            if let Err(stop_err) = handler.stop().await {
                tracing::error!(target: "trapsink::server", error = %stop_err, "error stopping handler after failed receiver start");
            }
            return Err(e);
        }

        {
            let mut state = self.state.lock().unwrap();
            state.running = true;
            state.receiver = Some(receiver);
            state.handler = Some(handler);
            state.ingress = Some(ingress_tx);
        }

        tracing::info!(
            target: "trapsink::server",
            port = self.config.receiver.port,
            workers = self.config.handler.worker_count,
            ingress_size = self.config.ingress_size,
            egress_size,
            lock_timeout_seconds = self.config.handler.lock_timeout_seconds,
            "trap server started"
        );
        Ok(egress_rx)
    }

    /// Stop the pipeline.
    ///
    /// Receiver errors are logged but do not short-circuit handler stop.
    pub async fn stop(&self) -> Result<()> {
        let (receiver, handler, ingress) = {
            let mut state = self.state.lock().unwrap();
            if !state.running {
                return Err(Error::AlreadyStopped { component: "trap server" });
            }
            state.running = false;
            (
                state.receiver.take(),
                state.handler.take(),
                state.ingress.take(),
            )
        };

        if let Some(receiver) = &receiver {
            if let Err(e) = receiver.stop().await {
                tracing::error!(target: "trapsink::server", error = %e, "error stopping receiver");
            }
        }

        // Let the workers drain what the receiver already queued.
        if let Some(ingress) = &ingress {
            let deadline = Instant::now() + DRAIN_GRACE;
            while ingress.capacity() < ingress.max_capacity() {
                if Instant::now() >= deadline {
                    tracing::warn!(target: "trapsink::server", "timed out waiting for ingress queue to drain");
                    break;
                }
                tokio::time::sleep(DRAIN_POLL).await;
            }
        }
        drop(ingress);

        if let Some(handler) = &handler {
            if let Err(e) = handler.stop().await {
                tracing::error!(target: "trapsink::server", error = %e, "error stopping handler");
            }
        }

        tracing::info!(target: "trapsink::server", "trap server stopped");
        Ok(())
    }
}
