//! UDP trap receiver.
//!
//! One reader task owns the socket and the receive buffer. Datagrams are
//! copied into fresh buffers and pushed onto the ingress queue with a
//! non-blocking send: when the queue is full the packet is counted and
//! dropped, so the receiver never blocks on downstream slowness.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::metrics::Metrics;
use crate::error::{Error, Result};
use crate::packet::RawPacket;
use crate::util::bind_udp_socket;

/// Maximum UDP payload size.
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Read deadline; bounds how long a stop waits for the reader to notice.
const READ_DEADLINE: Duration = Duration::from_secs(1);

/// Pause after an unexpected socket error before retrying.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Grace period for the reader task to exit on stop.
const STOP_GRACE: Duration = Duration::from_secs(5);

struct ReceiverState {
    running: bool,
    socket: Option<Arc<UdpSocket>>,
    task: Option<JoinHandle<()>>,
}

/// UDP receiver feeding the ingress queue.
pub struct UdpReceiver {
    ingress: mpsc::Sender<RawPacket>,
    metrics: Arc<Metrics>,
    // Mirror of `state.running` the reader loop can poll without a lock;
    // flipped only inside the state critical section.
    running: Arc<AtomicBool>,
    state: std::sync::Mutex<ReceiverState>,
}

impl UdpReceiver {
    /// Create a stopped receiver that will feed `ingress`.
    pub fn new(ingress: mpsc::Sender<RawPacket>, metrics: Arc<Metrics>) -> Self {
        Self {
            ingress,
            metrics,
            running: Arc::new(AtomicBool::new(false)),
            state: std::sync::Mutex::new(ReceiverState {
                running: false,
                socket: None,
                task: None,
            }),
        }
    }

    /// Bind the UDP socket on `port` and launch the ingestion task.
    ///
    /// Must be called from within a tokio runtime. Fails if already
    /// started or if the bind fails.
    pub fn start(&self, port: u16) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.running {
            return Err(Error::AlreadyStarted { component: "UDP receiver" });
        }

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let socket = bind_udp_socket(addr).map_err(|e| Error::Network { target: addr, source: e })?;
        let socket = Arc::new(socket);

        state.running = true;
        self.running.store(true, Ordering::Release);
        state.socket = Some(Arc::clone(&socket));
        state.task = Some(tokio::spawn(receive_loop(
            socket,
            self.ingress.clone(),
            Arc::clone(&self.running),
            Arc::clone(&self.metrics),
        )));

        tracing::info!(target: "trapsink::receiver", port, "UDP receiver started");
        Ok(())
    }

    /// Stop the receiver and wait for the ingestion task to terminate.
    ///
    /// Waits up to a bounded grace period; on expiry a warning is logged
    /// and control returns.
    pub async fn stop(&self) -> Result<()> {
        let task = {
            let mut state = self.state.lock().unwrap();
            if !state.running {
                return Err(Error::AlreadyStopped { component: "UDP receiver" });
            }
            state.running = false;
            self.running.store(false, Ordering::Release);
            state.socket = None;
            state.task.take()
        };

        tracing::info!(target: "trapsink::receiver", "stopping UDP receiver");

        if let Some(task) = task {
            match tokio::time::timeout(STOP_GRACE, task).await {
                Ok(_) => {
                    tracing::debug!(target: "trapsink::receiver", "receive loop stopped gracefully")
                }
                Err(_) => {
                    tracing::warn!(target: "trapsink::receiver", "timeout waiting for receive loop to stop")
                }
            }
        }

        tracing::info!(target: "trapsink::receiver", "UDP receiver stopped");
        Ok(())
    }

    /// Whether the receiver is currently running.
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// The bound socket address while running (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state
            .lock()
            .unwrap()
            .socket
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
    }
}

/// The single ingestion loop.
async fn receive_loop(
    socket: Arc<UdpSocket>,
    ingress: mpsc::Sender<RawPacket>,
    running: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        if !running.load(Ordering::Acquire) {
            tracing::debug!(target: "trapsink::receiver", "receive loop stopping");
            return;
        }

        // The deadline doubles as the poll interval for the running flag
        // when no traffic arrives.
        let received = match tokio::time::timeout(READ_DEADLINE, socket.recv_from(&mut buffer)).await
        {
            Err(_) => continue,
            Ok(Err(e)) => {
                if !running.load(Ordering::Acquire) {
                    tracing::debug!(target: "trapsink::receiver", "receive loop stopping after socket close");
                    return;
                }
                tracing::warn!(target: "trapsink::receiver", error = %e, "socket read failed");
                tokio::time::sleep(ERROR_BACKOFF).await;
                continue;
            }
            Ok(Ok(received)) => received,
        };

        let (len, source) = received;
        // Fresh copy per packet: enqueued packets never alias the shared
        // receive buffer.
        let data = Bytes::copy_from_slice(&buffer[..len]);
        let packet = RawPacket::new(data, source, Arc::clone(&socket));

        match ingress.try_send(packet) {
            Ok(()) => {
                tracing::trace!(target: "trapsink::receiver", bytes = len, source = %source, "received datagram");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics.ingress_dropped();
                tracing::warn!(target: "trapsink::receiver", source = %source, "ingress queue full, discarding packet");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(target: "trapsink::receiver", "ingress queue closed, receive loop exiting");
                return;
            }
        }
    }
}
