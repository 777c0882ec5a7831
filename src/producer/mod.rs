//! Producer orchestration
//!
//! Wires the admission service and broadcast scheduler together: one
//! well-known UDP socket for handshakes, one send-only socket for
//! broadcasts, two named threads sharing the registry and a single shutdown
//! flag. The registry is mutated only by the admission thread; the
//! broadcast thread reads snapshots.

mod admission;
mod broadcast;

pub use admission::AdmissionService;
pub use broadcast::BroadcastScheduler;

use crate::config::ProducerConfig;
use crate::error::{Error, Result};
use crate::registry::PeerRegistry;
use crate::state::SharedState;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Running producer: admission + broadcast threads over one registry
pub struct Producer {
    local_addr: SocketAddr,
    registry: Arc<PeerRegistry>,
    running: Arc<AtomicBool>,
    admission_handle: Option<JoinHandle<()>>,
    broadcast_handle: Option<JoinHandle<()>>,
}

impl Producer {
    /// Bind the admission socket and start both loops.
    ///
    /// `state` is shared with the embedding application, which keeps
    /// mutating it; every broadcast cycle serializes whatever the state
    /// holds at that moment.
    pub fn start(config: &ProducerConfig, state: SharedState) -> Result<Self> {
        let admission_socket = UdpSocket::bind(&config.bind_address)
            .map_err(|e| Error::Config(format!("bind {} failed: {}", config.bind_address, e)))?;
        let local_addr = admission_socket.local_addr()?;

        // Send-only socket for broadcasts; the port does not matter
        let broadcast_socket = UdpSocket::bind("0.0.0.0:0")?;

        let registry = Arc::new(PeerRegistry::new());
        let running = Arc::new(AtomicBool::new(true));
        let interval = config.broadcast_interval();

        let admission = AdmissionService::new(
            admission_socket,
            Arc::clone(&state),
            Arc::clone(&registry),
            interval,
            Arc::clone(&running),
        )?;
        let admission_handle = std::thread::Builder::new()
            .name("admission".to_string())
            .spawn(move || admission.run())?;

        let scheduler = BroadcastScheduler::new(
            broadcast_socket,
            state,
            Arc::clone(&registry),
            interval,
            Arc::clone(&running),
        );
        let broadcast_handle = std::thread::Builder::new()
            .name("broadcast".to_string())
            .spawn(move || scheduler.run())?;

        log::info!("Producer started on {}", local_addr);

        Ok(Self {
            local_addr,
            registry,
            running,
            admission_handle: Some(admission_handle),
            broadcast_handle: Some(broadcast_handle),
        })
    }

    /// Address consumers handshake with (useful when bound to port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Registry handle, for observability and administrative cleanup.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Signal both loops to stop and join them. Latency is bounded by the
    /// admission poll timeout and one broadcast interval.
    pub fn shutdown(&mut self) {
        if self.admission_handle.is_none() && self.broadcast_handle.is_none() {
            return;
        }
        self.running.store(false, Ordering::Relaxed);

        if let Some(handle) = self.admission_handle.take() {
            if handle.join().is_err() {
                log::error!("Admission thread panicked");
            }
        }
        if let Some(handle) = self.broadcast_handle.take() {
            if handle.join().is_err() {
                log::error!("Broadcast thread panicked");
            }
        }

        log::info!("Producer stopped");
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
