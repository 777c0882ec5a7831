//! Periodic snapshot broadcaster
//!
//! Each cycle serializes the shared state exactly once, snapshots the
//! registry, and sends the bytes to every registered address in turn.
//! Sends are best-effort: a failure to one address is logged and affects
//! neither the remaining sends in the cycle nor the registry (removal only
//! happens through an explicit disconnect, so a consumer that is briefly
//! unreachable keeps its registration and self-recovers).
//!
//! Cycles never overlap; the loop sleeps one interval between them and
//! checks the shutdown flag on both sides of the sleep, so shutdown latency
//! is bounded by one interval.

use crate::registry::PeerRegistry;
use crate::state::SharedState;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Periodic broadcast loop for the producer
pub struct BroadcastScheduler {
    socket: UdpSocket,
    state: SharedState,
    registry: Arc<PeerRegistry>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl BroadcastScheduler {
    /// Create the scheduler on a send-only socket (bound to an ephemeral port).
    pub fn new(
        socket: UdpSocket,
        state: SharedState,
        registry: Arc<PeerRegistry>,
        interval: Duration,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            socket,
            state,
            registry,
            interval,
            running,
        }
    }

    /// Run the broadcast loop (blocking until shutdown).
    pub fn run(&self) {
        log::info!(
            "Broadcast scheduler started (interval {:.3}s)",
            self.interval.as_secs_f64()
        );

        while self.running.load(Ordering::Relaxed) {
            self.run_cycle();

            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(self.interval);
        }

        log::info!("Broadcast scheduler stopped");
    }

    /// One broadcast cycle: serialize once, fan out to the current snapshot.
    fn run_cycle(&self) {
        let addresses = self.registry.snapshot();
        if addresses.is_empty() {
            return;
        }

        // Serialize outside the send loop; the bytes are immutable for the
        // rest of the cycle. The state lock is not held across sends.
        let bytes = match self.state.lock().serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Skipping broadcast cycle, serialize failed: {}", e);
                return;
            }
        };

        let mut sent = 0usize;
        for addr in &addresses {
            match self.socket.send_to(&bytes, addr) {
                Ok(_) => sent += 1,
                Err(e) => {
                    // One unreachable consumer must not starve the others
                    log::warn!("Broadcast send to {} failed: {}", addr, e);
                }
            }
        }

        log::trace!(
            "Broadcast cycle: {} bytes to {}/{} consumers",
            bytes.len(),
            sent,
            addresses.len()
        );
    }
}
