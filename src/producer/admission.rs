//! Admission loop for consumer handshakes
//!
//! Single loop bound to the producer's well-known UDP socket. Connect
//! requests are gated on the schema checksum: a match registers the sender's
//! address for broadcast fan-out and acks with the broadcast interval, a
//! mismatch is refused without touching the registry. Disconnects remove the
//! identity and get no reply.
//!
//! The socket uses a short read timeout so the shutdown flag is observed
//! within one poll. Nothing thrown at this socket can take the loop down:
//! malformed datagrams are logged and dropped, and reply send failures are
//! logged best-effort.

use crate::error::Result;
use crate::registry::PeerRegistry;
use crate::state::SharedState;
use crate::wire::{self, HandshakeKind};
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Poll timeout on the admission socket (bounds shutdown latency)
const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest handshake frame we expect; anything longer is already malformed
const MAX_REQUEST_SIZE: usize = 128;

/// Handshake admission service for the producer
pub struct AdmissionService {
    socket: UdpSocket,
    state: SharedState,
    registry: Arc<PeerRegistry>,
    broadcast_interval: Duration,
    running: Arc<AtomicBool>,
}

impl AdmissionService {
    /// Create the service on an already-bound admission socket.
    pub fn new(
        socket: UdpSocket,
        state: SharedState,
        registry: Arc<PeerRegistry>,
        broadcast_interval: Duration,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        socket.set_read_timeout(Some(RECV_POLL_TIMEOUT))?;
        Ok(Self {
            socket,
            state,
            registry,
            broadcast_interval,
            running,
        })
    }

    /// Run the admission loop (blocking until shutdown).
    pub fn run(&self) {
        log::info!(
            "Admission service listening on {:?}",
            self.socket.local_addr()
        );

        let mut buffer = [0u8; MAX_REQUEST_SIZE];

        while self.running.load(Ordering::Relaxed) {
            let (len, sender) = match self.socket.recv_from(&mut buffer) {
                Ok(result) => result,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    log::error!("Admission recv error: {}", e);
                    continue;
                }
            };

            let request = match wire::decode_handshake_request(&buffer[..len]) {
                Ok(req) => req,
                Err(e) => {
                    log::warn!("Dropping datagram from {}: {}", sender, e);
                    continue;
                }
            };

            match request.kind {
                HandshakeKind::Connect { checksum } => {
                    self.handle_connect(&request.identity, &checksum, sender);
                }
                HandshakeKind::Disconnect => {
                    log::info!("Disconnect from {} ({})", request.identity, sender);
                    self.registry.remove(&request.identity);
                    // Fire-and-forget: no reply
                }
            }
        }

        log::info!("Admission service stopped");
    }

    /// Gate a connect on the schema checksum and reply either way.
    ///
    /// The sender's address comes from the socket, never from the payload,
    /// so a consumer is always registered at the address it can actually
    /// receive on.
    fn handle_connect(&self, identity: &str, checksum: &str, sender: std::net::SocketAddr) {
        let expected = self.state.lock().schema_checksum();

        if checksum != expected {
            log::warn!(
                "Refusing {} ({}): schema checksum {:?} does not match {:?}",
                identity,
                sender,
                checksum,
                expected
            );
            let reply = wire::encode_checksum_mismatch();
            if let Err(e) = self.socket.send_to(&reply, sender) {
                log::warn!("Failed to send mismatch reply to {}: {}", sender, e);
            }
            return;
        }

        self.registry.upsert(identity, sender);
        log::info!(
            "Admitted {} at {} (interval {:.3}s)",
            identity,
            sender,
            self.broadcast_interval.as_secs_f64()
        );

        let reply = wire::encode_ack(self.broadcast_interval);
        if let Err(e) = self.socket.send_to(&reply, sender) {
            log::warn!("Failed to send ack to {}: {}", sender, e);
        }
    }
}
