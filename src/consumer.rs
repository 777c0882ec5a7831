//! Consumer session state machine
//!
//! One session keeps one local replica current against one producer:
//!
//! ```text
//! Disconnected --send connect--> AwaitingAck
//! AwaitingAck  --success ack--->  Connected (timeout = interval x multiplier)
//! AwaitingAck  --mismatch------>  fatal ChecksumMismatch
//! AwaitingAck  --ack timeout--->  Disconnected (retry on a fresh socket)
//! Connected    --datagram------>  Connected (apply to replica)
//! Connected    --recv timeout-->  TimedOut --> Disconnected (reconnect)
//!                                          \-> fatal LivenessTimeout
//! any          --stop flag----->  Disconnected (best-effort disconnect frame)
//! ```
//!
//! Broadcast datagrams are complete snapshots with no header, so a missed,
//! duplicated, or reordered datagram costs nothing: the next one fully
//! re-states the value. The receive timeout is derived from the interval
//! negotiated in the ack, never from a local default.
//!
//! The only errors that reach the caller are `ChecksumMismatch` and, with
//! reconnect disabled, `LivenessTimeout`. Everything else is handled inside
//! the loop and logged.

use crate::config::ConsumerConfig;
use crate::error::{Error, Result};
use crate::state::SharedState;
use crate::wire::{self, HandshakeResponse};
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Maximum broadcast datagram size (full state snapshots can be large)
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Bound on the best-effort disconnect send at stop time
const DISCONNECT_SEND_TIMEOUT: Duration = Duration::from_millis(200);

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    AwaitingAck = 1,
    Connected = 2,
    TimedOut = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::AwaitingAck,
            2 => SessionState::Connected,
            3 => SessionState::TimedOut,
            _ => SessionState::Disconnected,
        }
    }
}

/// Shared observer/control handle for a running session.
///
/// Cloneable into other threads: `stop()` requests shutdown (observed at the
/// next blocking-call boundary), `state()`/`is_connected()` report liveness.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            state: Arc::new(AtomicU8::new(SessionState::Disconnected as u8)),
        }
    }

    /// Request the session to stop. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Liveness indicator: true only while broadcasts are arriving in time.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    fn should_run(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Consumer-side replication session
pub struct ConsumerSession {
    config: ConsumerConfig,
    state: SharedState,
    handle: SessionHandle,
}

/// Outcome of one handshake attempt
enum HandshakeAttempt {
    /// Admitted; socket to keep receiving on, negotiated interval
    Admitted(UdpSocket, Duration),
    /// No ack within the window; retry on a fresh socket
    TimedOut,
    /// Stop was requested mid-attempt
    Stopped,
}

impl ConsumerSession {
    pub fn new(config: ConsumerConfig, state: SharedState) -> Self {
        Self {
            config,
            state,
            handle: SessionHandle::new(),
        }
    }

    /// Handle for stopping and observing the session from other threads.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Run the session until stopped or a fatal error.
    ///
    /// Returns `Ok(())` after a requested stop, `Err(ChecksumMismatch)` on
    /// schema skew, `Err(LivenessTimeout)` when broadcasts stop arriving and
    /// reconnect is disabled.
    pub fn run(&mut self) -> Result<()> {
        log::info!(
            "Consumer session {:?} -> {}",
            self.config.identity,
            self.config.producer_address
        );

        let result = self.run_inner();
        self.handle.set_state(SessionState::Disconnected);

        match &result {
            Ok(()) => log::info!("Consumer session {:?} stopped", self.config.identity),
            Err(e) => log::error!("Consumer session {:?} failed: {}", self.config.identity, e),
        }
        result
    }

    fn run_inner(&mut self) -> Result<()> {
        while self.handle.should_run() {
            // Disconnected -> AwaitingAck, fresh socket per attempt
            let (socket, interval) = match self.handshake()? {
                HandshakeAttempt::Admitted(socket, interval) => (socket, interval),
                HandshakeAttempt::TimedOut => {
                    log::warn!(
                        "{} ({}, window {:.1}s), retrying",
                        Error::HandshakeTimeout,
                        self.config.producer_address,
                        self.config.handshake_timeout_secs
                    );
                    self.handle.set_state(SessionState::Disconnected);
                    continue;
                }
                HandshakeAttempt::Stopped => return Ok(()),
            };

            let liveness_timeout = liveness_window(interval, self.config.liveness_multiplier);
            log::info!(
                "Connected to {} (interval {:.3}s, liveness timeout {:.1}s)",
                self.config.producer_address,
                interval.as_secs_f64(),
                liveness_timeout.as_secs_f64()
            );

            match self.steady_state(&socket, liveness_timeout) {
                SteadyStateExit::Stopped => {
                    self.send_disconnect(&socket);
                    return Ok(());
                }
                SteadyStateExit::TimedOut => {
                    self.handle.set_state(SessionState::TimedOut);
                    if !self.config.reconnect {
                        return Err(Error::LivenessTimeout);
                    }
                    log::warn!(
                        "No broadcast within {:.1}s, reconnecting",
                        liveness_timeout.as_secs_f64()
                    );
                    // Socket dropped here; the retry binds a fresh one
                    self.handle.set_state(SessionState::Disconnected);
                }
            }
        }
        Ok(())
    }

    /// One handshake attempt on a fresh ephemeral socket.
    fn handshake(&self) -> Result<HandshakeAttempt> {
        if !self.handle.should_run() {
            return Ok(HandshakeAttempt::Stopped);
        }

        // Socket setup failures (fd exhaustion and the like) are treated
        // like a lost datagram: callers only ever see the fatal errors
        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(socket) => socket,
            Err(e) => {
                log::error!("Handshake socket bind failed: {}", e);
                std::thread::sleep(self.config.handshake_timeout());
                return Ok(HandshakeAttempt::TimedOut);
            }
        };
        let frame = wire::encode_handshake_connect(
            &self.config.identity,
            &self.state.lock().schema_checksum(),
        );
        if let Err(e) = socket.send_to(&frame, &self.config.producer_address) {
            // Unroutable producer looks the same as a lost datagram: wait
            // out the window and retry, rather than leaking a socket error
            log::warn!(
                "Connect send to {} failed: {}",
                self.config.producer_address,
                e
            );
            std::thread::sleep(self.config.handshake_timeout());
            return Ok(HandshakeAttempt::TimedOut);
        }
        self.handle.set_state(SessionState::AwaitingAck);

        let deadline = Instant::now() + self.config.handshake_timeout();
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        // Wait out the full window; stray or malformed datagrams inside it
        // are dropped rather than burning the attempt.
        loop {
            if !self.handle.should_run() {
                return Ok(HandshakeAttempt::Stopped);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(HandshakeAttempt::TimedOut);
            }
            if let Err(e) = socket.set_read_timeout(Some(remaining)) {
                log::error!("Failed to arm ack timeout: {}", e);
                return Ok(HandshakeAttempt::TimedOut);
            }

            let len = match socket.recv_from(&mut buffer) {
                Ok((len, _reply_addr)) => len,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    log::warn!("Recv error while awaiting ack: {}", e);
                    return Ok(HandshakeAttempt::TimedOut);
                }
            };

            match wire::decode_handshake_response(&buffer[..len]) {
                Ok(HandshakeResponse::Success { interval }) => {
                    return Ok(HandshakeAttempt::Admitted(socket, interval));
                }
                Ok(HandshakeResponse::ChecksumMismatch) => {
                    // Structural skew between producer and consumer builds;
                    // retrying cannot change the outcome
                    return Err(Error::ChecksumMismatch);
                }
                Err(e) => {
                    log::warn!("Dropping datagram while awaiting ack: {}", e);
                }
            }
        }
    }

    /// Steady-state receive loop: apply every broadcast until timeout or stop.
    fn steady_state(&self, socket: &UdpSocket, timeout: Duration) -> SteadyStateExit {
        self.handle.set_state(SessionState::Connected);
        if let Err(e) = socket.set_read_timeout(Some(timeout)) {
            log::error!("Failed to arm liveness timeout: {}", e);
            return SteadyStateExit::TimedOut;
        }

        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            if !self.handle.should_run() {
                return SteadyStateExit::Stopped;
            }

            let len = match socket.recv_from(&mut buffer) {
                Ok((len, _)) => len,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return SteadyStateExit::TimedOut;
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return SteadyStateExit::TimedOut;
                }
                Err(e) => {
                    // Treat a hard socket error like a lost producer: the
                    // reconnect policy decides what happens next
                    log::error!("Recv error while connected: {}", e);
                    return SteadyStateExit::TimedOut;
                }
            };

            // Broadcasts are complete snapshots; a bad one is dropped and
            // the next cycle re-states the value anyway
            if let Err(e) = self.state.lock().apply(&buffer[..len]) {
                log::warn!("Dropping broadcast ({} bytes): {}", len, e);
            } else {
                log::trace!("Applied {} byte snapshot", len);
            }
        }
    }

    /// Best-effort disconnect notification at stop time. Never blocks
    /// beyond the short send timeout; failures are only logged.
    fn send_disconnect(&self, socket: &UdpSocket) {
        let frame = wire::encode_handshake_disconnect(&self.config.identity);
        let _ = socket.set_write_timeout(Some(DISCONNECT_SEND_TIMEOUT));
        if let Err(e) = socket.send_to(&frame, &self.config.producer_address) {
            log::warn!("Disconnect notification failed: {}", e);
        } else {
            log::info!("Sent disconnect for {:?}", self.config.identity);
        }
    }
}

enum SteadyStateExit {
    TimedOut,
    Stopped,
}

/// Liveness window from the negotiated interval. Saturates at
/// `Duration::MAX` rather than overflowing on an absurdly large advertised
/// interval (functionally "wait forever", which is what such an interval
/// asks for anyway).
fn liveness_window(interval: Duration, multiplier: u32) -> Duration {
    interval
        .checked_mul(multiplier)
        .unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_round_trips_through_cell() {
        for state in [
            SessionState::Disconnected,
            SessionState::AwaitingAck,
            SessionState::Connected,
            SessionState::TimedOut,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn liveness_window_saturates_instead_of_overflowing() {
        assert_eq!(
            liveness_window(Duration::from_millis(50), 10),
            Duration::from_millis(500)
        );
        // An interval near Duration's range times the default multiplier
        // must clamp, not panic
        let huge = Duration::from_secs_f64(9.0e17);
        assert_eq!(liveness_window(huge, 100), Duration::MAX);
        assert_eq!(liveness_window(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn handle_starts_disconnected_and_stops() {
        let handle = SessionHandle::new();
        assert_eq!(handle.state(), SessionState::Disconnected);
        assert!(!handle.is_connected());
        assert!(handle.should_run());

        handle.stop();
        assert!(!handle.should_run());
        // stop is idempotent
        handle.stop();
        assert!(!handle.should_run());
    }
}
