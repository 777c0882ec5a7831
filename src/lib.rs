//! Prasar - best-effort UDP state replication
//!
//! One producer holds an authoritative state blob and periodically
//! broadcasts full snapshots to every admitted consumer. Admission is a
//! checksum-gated handshake (schema skew is caught at connect time, not at
//! apply time); liveness is a receive timeout derived from the interval the
//! producer advertises in its ack.
//!
//! The protocol is intentionally at-most-once and idempotent: broadcasts
//! may be lost, duplicated, or reordered, and none of it matters because
//! every datagram fully re-states the current value.
//!
//! The replicated state itself lives behind the [`state::StateContainer`]
//! trait; this crate moves bytes, it does not interpret them.

pub mod config;
pub mod consumer;
pub mod error;
pub mod producer;
pub mod registry;
pub mod state;
pub mod wire;

// Re-export commonly used types
pub use config::{AppConfig, ConsumerConfig, ProducerConfig};
pub use consumer::{ConsumerSession, SessionHandle, SessionState};
pub use error::{Error, Result};
pub use producer::Producer;
pub use registry::{PeerRegistry, UpsertOutcome};
pub use state::{BlobState, SharedState, StateContainer, shared};
