//! Shared-state container boundary
//!
//! The protocol core is agnostic to what the replicated state looks like.
//! It only needs to turn the producer's state into bytes, overwrite a
//! consumer's replica from bytes, and compare schema checksums at admission
//! time. The embedding application supplies the container behind this trait.

use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Operations the protocol needs from the replicated state container.
///
/// `schema_checksum` must hash the *shape* of the state (tags, layout,
/// version), not its current values, so producer/consumer version skew is
/// caught at connect time instead of corrupting the replica at apply time.
pub trait StateContainer: Send {
    /// Serialize the current state into a self-contained snapshot.
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Overwrite the local replica from a snapshot. Applying the same bytes
    /// twice must leave the replica identical to applying them once.
    fn apply(&mut self, bytes: &[u8]) -> Result<()>;

    /// Checksum over the state's schema, stable for a given build.
    fn schema_checksum(&self) -> String;
}

/// Shared handle to a state container, one per producer or consumer.
pub type SharedState = Arc<Mutex<Box<dyn StateContainer>>>;

/// Wrap a container for sharing between loops.
pub fn shared<S: StateContainer + 'static>(state: S) -> SharedState {
    Arc::new(Mutex::new(Box::new(state)))
}

/// Minimal container holding an opaque blob. The snapshot is the blob
/// itself, so apply is trivially idempotent. Used by tests and embedding
/// demos; real applications bring their own container.
#[derive(Debug, Clone)]
pub struct BlobState {
    checksum: String,
    bytes: Vec<u8>,
}

impl BlobState {
    pub fn new(checksum: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            checksum: checksum.into(),
            bytes,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.bytes = bytes;
    }
}

impl StateContainer for BlobState {
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    fn apply(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes = bytes.to_vec();
        Ok(())
    }

    fn schema_checksum(&self) -> String {
        self.checksum.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_is_idempotent() {
        let mut replica = BlobState::new("abc123", Vec::new());

        replica.apply(&[0x01, 0x02]).unwrap();
        let once = replica.bytes().to_vec();

        replica.apply(&[0x01, 0x02]).unwrap();
        assert_eq!(replica.bytes(), once.as_slice());
    }

    #[test]
    fn serialize_restates_full_value() {
        let state = BlobState::new("abc123", vec![0xAA, 0xBB]);
        assert_eq!(state.serialize().unwrap(), vec![0xAA, 0xBB]);
        assert_eq!(state.schema_checksum(), "abc123");
    }
}
