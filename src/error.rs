//! Error types for prasar

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Prasar error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (socket bind/send/recv)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Datagram that cannot be classified or parsed
    #[error("Malformed datagram: {0}")]
    MalformedDatagram(String),

    /// Producer rejected the handshake: schema checksums disagree
    #[error("Schema checksum rejected by producer")]
    ChecksumMismatch,

    /// No ack received while awaiting admission
    #[error("Handshake timed out waiting for ack")]
    HandshakeTimeout,

    /// No broadcast received within the liveness window
    #[error("No broadcast received within the liveness timeout")]
    LivenessTimeout,

    /// State container failed to serialize or apply a snapshot
    #[error("State error: {0}")]
    State(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error is terminal for a consumer session.
    ///
    /// `ChecksumMismatch` is structural version skew between producer and
    /// consumer: retrying cannot help. `LivenessTimeout` only reaches callers
    /// when reconnect is disabled, at which point the session is over.
    /// Timeouts and malformed datagrams are otherwise handled inside the
    /// loops and never escape.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ChecksumMismatch | Error::LivenessTimeout | Error::Config(_)
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::ChecksumMismatch.is_fatal());
        assert!(Error::LivenessTimeout.is_fatal());
        assert!(!Error::HandshakeTimeout.is_fatal());
        assert!(!Error::MalformedDatagram("short".into()).is_fatal());
    }
}
