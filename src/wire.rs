//! Wire format for handshake datagrams
//!
//! All handshake frames are fixed-width ASCII with fields left-padded to
//! their width with spaces, so a receiver can classify a datagram by looking
//! at a fixed byte range instead of running a length-prefixed parse:
//!
//! ```text
//! Connect:     | identity[20]              | "connect"[10]    | checksum[32] |
//! Disconnect:  | identity[20]              | "disconnect"[10] |
//! Ack success: | "connection_success"[20]  | interval[10]     |
//! Ack mismatch:| "checksum_mismatch"[20]   |
//! ```
//!
//! Broadcast datagrams carry raw state bytes with no header and never pass
//! through this module.
//!
//! Anything that does not classify decodes to `Error::MalformedDatagram`.
//! Receivers drop malformed datagrams and keep their loop running.

use crate::error::{Error, Result};
use std::time::Duration;

/// Width of the identity field
pub const IDENTITY_WIDTH: usize = 20;
/// Width of the request kind field
const KIND_WIDTH: usize = 10;
/// Width of the connect checksum field
const CHECKSUM_WIDTH: usize = 32;
/// Width of the response result field
const RESULT_WIDTH: usize = 20;
/// Width of the ack interval field
const INTERVAL_WIDTH: usize = 10;

const KIND_CONNECT: &str = "connect";
const KIND_DISCONNECT: &str = "disconnect";
const RESULT_SUCCESS: &str = "connection_success";
const RESULT_MISMATCH: &str = "checksum_mismatch";

/// Total size of a Connect frame
pub const CONNECT_FRAME_LEN: usize = IDENTITY_WIDTH + KIND_WIDTH + CHECKSUM_WIDTH;
/// Total size of a Disconnect frame
pub const DISCONNECT_FRAME_LEN: usize = IDENTITY_WIDTH + KIND_WIDTH;
/// Total size of a success ack
pub const ACK_FRAME_LEN: usize = RESULT_WIDTH + INTERVAL_WIDTH;
/// Total size of a mismatch ack
pub const MISMATCH_FRAME_LEN: usize = RESULT_WIDTH;

/// Decoded handshake request (consumer -> producer)
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeRequest {
    /// Consumer identity, trimmed of field padding
    pub identity: String,
    pub kind: HandshakeKind,
}

/// Request discriminator, with the checksum carried only on connect
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeKind {
    Connect { checksum: String },
    Disconnect,
}

/// Decoded handshake response (producer -> consumer)
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeResponse {
    /// Admission granted; carries the producer's broadcast interval
    Success { interval: Duration },
    /// Schema checksums disagree; admission refused
    ChecksumMismatch,
}

/// Left-pad `value` with spaces to `width`, truncating if longer.
///
/// Identities are ASCII by convention; a multi-byte value is truncated at
/// the nearest char boundary below the field width.
fn pad_field(value: &str, width: usize, out: &mut Vec<u8>) {
    let truncated = if value.len() > width {
        let mut end = width;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        &value[..end]
    } else {
        value
    };
    for _ in truncated.len()..width {
        out.push(b' ');
    }
    out.extend_from_slice(truncated.as_bytes());
}

/// Read a fixed-width field, trimming the space padding.
fn read_field(bytes: &[u8], start: usize, width: usize) -> Result<&str> {
    let raw = bytes
        .get(start..start + width)
        .ok_or_else(|| Error::MalformedDatagram(format!("datagram too short: {} bytes", bytes.len())))?;
    std::str::from_utf8(raw)
        .map(str::trim)
        .map_err(|_| Error::MalformedDatagram("non-UTF8 field".to_string()))
}

/// Encode a Connect request carrying the consumer's schema checksum.
pub fn encode_handshake_connect(identity: &str, checksum: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CONNECT_FRAME_LEN);
    pad_field(identity, IDENTITY_WIDTH, &mut buf);
    pad_field(KIND_CONNECT, KIND_WIDTH, &mut buf);
    pad_field(checksum, CHECKSUM_WIDTH, &mut buf);
    buf
}

/// Encode a Disconnect request (fire-and-forget, no reply expected).
pub fn encode_handshake_disconnect(identity: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DISCONNECT_FRAME_LEN);
    pad_field(identity, IDENTITY_WIDTH, &mut buf);
    pad_field(KIND_DISCONNECT, KIND_WIDTH, &mut buf);
    buf
}

/// Encode a success ack carrying the producer's broadcast interval.
pub fn encode_ack(interval: Duration) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ACK_FRAME_LEN);
    pad_field(RESULT_SUCCESS, RESULT_WIDTH, &mut buf);
    // Fixed precision so the value always fits the 10-byte field intact
    pad_field(
        &format!("{:.4}", interval.as_secs_f64()),
        INTERVAL_WIDTH,
        &mut buf,
    );
    buf
}

/// Encode a checksum-mismatch ack.
pub fn encode_checksum_mismatch() -> Vec<u8> {
    let mut buf = Vec::with_capacity(MISMATCH_FRAME_LEN);
    pad_field(RESULT_MISMATCH, RESULT_WIDTH, &mut buf);
    buf
}

/// Decode a handshake request, classifying on the fixed kind field.
pub fn decode_handshake_request(bytes: &[u8]) -> Result<HandshakeRequest> {
    let identity = read_field(bytes, 0, IDENTITY_WIDTH)?.to_string();
    if identity.is_empty() {
        return Err(Error::MalformedDatagram("empty identity".to_string()));
    }
    let kind = read_field(bytes, IDENTITY_WIDTH, KIND_WIDTH)?;
    match kind {
        KIND_CONNECT => {
            let checksum =
                read_field(bytes, IDENTITY_WIDTH + KIND_WIDTH, CHECKSUM_WIDTH)?.to_string();
            Ok(HandshakeRequest {
                identity,
                kind: HandshakeKind::Connect { checksum },
            })
        }
        KIND_DISCONNECT => Ok(HandshakeRequest {
            identity,
            kind: HandshakeKind::Disconnect,
        }),
        other => Err(Error::MalformedDatagram(format!(
            "unknown request kind: {:?}",
            other
        ))),
    }
}

/// Decode a handshake response, classifying on the fixed result field.
pub fn decode_handshake_response(bytes: &[u8]) -> Result<HandshakeResponse> {
    let result = read_field(bytes, 0, RESULT_WIDTH)?;
    match result {
        RESULT_SUCCESS => {
            let raw = read_field(bytes, RESULT_WIDTH, INTERVAL_WIDTH)?;
            let secs: f64 = raw.parse().map_err(|_| {
                Error::MalformedDatagram(format!("bad interval field: {:?}", raw))
            })?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(Error::MalformedDatagram(format!(
                    "non-positive interval: {}",
                    secs
                )));
            }
            // A 10-byte field can still spell a value beyond what Duration
            // can hold; reject it instead of panicking in the conversion
            let interval = Duration::try_from_secs_f64(secs).map_err(|_| {
                Error::MalformedDatagram(format!("interval out of range: {}", secs))
            })?;
            Ok(HandshakeResponse::Success { interval })
        }
        RESULT_MISMATCH => Ok(HandshakeResponse::ChecksumMismatch),
        other => Err(Error::MalformedDatagram(format!(
            "unknown response result: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_round_trip() {
        let frame = encode_handshake_connect("slam-client", "abc123");
        assert_eq!(frame.len(), CONNECT_FRAME_LEN);

        let req = decode_handshake_request(&frame).unwrap();
        assert_eq!(req.identity, "slam-client");
        assert_eq!(
            req.kind,
            HandshakeKind::Connect {
                checksum: "abc123".to_string()
            }
        );
    }

    #[test]
    fn disconnect_round_trip() {
        let frame = encode_handshake_disconnect("slam-client");
        assert_eq!(frame.len(), DISCONNECT_FRAME_LEN);

        let req = decode_handshake_request(&frame).unwrap();
        assert_eq!(req.identity, "slam-client");
        assert_eq!(req.kind, HandshakeKind::Disconnect);
    }

    #[test]
    fn fields_are_left_padded() {
        let frame = encode_handshake_connect("a", "c");
        // identity occupies the rightmost byte of its field
        assert!(frame[..IDENTITY_WIDTH - 1].iter().all(|&b| b == b' '));
        assert_eq!(frame[IDENTITY_WIDTH - 1], b'a');
        assert_eq!(frame[IDENTITY_WIDTH..30].trim_ascii(), b"connect");
    }

    #[test]
    fn long_identity_is_truncated_to_field_width() {
        let frame = encode_handshake_disconnect("identity-well-beyond-twenty-bytes");
        assert_eq!(frame.len(), DISCONNECT_FRAME_LEN);
        let req = decode_handshake_request(&frame).unwrap();
        assert_eq!(req.identity, "identity-well-beyond");
    }

    #[test]
    fn ack_round_trip() {
        let frame = encode_ack(Duration::from_secs_f64(0.05));
        assert_eq!(frame.len(), ACK_FRAME_LEN);

        match decode_handshake_response(&frame).unwrap() {
            HandshakeResponse::Success { interval } => {
                assert_eq!(interval, Duration::from_secs_f64(0.05));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn mismatch_round_trip() {
        let frame = encode_checksum_mismatch();
        assert_eq!(frame.len(), MISMATCH_FRAME_LEN);
        assert_eq!(
            decode_handshake_response(&frame).unwrap(),
            HandshakeResponse::ChecksumMismatch
        );
    }

    #[test]
    fn garbage_is_malformed_not_panic() {
        assert!(decode_handshake_request(b"").is_err());
        assert!(decode_handshake_request(b"short").is_err());
        assert!(decode_handshake_request(&[0xFF; 64]).is_err());
        assert!(decode_handshake_response(b"").is_err());
        assert!(decode_handshake_response(&[0xFF; 32]).is_err());

        // Valid identity but unknown kind
        let mut frame = encode_handshake_disconnect("x");
        frame[IDENTITY_WIDTH..].copy_from_slice(b"  teardown");
        assert!(matches!(
            decode_handshake_request(&frame),
            Err(Error::MalformedDatagram(_))
        ));
    }

    #[test]
    fn ack_with_bad_interval_is_malformed() {
        let mut frame = encode_ack(Duration::from_secs(1));
        frame[RESULT_WIDTH..].copy_from_slice(b"   not-num");
        assert!(decode_handshake_response(&frame).is_err());

        let mut frame = encode_ack(Duration::from_secs(1));
        frame[RESULT_WIDTH..].copy_from_slice(b"        -1");
        assert!(decode_handshake_response(&frame).is_err());
    }

    #[test]
    fn ack_with_oversized_interval_is_malformed_not_panic() {
        // Parses as a finite positive float but exceeds Duration's range
        let mut frame = encode_ack(Duration::from_secs(1));
        frame[RESULT_WIDTH..].copy_from_slice(b"     99e18");
        assert!(matches!(
            decode_handshake_response(&frame),
            Err(Error::MalformedDatagram(_))
        ));

        let mut frame = encode_ack(Duration::from_secs(1));
        frame[RESULT_WIDTH..].copy_from_slice(b"     1e300");
        assert!(matches!(
            decode_handshake_response(&frame),
            Err(Error::MalformedDatagram(_))
        ));
    }
}
