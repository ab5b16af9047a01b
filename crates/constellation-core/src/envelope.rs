//! Binary envelope header stamped on every peer request.
//!
//! The header is a fixed 23-byte big-endian struct carried hex-encoded in the
//! `X-Bobb-Header` HTTP header. Every field is part of the wire format.
//! Layout:
//!
//! | field            | size |
//! |------------------|------|
//! | version_major    | 1    |
//! | version_minor    | 1    |
//! | message_type     | 1    |
//! | dest_ipv4        | 4    |
//! | dest_port        | 2    |
//! | source_ipv4      | 4    |
//! | source_port      | 2    |
//! | sequence_number  | 4    |
//! | timestamp (s)    | 4    |

use std::net::Ipv4Addr;

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::node::{now_ms, NodeId};

/// HTTP header name the envelope travels in.
pub const HEADER_NAME: &str = "X-Bobb-Header";

pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

/// Encoded size in bytes.
pub const ENVELOPE_LEN: usize = 23;

// ── Wire struct ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
struct RawHeader {
    version_major: u8,
    version_minor: u8,
    message_type: u8,
    dest_ip: [u8; 4],
    dest_port: U16<BigEndian>,
    source_ip: [u8; 4],
    source_port: U16<BigEndian>,
    sequence_number: U32<BigEndian>,
    timestamp: U32<BigEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(RawHeader, [u8; ENVELOPE_LEN]);

// ── Message types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Handshake = 1,
    Heartbeat = 2,
    Route = 3,
    Forward = 4,
    Identify = 5,
}

impl TryFrom<u8> for MessageType {
    type Error = EnvelopeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Handshake),
            2 => Ok(MessageType::Heartbeat),
            3 => Ok(MessageType::Route),
            4 => Ok(MessageType::Forward),
            5 => Ok(MessageType::Identify),
            other => Err(EnvelopeError::UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(t: MessageType) -> u8 {
        t as u8
    }
}

// ── EnvelopeHeader ────────────────────────────────────────────────────────────

/// Decoded envelope. Addresses are IPv4 only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub message_type: MessageType,
    pub dest_ip: Ipv4Addr,
    pub dest_port: u16,
    pub source_ip: Ipv4Addr,
    pub source_port: u16,
    pub sequence_number: u32,
    /// Unix seconds at stamping time.
    pub timestamp: u32,
}

impl EnvelopeHeader {
    /// Stamp a header for a message from `source` to `destination`.
    pub fn new(
        message_type: MessageType,
        source: &NodeId,
        destination: &NodeId,
        sequence_number: u32,
    ) -> Result<Self, EnvelopeError> {
        Ok(Self {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            message_type,
            dest_ip: ipv4_of(&destination.ip)?,
            dest_port: destination.port,
            source_ip: ipv4_of(&source.ip)?,
            source_port: source.port,
            sequence_number,
            timestamp: (now_ms() / 1000) as u32,
        })
    }

    pub fn source(&self) -> NodeId {
        NodeId::new(self.source_ip.to_string(), self.source_port)
    }

    pub fn destination(&self) -> NodeId {
        NodeId::new(self.dest_ip.to_string(), self.dest_port)
    }

    pub fn to_bytes(&self) -> [u8; ENVELOPE_LEN] {
        let raw = RawHeader {
            version_major: self.version_major,
            version_minor: self.version_minor,
            message_type: self.message_type.into(),
            dest_ip: self.dest_ip.octets(),
            dest_port: U16::new(self.dest_port),
            source_ip: self.source_ip.octets(),
            source_port: U16::new(self.source_port),
            sequence_number: U32::new(self.sequence_number),
            timestamp: U32::new(self.timestamp),
        };
        let mut out = [0u8; ENVELOPE_LEN];
        out.copy_from_slice(raw.as_bytes());
        out
    }

    /// Decode exactly [`ENVELOPE_LEN`] bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() != ENVELOPE_LEN {
            return Err(EnvelopeError::BadLength(bytes.len()));
        }
        let raw = RawHeader::read_from(bytes).ok_or(EnvelopeError::BadLength(bytes.len()))?;
        if raw.version_major != VERSION_MAJOR {
            return Err(EnvelopeError::UnsupportedVersion(raw.version_major));
        }
        Ok(Self {
            version_major: raw.version_major,
            version_minor: raw.version_minor,
            message_type: MessageType::try_from(raw.message_type)?,
            dest_ip: Ipv4Addr::from(raw.dest_ip),
            dest_port: raw.dest_port.get(),
            source_ip: Ipv4Addr::from(raw.source_ip),
            source_port: raw.source_port.get(),
            sequence_number: raw.sequence_number.get(),
            timestamp: raw.timestamp.get(),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, EnvelopeError> {
        let bytes = hex::decode(s.trim()).map_err(|_| EnvelopeError::NotHex)?;
        Self::parse(&bytes)
    }
}

/// Resolve the textual address forms nodes use for themselves.
fn ipv4_of(ip: &str) -> Result<Ipv4Addr, EnvelopeError> {
    if ip.eq_ignore_ascii_case("localhost") {
        return Ok(Ipv4Addr::LOCALHOST);
    }
    ip.parse()
        .map_err(|_| EnvelopeError::NotIpv4(ip.to_string()))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope must be {} bytes, got {0}", ENVELOPE_LEN)]
    BadLength(usize),

    #[error("envelope header is not valid hex")]
    NotHex,

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown message type: 0x{0:02x}")]
    UnknownMessageType(u8),

    #[error("address {0:?} is not IPv4")]
    NotIpv4(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EnvelopeHeader {
        EnvelopeHeader::new(
            MessageType::Heartbeat,
            &NodeId::new("10.0.0.7", 33005),
            &NodeId::new("localhost", 33010),
            42,
        )
        .unwrap()
    }

    #[test]
    fn layout_is_big_endian() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes.len(), 23);
        assert_eq!(&bytes[0..3], &[1, 0, 2]);
        assert_eq!(&bytes[3..7], &[127, 0, 0, 1]);
        assert_eq!(&bytes[7..9], &33010u16.to_be_bytes());
        assert_eq!(&bytes[9..13], &[10, 0, 0, 7]);
        assert_eq!(&bytes[13..15], &33005u16.to_be_bytes());
        assert_eq!(&bytes[15..19], &42u32.to_be_bytes());
    }

    #[test]
    fn hex_decodes_to_same_header() {
        let header = sample();
        let decoded = EnvelopeHeader::from_hex(&header.to_hex()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.source(), NodeId::new("10.0.0.7", 33005));
        assert_eq!(decoded.destination(), NodeId::new("127.0.0.1", 33010));
    }

    #[test]
    fn short_and_non_hex_input_rejected() {
        assert_eq!(
            EnvelopeHeader::parse(&[1, 0, 2]).unwrap_err(),
            EnvelopeError::BadLength(3)
        );
        assert_eq!(
            EnvelopeHeader::from_hex("zz").unwrap_err(),
            EnvelopeError::NotHex
        );
    }

    #[test]
    fn unknown_message_type_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[2] = 0x09;
        let err = EnvelopeHeader::parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("0x09"));
    }

    #[test]
    fn hostnames_are_not_encodable() {
        let err = EnvelopeHeader::new(
            MessageType::Route,
            &NodeId::new("sat.example", 1),
            &NodeId::new("127.0.0.1", 2),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, EnvelopeError::NotIpv4(_)));
    }
}
