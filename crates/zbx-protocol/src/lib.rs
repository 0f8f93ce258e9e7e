//! ZBX Protocol -- frame codec, active-check messages, TLS configuration.
//!
//! Every message in either direction travels inside a `ZBXD` frame:
//! 4-byte magic + 1 flag byte + little-endian length + zeroed reserved bytes
//! + payload.

pub mod codec;
pub mod frame;
pub mod messages;
pub mod tls;

pub use codec::FrameCodec;
pub use frame::{read_frame, write_frame, FrameHeader};
pub use messages::*;

/// Frame magic: ASCII "ZBXD".
pub const MAGIC: [u8; 4] = *b"ZBXD";

/// Flag bit: payload follows the ZBX protocol. Must always be set.
pub const FLAG_PROTOCOL: u8 = 0x01;

/// Flag bit: payload is compressed. Not supported.
pub const FLAG_COMPRESSION: u8 = 0x02;

/// Flag bit: 8-byte length and 8-byte reserved field.
pub const FLAG_LARGE_PACKET: u8 = 0x04;

/// Frames declaring this many payload bytes or more are rejected (128 MiB).
pub const MAX_PAYLOAD_BYTES: u64 = 128 * 1024 * 1024;

/// Protocol version announced in active-check requests.
pub const PROTOCOL_VERSION: &str = "7.0.0";

/// Agent variant announced in active-check requests.
pub const AGENT_VARIANT: u8 = 2;

/// Prefix of every negative passive reply.
pub const NOT_SUPPORTED: &str = "ZBX_NOTSUPPORTED";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid magic: {got:02x?}")]
    InvalidMagic { got: [u8; 4] },
    #[error("protocol flag not set (flags {flags:#04x})")]
    MissingProtocolFlag { flags: u8 },
    #[error("compression is not supported")]
    CompressionUnsupported,
    #[error("header too short: need {needed} bytes, got {got}")]
    ShortHeader { needed: usize, got: usize },
    #[error("non-zero reserved bytes: {reserved:02x?}")]
    NonZeroReserved { reserved: Vec<u8> },
    #[error("payload too large: {size} bytes (limit {max})")]
    PayloadTooLarge { size: u64, max: u64 },
    #[error("incorrect data length: declared {declared}, received {actual}")]
    LengthMismatch { declared: u64, actual: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
