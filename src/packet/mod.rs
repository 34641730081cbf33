//! Types that represent TFTP packets and their wire encoding.
//!
//! Every datagram opens with a 2-byte big-endian [`Opcode`] which decides how
//! the remainder is parsed:
//!
//! | Packet  | Bytes 0-1 | Bytes 2-3    | Remainder                      |
//! |---------|-----------|--------------|--------------------------------|
//! | Request | 1 or 2    | -            | filename, 0x00, mode, 0x00     |
//! | Data    | 3         | block number | payload (0-512 bytes)          |
//! | Ack     | 4         | block number | -                              |
//! | Error   | 5         | error code   | message, 0x00                  |

use std::fmt;
use std::mem::size_of;

use crate::bytes::{Bytes, FromBytes, IntoBytes};

mod ack;
mod data;
mod error;
mod mode;
mod opcode;
mod rq;

pub use ack::Ack;
pub use data::Data;
pub use error::{Error, ErrorCode};
pub use mode::Mode;
pub use opcode::Opcode;
pub use rq::{Request, RequestKind};

/// The largest payload a `Data` packet may carry. A shorter payload marks
/// the final block of a transfer.
pub const MAX_PAYLOAD_SIZE: usize = 512;

/// Opcode + block number + payload.
pub const MAX_PACKET_SIZE: usize = 2 * size_of::<u16>() + MAX_PAYLOAD_SIZE;

/// Reasons a datagram could not be decoded into a [`Packet`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MalformedPacket {
    #[error("packet truncated ({len} bytes)")]
    Truncated { len: usize },

    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),

    #[error("payload of {len} bytes exceeds 512")]
    Oversized { len: usize },

    #[error("{len} unexpected trailing bytes")]
    TrailingBytes { len: usize },

    #[error("text field is not NUL terminated")]
    Unterminated,

    #[error("text field is not valid UTF-8")]
    InvalidText,

    #[error("request has an empty filename")]
    EmptyFilename,

    #[error("unknown transfer mode {0:?}")]
    UnknownMode(String),
}

/// A 16-bit block number as it appears on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Block(pub u16);

impl Block {
    pub fn new(val: u16) -> Self {
        Self(val)
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromBytes for Block {
    type Error = MalformedPacket;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, MalformedPacket> {
        Ok(Self(Bytes::<u16>::from_bytes(bytes)?.into_inner()))
    }
}

impl IntoBytes for Block {
    fn into_bytes(self) -> Vec<u8> {
        Bytes::new(self.0).into_bytes()
    }
}

/// A decoded TFTP datagram.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Packet {
    Request(Request),
    Data(Data),
    Ack(Ack),
    Error(Error),
}

impl Packet {
    /// Creates a read request.
    pub fn rrq<S: AsRef<str>>(filename: S, mode: Mode) -> Self {
        Packet::Request(Request::new(RequestKind::Read, filename, mode))
    }

    /// Creates a write request.
    pub fn wrq<S: AsRef<str>>(filename: S, mode: Mode) -> Self {
        Packet::Request(Request::new(RequestKind::Write, filename, mode))
    }

    pub fn data<T: AsRef<[u8]>>(block: Block, data: T) -> Self {
        Packet::Data(Data::new(block, data))
    }

    pub fn ack(block: Block) -> Self {
        Packet::Ack(Ack { block })
    }

    pub fn error<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Packet::Error(Error {
            code,
            message: message.into(),
        })
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::Request(rq) => rq.kind.opcode(),
            Packet::Data(_) => Opcode::Data,
            Packet::Ack(_) => Opcode::Ack,
            Packet::Error(_) => Opcode::Error,
        }
    }

    /// Decodes and validates a whole datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedPacket> {
        Packet::from_bytes(bytes)
    }

    /// Encodes this packet into a datagram.
    pub fn encode(self) -> Vec<u8> {
        self.into_bytes()
    }
}

impl FromBytes for Packet {
    type Error = MalformedPacket;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, MalformedPacket> {
        let bytes = bytes.as_ref();

        let split_at = size_of::<u16>();
        if bytes.len() < split_at {
            return Err(MalformedPacket::Truncated { len: bytes.len() });
        }

        let (opcode, body) = bytes.split_at(split_at);
        Ok(match Opcode::from_bytes(opcode)? {
            Opcode::Rrq => Packet::Request(Request::parse(RequestKind::Read, body)?),
            Opcode::Wrq => Packet::Request(Request::parse(RequestKind::Write, body)?),
            Opcode::Data => Packet::Data(Data::from_bytes(body)?),
            Opcode::Ack => Packet::Ack(Ack::from_bytes(body)?),
            Opcode::Error => Packet::Error(Error::from_bytes(body)?),
        })
    }
}

impl IntoBytes for Packet {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.opcode().into_bytes();
        let mut body = match self {
            Packet::Request(rq) => rq.into_bytes(),
            Packet::Data(data) => data.into_bytes(),
            Packet::Ack(ack) => ack.into_bytes(),
            Packet::Error(err) => err.into_bytes(),
        };
        bytes.append(&mut body);
        bytes
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Request(rq) => write!(
                f,
                "{} {:?} ({})",
                rq.kind.opcode(),
                rq.filename,
                rq.mode
            ),
            Packet::Data(data) => write!(f, "DATA {} ({} bytes)", data.block, data.data.len()),
            Packet::Ack(ack) => write!(f, "ACK {}", ack.block),
            Packet::Error(err) => write!(f, "ERROR {}: {}", err.code, err.message),
        }
    }
}
