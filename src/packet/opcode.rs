//! Describes the opcodes defined by RFC 1350.

use std::convert::AsRef;
use std::fmt;

use crate::bytes::{Bytes, FromBytes, IntoBytes};
use crate::packet::MalformedPacket;

/// An integer identifier for the type of TFTP packet. Always the first two
/// bytes of a datagram.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Opcode {
    /// Read request.
    Rrq = 1,

    /// Write request.
    Wrq = 2,

    /// Data.
    Data = 3,

    /// Acknowledges successful receipt of a `Data` packet.
    Ack = 4,

    /// A courtesy packet to indicate the peer has experienced an error
    /// and will not complete the transmission.
    Error = 5,
}

impl Opcode {
    /// Tries to produce an `Opcode` from a `u16`.
    pub fn from_u16(val: u16) -> Result<Self, MalformedPacket> {
        Ok(match val {
            1 => Opcode::Rrq,
            2 => Opcode::Wrq,
            3 => Opcode::Data,
            4 => Opcode::Ack,
            5 => Opcode::Error,
            _ => return Err(MalformedPacket::UnknownOpcode(val)),
        })
    }

    /// Reads the opcode out of the first two bytes of a datagram without
    /// decoding the rest of it.
    pub fn peek(datagram: &[u8]) -> Option<Self> {
        match datagram {
            [hi, lo, ..] => Opcode::from_u16(u16::from_be_bytes([*hi, *lo])).ok(),
            _ => None,
        }
    }
}

impl IntoBytes for Opcode {
    fn into_bytes(self) -> Vec<u8> {
        Bytes::new(self as u16).into_bytes()
    }
}

impl FromBytes for Opcode {
    type Error = MalformedPacket;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, MalformedPacket> {
        let bytes = Bytes::<u16>::from_bytes(bytes)?;
        Opcode::from_u16(bytes.into_inner())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Opcode::Rrq => "RRQ",
            Opcode::Wrq => "WRQ",
            Opcode::Data => "DATA",
            Opcode::Ack => "ACK",
            Opcode::Error => "ERROR",
        };

        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_conversions() {
        assert!(Opcode::from_u16(0).is_err());
        assert_eq!(Opcode::from_u16(1).unwrap(), Opcode::Rrq);
        assert_eq!(Opcode::from_u16(2).unwrap(), Opcode::Wrq);
        assert_eq!(Opcode::from_u16(3).unwrap(), Opcode::Data);
        assert_eq!(Opcode::from_u16(4).unwrap(), Opcode::Ack);
        assert_eq!(Opcode::from_u16(5).unwrap(), Opcode::Error);
        assert!(matches!(
            Opcode::from_u16(6),
            Err(MalformedPacket::UnknownOpcode(6))
        ));

        assert_eq!(Opcode::Ack.into_bytes(), vec![0x00, 0x04]);
        assert_eq!(Opcode::from_bytes(&[0x00, 0x01]).unwrap(), Opcode::Rrq);
    }

    #[test]
    fn test_peek() {
        assert_eq!(Opcode::peek(&[0, 3, 0, 1, 0xaa]), Some(Opcode::Data));
        assert_eq!(Opcode::peek(&[0, 9]), None);
        assert_eq!(Opcode::peek(&[0]), None);
    }
}
