//! Transfer modes named in a request.
//!
//! The mode is carried through a transfer untouched: payload bytes are never
//! translated, whatever the mode says.

use std::fmt;
use std::str::FromStr;

use crate::bytes::{Bytes, FromBytes, IntoBytes};
use crate::packet::MalformedPacket;

/// The modes of operation for TFTP. Always transmitted in lowercase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Deprecated.
    Mail,

    /// 8-bit ASCII.
    NetAscii,

    /// 8-bit binary.
    Octet,
}

impl Mode {
    /// The lowercase wire spelling of this `Mode`.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Mail => "mail",
            Mode::NetAscii => "netascii",
            Mode::Octet => "octet",
        }
    }
}

impl IntoBytes for Mode {
    fn into_bytes(self) -> Vec<u8> {
        Bytes::new(self.as_str().to_string()).into_bytes()
    }
}

impl FromBytes for Mode {
    type Error = MalformedPacket;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, MalformedPacket> {
        let s = Bytes::<String>::from_bytes(bytes)?.into_inner();

        Mode::from_str(&s)
    }
}

impl FromStr for Mode {
    type Err = MalformedPacket;

    fn from_str(s: &str) -> Result<Self, MalformedPacket> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "mail" => Mode::Mail,
            "netascii" => Mode::NetAscii,
            "octet" => Mode::Octet,
            _ => return Err(MalformedPacket::UnknownMode(s.to_string())),
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_any_case() {
        for (text, mode) in [
            ("mail", Mode::Mail),
            ("NetAscii", Mode::NetAscii),
            ("OCTET", Mode::Octet),
        ] {
            assert_eq!(text.parse::<Mode>().unwrap(), mode);
        }

        assert_eq!(Mode::from_bytes(b"octet\0").unwrap(), Mode::Octet);
        assert!(matches!(
            "binary".parse::<Mode>(),
            Err(MalformedPacket::UnknownMode(name)) if name == "binary"
        ));
        assert!(matches!(
            Mode::from_bytes(b"octet"),
            Err(MalformedPacket::Unterminated)
        ));
    }

    #[test]
    fn test_mode_is_sent_lowercase() {
        let mode = Mode::from_str("OCTET").unwrap();
        assert_eq!(mode.into_bytes(), b"octet\0".to_vec());
        assert_eq!(Mode::NetAscii.to_string(), "netascii");
    }
}
