use std::convert::AsRef;
use std::mem::size_of;

use crate::packet::MalformedPacket;
use crate::util::FirstNul;

pub trait FromBytes: Sized {
    type Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, Self::Error>;
}

pub trait IntoBytes {
    fn into_bytes(self) -> Vec<u8>;
}

/// Wire representation of a primitive: big-endian integers and NUL-terminated
/// text.
pub struct Bytes<T>(T);

impl<T> Bytes<T> {
    pub fn new(val: T) -> Self {
        Self(val)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl FromBytes for Bytes<u16> {
    type Error = MalformedPacket;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, MalformedPacket> {
        let bytes = bytes.as_ref();

        if bytes.len() != size_of::<u16>() {
            return Err(MalformedPacket::Truncated { len: bytes.len() });
        }

        let mut bs = [0u8; size_of::<u16>()];
        bs.copy_from_slice(bytes);

        Ok(Self(u16::from_be_bytes(bs)))
    }
}

impl IntoBytes for Bytes<u16> {
    fn into_bytes(self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }
}

impl FromBytes for Bytes<String> {
    type Error = MalformedPacket;

    /// Reads text up to the first NUL. Anything after the terminator is
    /// ignored; the caller decides whether trailing bytes are legal.
    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, MalformedPacket> {
        let bytes = bytes.as_ref();

        let nul = bytes
            .first_nul_idx()
            .ok_or(MalformedPacket::Unterminated)?;
        let text = std::str::from_utf8(&bytes[..nul]).map_err(|_| MalformedPacket::InvalidText)?;

        Ok(Self(text.to_string()))
    }
}

impl IntoBytes for Bytes<String> {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.0.into_bytes();
        bytes.push(0);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_is_big_endian() {
        assert_eq!(Bytes::new(0x0102u16).into_bytes(), vec![0x01, 0x02]);
        assert_eq!(Bytes::<u16>::from_bytes(&[0xff, 0x00]).unwrap().into_inner(), 0xff00);
        assert!(Bytes::<u16>::from_bytes(&[0x01]).is_err());
    }

    #[test]
    fn test_text_requires_terminator() {
        let s = Bytes::<String>::from_bytes(b"hello\0rest").unwrap();
        assert_eq!(s.into_inner(), "hello");
        assert_eq!(Bytes::new("hi".to_string()).into_bytes(), b"hi\0".to_vec());
        assert!(matches!(
            Bytes::<String>::from_bytes(b"no terminator"),
            Err(MalformedPacket::Unterminated)
        ));
    }
}
