use std::mem::size_of;

use super::{Block, MalformedPacket};
use crate::bytes::{FromBytes, IntoBytes};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ack {
    pub block: Block,
}

impl FromBytes for Ack {
    type Error = MalformedPacket;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, MalformedPacket> {
        let bytes = bytes.as_ref();

        let split_at = size_of::<Block>();
        if bytes.len() < split_at {
            return Err(MalformedPacket::Truncated { len: bytes.len() });
        }
        if bytes.len() > split_at {
            return Err(MalformedPacket::TrailingBytes {
                len: bytes.len() - split_at,
            });
        }

        let block = Block::from_bytes(bytes)?;

        Ok(Self { block })
    }
}

impl IntoBytes for Ack {
    fn into_bytes(self) -> Vec<u8> {
        self.block.into_bytes()
    }
}
