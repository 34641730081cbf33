use std::mem::size_of;

use super::{Block, MalformedPacket, MAX_PAYLOAD_SIZE};
use crate::bytes::{FromBytes, IntoBytes};

/// One block of file contents. A payload shorter than [`MAX_PAYLOAD_SIZE`]
/// ends the transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Data {
    pub block: Block,
    pub data: Vec<u8>,
}

impl Data {
    pub fn new<T: AsRef<[u8]>>(block: Block, data: T) -> Self {
        Self {
            block,
            data: data.as_ref().to_vec(),
        }
    }

    /// Whether this is the terminating block of a transfer.
    pub fn is_final(&self) -> bool {
        self.data.len() < MAX_PAYLOAD_SIZE
    }
}

impl FromBytes for Data {
    type Error = MalformedPacket;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, MalformedPacket> {
        let bytes = bytes.as_ref();

        let split_at = size_of::<Block>();
        if split_at > bytes.len() {
            return Err(MalformedPacket::Truncated { len: bytes.len() });
        }

        let (block, data) = bytes.split_at(split_at);
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(MalformedPacket::Oversized { len: data.len() });
        }

        let block = Block::from_bytes(block)?;
        let data = data.to_vec();

        Ok(Self { block, data })
    }
}

impl IntoBytes for Data {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.block.into_bytes();
        bytes.extend_from_slice(&self.data);
        bytes
    }
}
