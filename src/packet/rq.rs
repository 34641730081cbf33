//! Read and write requests open a transaction. They are the only packets
//! sent to the responder's well-known port.

use super::{MalformedPacket, Mode, Opcode};
use crate::bytes::{Bytes, FromBytes, IntoBytes};
use crate::util::FirstNul;

/// Which direction a request moves the file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestKind {
    /// The requester retrieves a file (RRQ).
    Read,

    /// The requester stores a file (WRQ).
    Write,
}

impl RequestKind {
    pub fn opcode(self) -> Opcode {
        match self {
            RequestKind::Read => Opcode::Rrq,
            RequestKind::Write => Opcode::Wrq,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub kind: RequestKind,
    pub filename: String,
    pub mode: Mode,
}

impl Request {
    pub fn new<T: AsRef<str>>(kind: RequestKind, filename: T, mode: Mode) -> Self {
        Self {
            kind,
            filename: filename.as_ref().to_string(),
            mode,
        }
    }

    /// Parses the part of a request following its opcode.
    pub(crate) fn parse(kind: RequestKind, bytes: &[u8]) -> Result<Self, MalformedPacket> {
        let first_nul = bytes
            .first_nul_idx()
            .ok_or(MalformedPacket::Unterminated)?;

        /* want to include the nul byte of the filename in its slice */
        let (filename, mode) = bytes.split_at(first_nul + 1);
        let filename = Bytes::<String>::from_bytes(filename)?.into_inner();
        if filename.is_empty() {
            return Err(MalformedPacket::EmptyFilename);
        }
        let mode = Mode::from_bytes(mode)?;

        Ok(Self {
            kind,
            filename,
            mode,
        })
    }
}

impl IntoBytes for Request {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Bytes::new(self.filename).into_bytes();
        bytes.append(&mut self.mode.into_bytes());
        bytes
    }
}
