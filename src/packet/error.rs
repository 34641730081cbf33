use std::fmt;
use std::mem::size_of;

use super::MalformedPacket;
use crate::bytes::{Bytes, FromBytes, IntoBytes};

/// `ErrorCode` represents the error conditions that can be reached during
/// a regular TFTP operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Not defined, see error message (if any).
    NotDefined,

    /// File not found.
    FileNotFound,

    /// Access violation.
    AccessViolation,

    /// Disk full or allocation exceeded.
    DiskFull,

    /// Illegal TFTP operation.
    IllegalOperation,

    /// Unknown transfer ID.
    UnknownTid,

    /// File already exists.
    FileAlreadyExists,

    /// No such user.
    NoSuchUser,

    /// A code outside the standard set, kept as received.
    Other(u16),
}

impl ErrorCode {
    /// Every 16-bit value is a valid code on the wire.
    pub fn from_u16(val: u16) -> Self {
        match val {
            0 => ErrorCode::NotDefined,
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTid,
            6 => ErrorCode::FileAlreadyExists,
            7 => ErrorCode::NoSuchUser,
            other => ErrorCode::Other(other),
        }
    }

    /// The default human readable message for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotDefined => "Not defined",
            ErrorCode::FileNotFound => "File not found",
            ErrorCode::AccessViolation => "Access violation",
            ErrorCode::DiskFull => "Disk full or allocation exceeded",
            ErrorCode::IllegalOperation => "Illegal TFTP operation",
            ErrorCode::UnknownTid => "Unknown transfer ID",
            ErrorCode::FileAlreadyExists => "File already exists",
            ErrorCode::NoSuchUser => "No such user",
            ErrorCode::Other(_) => "Unknown error",
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        match code {
            ErrorCode::NotDefined => 0,
            ErrorCode::FileNotFound => 1,
            ErrorCode::AccessViolation => 2,
            ErrorCode::DiskFull => 3,
            ErrorCode::IllegalOperation => 4,
            ErrorCode::UnknownTid => 5,
            ErrorCode::FileAlreadyExists => 6,
            ErrorCode::NoSuchUser => 7,
            ErrorCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), u16::from(*self))
    }
}

/// An `Error` packet is a courtesy packet that is sent prior to terminating
/// the TFTP connection due to an unrecoverable error. It is never
/// acknowledged or retransmitted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    /// An integer code that describes the error.
    pub code: ErrorCode,

    /// A human readable description of the error.
    pub message: String,
}

impl FromBytes for Error {
    type Error = MalformedPacket;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, MalformedPacket> {
        let bytes = bytes.as_ref();

        let split_at = size_of::<u16>();
        if bytes.len() < split_at {
            return Err(MalformedPacket::Truncated { len: bytes.len() });
        }

        let (code, message) = bytes.split_at(split_at);
        let code = ErrorCode::from_u16(Bytes::<u16>::from_bytes(code)?.into_inner());
        let message = Bytes::<String>::from_bytes(message)?.into_inner();

        Ok(Self { code, message })
    }
}

impl IntoBytes for Error {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Bytes::new(u16::from(self.code)).into_bytes();
        bytes.append(&mut Bytes::new(self.message).into_bytes());
        bytes
    }
}
