//! Abort reasons for a transaction.

use std::io;
use std::net::SocketAddr;

use crate::packet::{self, ErrorCode, MalformedPacket, Opcode};

/// Why a transaction ended without reaching `Done`.
///
/// Each variant is a distinct abort reason; none of them is swallowed.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// A datagram could not be decoded. The peer was sent an
    /// ILLEGAL_OPERATION error.
    #[error("malformed packet: {0}")]
    Malformed(#[from] MalformedPacket),

    /// A well formed packet arrived that makes no sense in the current state.
    #[error("protocol violation: expected {expected}, got {got}")]
    ProtocolViolation { expected: Opcode, got: Opcode },

    /// A block number that is neither the expected one nor its immediate
    /// predecessor.
    #[error("block number not in sequence: expected {expected}, got {got}")]
    SequenceError { expected: u16, got: u16 },

    /// The peer sent an `Error` packet.
    #[error("remote error {code}: {message}")]
    RemoteError { code: ErrorCode, message: String },

    /// Reading or writing the local byte stream failed.
    #[error("local I/O error: {0}")]
    LocalIo(#[source] io::Error),

    /// The outstanding packet was sent the maximum number of times without a
    /// reply.
    #[error("no response after {attempts} attempts")]
    TimeoutExhausted { attempts: usize },

    /// The datagram socket itself failed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl TransferError {
    /// The code used to notify the peer of this abort, if the peer is to be
    /// notified at all.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            TransferError::Malformed(_)
            | TransferError::ProtocolViolation { .. }
            | TransferError::SequenceError { .. } => Some(ErrorCode::IllegalOperation),
            TransferError::LocalIo(err) => Some(local_io_code(err)),
            TransferError::RemoteError { .. }
            | TransferError::TimeoutExhausted { .. }
            | TransferError::Transport(_) => None,
        }
    }
}

impl From<packet::Error> for TransferError {
    fn from(err: packet::Error) -> Self {
        TransferError::RemoteError {
            code: err.code,
            message: err.message,
        }
    }
}

/// Maps a failure of the local byte stream onto the error code the peer
/// should see.
fn local_io_code(err: &io::Error) -> ErrorCode {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorCode::FileNotFound,
        io::ErrorKind::PermissionDenied => ErrorCode::AccessViolation,
        io::ErrorKind::AlreadyExists => ErrorCode::FileAlreadyExists,
        io::ErrorKind::WriteZero | io::ErrorKind::StorageFull => ErrorCode::DiskFull,
        _ => ErrorCode::NotDefined,
    }
}

/// A datagram arrived from somewhere other than the pinned peer.
///
/// Not fatal: the sender is told UNKNOWN_TID and the transaction keeps
/// waiting for its peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("datagram from {from} does not belong to transfer with {peer}")]
pub struct UnknownPeer {
    pub from: SocketAddr,
    pub peer: SocketAddr,
}
