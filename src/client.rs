//! A client-side connection to a TFTP server. Implementors can use this
//! to build a more fully-featured client application.

use std::io::{self, ErrorKind, Read, Result, Write};
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use crate::error::TransferError;
use crate::packet::{Mode, Packet};
use crate::sequence::BlockCounter;
use crate::transfer::{Session, Summary, Transfer};
use crate::{PortMode, RetransmissionConfig};

/// The initial state for building a `Client`.
pub struct New(());

/// An intermediate state for building a `Client`.
///
/// At this point, the `Builder` has all the information
/// it needs to construct a client.
pub struct ConnectTo {
    server: SocketAddr,
}

/// Builds a `Client`.
pub struct Builder<T> {
    data: T,
    retransmission_config: RetransmissionConfig,
    socket: UdpSocket,
}

/// Represents a single transaction with a TFTP server.
///
/// A `Client` is consumed by the transfer it performs, so its socket (and
/// therefore its transfer ID) is never reused.
pub struct Client {
    server: SocketAddr,
    socket: UdpSocket,
    retransmission_config: RetransmissionConfig,
}

impl Builder<New> {
    /// Opens a `UdpSocket` on an ephemeral port. The port becomes this
    /// client's Transfer ID.
    pub fn new() -> Result<Self> {
        Self::bind((Ipv4Addr::UNSPECIFIED, 0))
    }

    /// Opens the client's socket on a specific local address.
    pub fn bind<A: ToSocketAddrs>(local: A) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;

        Ok(Builder {
            data: New(()),
            retransmission_config: RetransmissionConfig::default(),
            socket,
        })
    }

    /// Stores the address of the server's well-known port.
    pub fn connect_to<A: ToSocketAddrs>(self, server: A) -> Result<Builder<ConnectTo>> {
        let server = server
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no server address"))?;

        Ok(Builder {
            data: ConnectTo { server },
            socket: self.socket,
            retransmission_config: self.retransmission_config,
        })
    }

    /// Targets `host` on the port that `mode` selects.
    pub fn connect_with_mode<H: AsRef<str>>(
        self,
        host: H,
        mode: PortMode,
    ) -> Result<Builder<ConnectTo>> {
        self.connect_to((host.as_ref(), mode.well_known_port()))
    }
}

impl Builder<ConnectTo> {
    /// Constructs the client.
    pub fn build(self) -> Client {
        Client {
            server: self.data.server,
            socket: self.socket,
            retransmission_config: self.retransmission_config,
        }
    }

    /// Creates an instance with a different socket from the original instance.
    pub fn try_clone(&self) -> Result<Self> {
        let new_sock_builder = Builder::bind(SocketAddr::new(self.socket.local_addr()?.ip(), 0))?;
        Ok(Builder {
            data: ConnectTo {
                server: self.data.server,
            },
            retransmission_config: self.retransmission_config,
            socket: new_sock_builder.socket,
        })
    }
}

impl<T> Builder<T> {
    /// Set the future client's retransmission config
    pub fn with_retransmission_config(mut self, retransmission_config: RetransmissionConfig) -> Self {
        self.retransmission_config = retransmission_config;
        self
    }
}

impl Client {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Retrieves a file from the remote server.
    pub fn get<S: AsRef<str>, W: Write>(
        self,
        file: S,
        mode: Mode,
        writer: W,
    ) -> std::result::Result<Summary, TransferError> {
        let rrq = Packet::rrq(file, mode);
        let mut session = Session::requester(self.server, BlockCounter::starting_at(1));

        Transfer::new(self.socket, self.retransmission_config).receive(&mut session, rrq, writer)
    }

    /// Stores a file on the remote server.
    pub fn put<S: AsRef<str>, R: Read>(
        self,
        file: S,
        mode: Mode,
        reader: R,
    ) -> std::result::Result<Summary, TransferError> {
        let wrq = Packet::wrq(file, mode);
        let mut session = Session::requester(self.server, BlockCounter::starting_at(0));

        Transfer::new(self.socket, self.retransmission_config).send(&mut session, Some(wrq), reader)
    }
}
