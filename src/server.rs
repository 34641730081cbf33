use std::fs::{self, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Result};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::{Component, Path, PathBuf};
use std::thread;

use tracing::{info, warn};

use crate::error::TransferError;
use crate::packet::{Block, ErrorCode, Packet, Request, RequestKind};
use crate::sequence::BlockCounter;
use crate::transfer::{Session, Summary, Transfer, MAX_DATAGRAM_SIZE};
use crate::transport::Endpoint;
use crate::RetransmissionConfig;

/// Listens for requests on a well-known port and hands each one to a
/// [`Handler`] with its own endpoint.
pub struct Server {
    socket: UdpSocket,
    directory: PathBuf,
    retransmission_config: RetransmissionConfig,
}

impl Server {
    pub fn bind<A: ToSocketAddrs, P: AsRef<Path>>(bind_to: A, serve_from: P) -> Result<Self> {
        let socket = UdpSocket::bind(bind_to)?;
        let directory = serve_from.as_ref().to_path_buf();
        if !directory.is_dir() {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("{} is not a directory", directory.display()),
            ));
        }

        Ok(Self {
            socket,
            directory,
            retransmission_config: RetransmissionConfig::default(),
        })
    }

    pub fn with_retransmission_config(mut self, retransmission_config: RetransmissionConfig) -> Self {
        self.retransmission_config = retransmission_config;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Blocks until a request arrives and prepares a handler for it.
    ///
    /// Anything other than a read or write request is answered with an
    /// ILLEGAL_OPERATION error and reported as `InvalidInput`.
    pub fn serve(&self) -> Result<Handler> {
        let mut buf = vec![0; MAX_DATAGRAM_SIZE];
        self.socket.set_read_timeout(None)?;
        let (nbytes, src_addr) = self.socket.recv_from(&mut buf)?;

        let request = match Packet::decode(&buf[..nbytes]) {
            Ok(Packet::Request(request)) => request,
            Ok(other) => {
                self.reject(src_addr, format!("expected a request, got {}", other.opcode()));
                return Err(ErrorKind::InvalidInput.into());
            }
            Err(malformed) => {
                self.reject(src_addr, malformed.to_string());
                return Err(ErrorKind::InvalidInput.into());
            }
        };

        info!(client = %src_addr, file = %request.filename, kind = ?request.kind, "accepted request");

        let bind_to = SocketAddr::new(self.local_addr()?.ip(), 0);
        Handler::new(
            bind_to,
            src_addr,
            request,
            self.directory.clone(),
            self.retransmission_config,
        )
    }

    /// Serves requests forever, one thread per transaction.
    pub fn run(&self) -> Result<()> {
        loop {
            let handler = match self.serve() {
                Ok(handler) => handler,
                Err(err) if err.kind() == ErrorKind::InvalidInput => continue,
                Err(err) => return Err(err),
            };

            thread::spawn(move || {
                let client = handler.client();
                match handler.handle() {
                    Ok(summary) => info!(%client, bytes = summary.bytes, "request served"),
                    Err(err) => warn!(%client, error = %err, "request failed"),
                }
            });
        }
    }

    fn reject(&self, dest: SocketAddr, message: String) {
        warn!(%dest, %message, "rejecting datagram on request port");
        let bytes = Packet::error(ErrorCode::IllegalOperation, message).encode();
        let _ = Endpoint::send_to(&self.socket, &bytes, dest);
    }
}

/// Answers one request from its own ephemeral endpoint.
pub struct Handler {
    transfer: Transfer<UdpSocket>,
    client: SocketAddr,
    request: Request,
    directory: PathBuf,
}

impl Handler {
    fn new(
        bind: SocketAddr,
        client: SocketAddr,
        request: Request,
        directory: PathBuf,
        retransmission_config: RetransmissionConfig,
    ) -> Result<Handler> {
        let socket = UdpSocket::bind(bind)?;

        Ok(Handler {
            transfer: Transfer::new(socket, retransmission_config),
            client,
            request,
            directory,
        })
    }

    pub fn client(&self) -> SocketAddr {
        self.client
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn handle(self) -> std::result::Result<Summary, TransferError> {
        match self.request.kind {
            RequestKind::Read => self.get(),
            RequestKind::Write => self.put(),
        }
    }

    /// Sends a local file to the client.
    fn get(self) -> std::result::Result<Summary, TransferError> {
        let file = self
            .resolve()
            .and_then(|path| OpenOptions::new().read(true).open(path));
        let file = match file {
            Ok(file) => file,
            Err(err) => return Err(self.refuse(err)),
        };

        let mut session = Session::responder(self.client, BlockCounter::starting_at(0));
        self.transfer
            .send(&mut session, None, BufReader::new(file))
    }

    /// Stores the client's file locally. An existing file is never
    /// overwritten, and a partial file is removed if the transfer fails.
    fn put(self) -> std::result::Result<Summary, TransferError> {
        let opened = self.resolve().and_then(|path| {
            let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
            Ok((path, file))
        });
        let (path, file) = match opened {
            Ok(opened) => opened,
            Err(err) => return Err(self.refuse(err)),
        };

        let mut session = Session::responder(self.client, BlockCounter::starting_at(1));
        let result = self.transfer.receive(
            &mut session,
            Packet::ack(Block::new(0)),
            BufWriter::new(file),
        );
        if result.is_err() {
            let _ = fs::remove_file(&path);
        }
        result
    }

    /// Maps the requested name into the served directory. Names that would
    /// escape it are an access violation.
    fn resolve(&self) -> Result<PathBuf> {
        let requested = Path::new(&self.request.filename);
        let contained = requested
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !contained {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                format!("{} is outside the served directory", self.request.filename),
            ));
        }

        Ok(self.directory.join(requested))
    }

    /// Turns the request down before any data moves.
    fn refuse(&self, err: io::Error) -> TransferError {
        warn!(client = %self.client, file = %self.request.filename, error = %err, "refusing request");
        let message = err.to_string();
        let err = TransferError::LocalIo(err);
        if let Some(code) = err.code() {
            self.transfer.notify(self.client, code, message);
        }
        err
    }
}
