//! The stop-and-wait transfer engine.
//!
//! A [`Transfer`] drives one read or write transaction over an [`Endpoint`]
//! with exactly one unacknowledged unit in flight. All of the transaction's
//! mutable state lives in a [`Session`] that the caller owns and threads
//! through each step, so nothing is shared between transactions.
//!
//! The same two loops serve both ends of the protocol: a requester opens with
//! a request packet and learns its peer from the first reply, a responder
//! opens with its first reply and already knows its peer.

use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::{TransferError, UnknownPeer};
use crate::packet::{ErrorCode, Opcode, Packet, MAX_PAYLOAD_SIZE};
use crate::sequence::{to_wire, BlockCounter, Sequence};
use crate::transport::Endpoint;
use crate::RetransmissionConfig;

/// Largest datagram a receive can hold. Anything bigger than a legal packet
/// still fits, so it can be recognised as oversized rather than truncated.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Where a transaction is in its lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Init,
    AwaitFirstResponse,
    SteadyState,
    Done,
    Aborted,
}

/// What a finished transaction did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    /// Data blocks accepted or sent, including a zero-length final block.
    pub blocks: u64,

    /// Payload bytes accepted or sent.
    pub bytes: u64,

    /// Packets sent again because a receive timed out.
    pub retransmissions: usize,

    /// Duplicate DATA or ACK packets that were absorbed.
    pub duplicates: usize,
}

impl Summary {
    fn record_block(&mut self, len: usize) {
        self.blocks += 1;
        self.bytes += len as u64;
    }
}

/// The state of one transaction.
#[derive(Debug)]
pub struct Session {
    /// Where the opening packet goes: a responder's well-known port, or the
    /// requester a responder is answering.
    origin: SocketAddr,

    /// The transfer ID of the other end, once known.
    peer: Option<SocketAddr>,

    counter: BlockCounter,

    /// Timeouts suffered by the packet currently outstanding.
    retries: usize,

    state: State,
    summary: Summary,
}

impl Session {
    /// A session that has not heard from its peer yet. Its first valid reply
    /// pins the peer.
    pub fn requester(server: SocketAddr, counter: BlockCounter) -> Self {
        Self {
            origin: server,
            peer: None,
            counter,
            retries: 0,
            state: State::Init,
            summary: Summary::default(),
        }
    }

    /// A session answering a request from `client`, which is pinned from the
    /// start.
    pub fn responder(client: SocketAddr, counter: BlockCounter) -> Self {
        Self {
            peer: Some(client),
            ..Self::requester(client, counter)
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn counter(&self) -> &BlockCounter {
        &self.counter
    }

    fn destination(&self) -> SocketAddr {
        self.peer.unwrap_or(self.origin)
    }

    /// Rejects datagrams that do not come from the pinned peer.
    fn check_peer(&self, from: SocketAddr) -> Result<(), UnknownPeer> {
        match self.peer {
            Some(peer) if peer != from => Err(UnknownPeer { from, peer }),
            _ => Ok(()),
        }
    }

    fn pin(&mut self, from: SocketAddr) {
        if self.peer.is_none() {
            debug!(peer = %from, "pinned transfer peer");
            self.peer = Some(from);
        }
    }

    fn transition(&mut self, next: State) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }

    fn abort(&mut self, err: TransferError) -> TransferError {
        error!(error = %err, block = self.counter.expected(), "transfer aborted");
        self.transition(State::Aborted);
        err
    }

    fn finish(&mut self) -> Summary {
        self.transition(State::Done);
        info!(
            blocks = self.summary.blocks,
            bytes = self.summary.bytes,
            retransmissions = self.summary.retransmissions,
            duplicates = self.summary.duplicates,
            "transfer complete"
        );
        self.summary
    }
}

/// Drives transactions over one endpoint.
pub struct Transfer<E> {
    endpoint: E,
    config: RetransmissionConfig,
}

impl<E: Endpoint> Transfer<E> {
    pub fn new(endpoint: E, config: RetransmissionConfig) -> Self {
        Self { endpoint, config }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn into_inner(self) -> E {
        self.endpoint
    }

    /// Receives a file into `writer`.
    ///
    /// `opening` is sent first and repeated until the first DATA block
    /// arrives: a read request for a requester, ACK 0 for a responder
    /// accepting a write request. The session's counter names the first
    /// block expected.
    #[tracing::instrument(name = "receive", skip_all, fields(origin = %session.origin))]
    pub fn receive<W: Write>(
        &self,
        session: &mut Session,
        opening: Packet,
        mut writer: W,
    ) -> Result<Summary, TransferError> {
        let mut buf = vec![0; MAX_DATAGRAM_SIZE];

        let mut outstanding = opening.encode();
        self.transmit(session, &outstanding)?;
        session.transition(match session.peer {
            Some(_) => State::SteadyState,
            None => State::AwaitFirstResponse,
        });

        loop {
            let packet = self.await_reply(session, &outstanding, &mut buf)?;
            let data = match packet {
                Packet::Data(data) => data,
                other => return Err(self.violation(session, Opcode::Data, other.opcode())),
            };
            session.transition(State::SteadyState);

            match session.counter.classify(data.block) {
                Sequence::Expected(logical) => {
                    let stored = writer.write_all(&data.data).and_then(|()| {
                        if data.is_final() {
                            writer.flush()
                        } else {
                            Ok(())
                        }
                    });
                    if let Err(err) = stored {
                        // Whatever the writer reports, the peer sees DISK_FULL.
                        self.notify(session.destination(), ErrorCode::DiskFull, err.to_string());
                        return Err(session.abort(TransferError::LocalIo(err)));
                    }

                    debug!(block = logical, len = data.data.len(), "accepted block");
                    outstanding = Packet::ack(data.block).encode();
                    self.transmit(session, &outstanding)?;
                    session.counter.advance();
                    session.summary.record_block(data.data.len());

                    if data.is_final() {
                        return Ok(session.finish());
                    }
                }
                Sequence::Duplicate(logical) => {
                    // The sender missed our ACK; repeat it without storing
                    // the payload again.
                    debug!(block = logical, "duplicate block, re-acknowledging");
                    session.summary.duplicates += 1;
                    self.put_on_wire(session, &outstanding)?;
                }
                Sequence::OutOfSequence => {
                    return Err(self.out_of_sequence(session, data.block.value()));
                }
            }
        }
    }

    /// Sends the contents of `reader`.
    ///
    /// A requester passes its write request as `opening` and waits for ACK 0
    /// before the first block. A responder answering a read request passes
    /// `None` and starts with block 1 straight away. Either way the session's
    /// counter names the ACK awaited first (0).
    #[tracing::instrument(name = "send", skip_all, fields(origin = %session.origin))]
    pub fn send<R: Read>(
        &self,
        session: &mut Session,
        opening: Option<Packet>,
        mut reader: R,
    ) -> Result<Summary, TransferError> {
        let mut buf = vec![0; MAX_DATAGRAM_SIZE];
        let mut finished = false;

        let mut outstanding = match opening {
            Some(request) => {
                let bytes = request.encode();
                self.transmit(session, &bytes)?;
                session.transition(State::AwaitFirstResponse);
                bytes
            }
            None => {
                session.transition(State::SteadyState);
                let (bytes, last) = self.send_next_block(session, &mut reader)?;
                finished = last;
                bytes
            }
        };

        loop {
            let packet = self.await_reply(session, &outstanding, &mut buf)?;
            let ack = match packet {
                Packet::Ack(ack) => ack,
                other => return Err(self.violation(session, Opcode::Ack, other.opcode())),
            };
            session.transition(State::SteadyState);

            match session.counter.classify(ack.block) {
                Sequence::Expected(logical) => {
                    debug!(block = logical, "block acknowledged");
                    if finished {
                        return Ok(session.finish());
                    }

                    let (bytes, last) = self.send_next_block(session, &mut reader)?;
                    outstanding = bytes;
                    finished = last;
                }
                Sequence::Duplicate(logical) => {
                    // The block after it is already in flight; resending it
                    // here would start the sorcerer's apprentice cascade.
                    debug!(block = logical, "ignoring duplicate ack");
                    session.summary.duplicates += 1;
                }
                Sequence::OutOfSequence => {
                    return Err(self.out_of_sequence(session, ack.block.value()));
                }
            }
        }
    }

    /// Best-effort courtesy ERROR packet. Never retransmitted.
    pub fn notify<S: Into<String>>(&self, dest: SocketAddr, code: ErrorCode, message: S) {
        let packet = Packet::error(code, message);
        debug!(%dest, %packet, "sending error");
        if let Err(err) = self.endpoint.send_to(&packet.encode(), dest) {
            warn!(%dest, error = %err, "failed to send error packet");
        }
    }

    /// Reads the next chunk, sends it as the next block and makes it the
    /// outstanding packet. Returns the encoded packet and whether it was the
    /// final block.
    fn send_next_block<R: Read>(
        &self,
        session: &mut Session,
        reader: &mut R,
    ) -> Result<(Vec<u8>, bool), TransferError> {
        let mut chunk = [0; MAX_PAYLOAD_SIZE];
        let len = match fill_block(reader, &mut chunk) {
            Ok(len) => len,
            Err(err) => {
                let message = err.to_string();
                let dest = session.destination();
                return Err(self.fail(session, dest, TransferError::LocalIo(err), message));
            }
        };

        let logical = session.counter.expected() + 1;
        let bytes = Packet::data(to_wire(logical), &chunk[..len]).encode();
        debug!(block = logical, len, "sending block");
        self.transmit(session, &bytes)?;
        session.counter.advance();
        session.summary.record_block(len);

        Ok((bytes, len < MAX_PAYLOAD_SIZE))
    }

    /// Waits for the next packet from the peer, retransmitting `outstanding`
    /// each time the receive times out.
    ///
    /// Datagrams from strangers are answered with UNKNOWN_TID and otherwise
    /// ignored; they do not extend the deadline. An ERROR packet from the
    /// peer ends the transaction without a reply.
    fn await_reply(
        &self,
        session: &mut Session,
        outstanding: &[u8],
        buf: &mut [u8],
    ) -> Result<Packet, TransferError> {
        let mut deadline = Instant::now() + self.config.timeout();

        loop {
            let received = match self.endpoint.recv_until(buf, deadline) {
                Ok(received) => received,
                Err(err) => return Err(session.abort(TransferError::Transport(err))),
            };

            let (len, from) = match received {
                Some(received) => received,
                None => {
                    session.retries += 1;
                    if session.retries > self.config.max_retransmissions() {
                        return Err(session.abort(TransferError::TimeoutExhausted {
                            attempts: session.retries,
                        }));
                    }

                    warn!(attempt = session.retries, "timed out, retransmitting");
                    self.put_on_wire(session, outstanding)?;
                    session.summary.retransmissions += 1;
                    deadline = Instant::now() + self.config.timeout();
                    continue;
                }
            };

            if let Err(stranger) = session.check_peer(from) {
                warn!(%stranger, "rejecting datagram from unknown peer");
                self.notify(from, ErrorCode::UnknownTid, stranger.to_string());
                continue;
            }

            let packet = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(malformed) => {
                    let message = malformed.to_string();
                    return Err(self.fail(session, from, malformed.into(), message));
                }
            };
            debug!(%from, %packet, "received");

            if let Packet::Error(err) = packet {
                return Err(session.abort(err.into()));
            }

            session.pin(from);
            return Ok(packet);
        }
    }

    /// Tells `dest` why the transaction is ending, using the code the abort
    /// reason maps to, then aborts the session.
    fn fail<S: Into<String>>(
        &self,
        session: &mut Session,
        dest: SocketAddr,
        err: TransferError,
        message: S,
    ) -> TransferError {
        if let Some(code) = err.code() {
            self.notify(dest, code, message);
        }
        session.abort(err)
    }

    fn violation(&self, session: &mut Session, expected: Opcode, got: Opcode) -> TransferError {
        let dest = session.destination();
        self.fail(
            session,
            dest,
            TransferError::ProtocolViolation { expected, got },
            format!("expected {}, got {}", expected, got),
        )
    }

    fn out_of_sequence(&self, session: &mut Session, got: u16) -> TransferError {
        let dest = session.destination();
        let err = TransferError::SequenceError {
            expected: session.counter.wire().value(),
            got,
        };
        self.fail(session, dest, err, "block number not in sequence")
    }

    /// Sends a new outstanding packet.
    fn transmit(&self, session: &mut Session, bytes: &[u8]) -> Result<(), TransferError> {
        session.retries = 0;
        self.put_on_wire(session, bytes)
    }

    fn put_on_wire(&self, session: &mut Session, bytes: &[u8]) -> Result<(), TransferError> {
        let dest = session.destination();
        self.endpoint
            .send_to(bytes, dest)
            .map_err(|err| session.abort(TransferError::Transport(err)))
    }
}

/// Reads until `chunk` is full or the reader is exhausted, so that a short
/// read never ends a transfer early.
fn fill_block<R: Read>(reader: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < chunk.len() {
        match reader.read(&mut chunk[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::bytes::FromBytes;
    use crate::packet::{Block, Mode};

    const TIMEOUT: Duration = Duration::from_millis(300);
    const MAX_RETRANSMISSIONS: usize = 2;

    fn config() -> RetransmissionConfig {
        RetransmissionConfig::new(TIMEOUT, MAX_RETRANSMISSIONS)
    }

    fn loopback() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").unwrap()
    }

    /// A scripted responder: a socket the test drives by hand.
    struct Peer {
        socket: UdpSocket,
    }

    impl Peer {
        fn new() -> Self {
            let socket = loopback();
            socket
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            Self { socket }
        }

        fn addr(&self) -> SocketAddr {
            self.socket.local_addr().unwrap()
        }

        fn recv(&self) -> (Packet, SocketAddr) {
            let mut buf = [0; MAX_DATAGRAM_SIZE];
            let (n, from) = self.socket.recv_from(&mut buf).unwrap();
            (Packet::from_bytes(&buf[..n]).unwrap(), from)
        }

        fn send(&self, packet: Packet, to: SocketAddr) {
            self.socket.send_to(&packet.encode(), to).unwrap();
        }

        fn assert_silent(&self, wait: Duration) {
            self.socket.set_read_timeout(Some(wait)).unwrap();
            let mut buf = [0; MAX_DATAGRAM_SIZE];
            assert!(self.socket.recv_from(&mut buf).is_err());
            self.socket
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
        }
    }

    fn spawn_read(
        server: SocketAddr,
        counter: BlockCounter,
    ) -> thread::JoinHandle<(Result<Summary, TransferError>, Vec<u8>, State)> {
        thread::spawn(move || {
            let transfer = Transfer::new(loopback(), config());
            let mut session = Session::requester(server, counter);
            let mut out = Vec::new();
            let result = transfer.receive(&mut session, Packet::rrq("f", Mode::Octet), &mut out);
            (result, out, session.state())
        })
    }

    fn spawn_write(
        server: SocketAddr,
        contents: Vec<u8>,
    ) -> thread::JoinHandle<(Result<Summary, TransferError>, State)> {
        thread::spawn(move || {
            let transfer = Transfer::new(loopback(), config());
            let mut session = Session::requester(server, BlockCounter::starting_at(0));
            let result = transfer.send(
                &mut session,
                Some(Packet::wrq("f", Mode::Octet)),
                &contents[..],
            );
            (result, session.state())
        })
    }

    #[test]
    fn test_read_acks_and_completes() {
        let peer = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::starting_at(1));

        let (rrq, client_addr) = peer.recv();
        assert_eq!(rrq, Packet::rrq("f", Mode::Octet));

        peer.send(Packet::data(Block(1), [b'a'; MAX_PAYLOAD_SIZE]), client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(1)));
        peer.send(Packet::data(Block(2), b"bc"), client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(2)));

        let (result, out, state) = client.join().unwrap();
        let summary = result.unwrap();
        assert_eq!(state, State::Done);
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.bytes, 514);
        let mut expected = vec![b'a'; MAX_PAYLOAD_SIZE];
        expected.extend_from_slice(b"bc");
        assert_eq!(out, expected);
    }

    #[test]
    fn test_read_suppresses_duplicate_block() {
        let peer = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::starting_at(1));
        let (_, client_addr) = peer.recv();

        let block = Packet::data(Block(1), [b'x'; MAX_PAYLOAD_SIZE]);
        peer.send(block.clone(), client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(1)));

        // Pretend the ACK was lost and replay the block.
        peer.send(block, client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(1)));

        peer.send(Packet::data(Block(2), b""), client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(2)));

        let (result, out, _) = client.join().unwrap();
        let summary = result.unwrap();
        assert_eq!(summary.duplicates, 1);
        assert_eq!(out, vec![b'x'; MAX_PAYLOAD_SIZE]);
    }

    #[test]
    fn test_read_rejects_block_ahead() {
        let peer = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::starting_at(1));
        let (_, client_addr) = peer.recv();

        peer.send(Packet::data(Block(1), [0; MAX_PAYLOAD_SIZE]), client_addr);
        peer.recv();
        peer.send(Packet::data(Block(3), b"skip"), client_addr);

        match peer.recv().0 {
            Packet::Error(err) => {
                assert_eq!(err.code, ErrorCode::IllegalOperation);
                assert_eq!(err.message, "block number not in sequence");
            }
            other => panic!("expected an error packet, got {}", other),
        }

        let (result, _, state) = client.join().unwrap();
        assert!(matches!(
            result,
            Err(TransferError::SequenceError {
                expected: 2,
                got: 3
            })
        ));
        assert_eq!(state, State::Aborted);
    }

    #[test]
    fn test_read_rejects_unknown_peer() {
        let peer = Peer::new();
        let stranger = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::starting_at(1));
        let (_, client_addr) = peer.recv();

        peer.send(Packet::data(Block(1), [1; MAX_PAYLOAD_SIZE]), client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(1)));

        stranger.send(Packet::data(Block(2), b"evil"), client_addr);
        match stranger.recv().0 {
            Packet::Error(err) => assert_eq!(err.code, ErrorCode::UnknownTid),
            other => panic!("expected an error packet, got {}", other),
        }

        peer.send(Packet::data(Block(2), b"good"), client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(2)));

        let (result, out, _) = client.join().unwrap();
        result.unwrap();
        assert_eq!(&out[MAX_PAYLOAD_SIZE..], b"good");
    }

    #[test]
    fn test_read_wraps_block_numbers() {
        let peer = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::resume_at(1, 65535));
        let (_, client_addr) = peer.recv();

        peer.send(Packet::data(Block(65535), [7; MAX_PAYLOAD_SIZE]), client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(65535)));
        peer.send(Packet::data(Block(0), [8; MAX_PAYLOAD_SIZE]), client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(0)));
        peer.send(Packet::data(Block(1), b"end"), client_addr);
        assert_eq!(peer.recv().0, Packet::ack(Block(1)));

        let (result, out, _) = client.join().unwrap();
        assert_eq!(result.unwrap().blocks, 3);
        assert_eq!(out.len(), 2 * MAX_PAYLOAD_SIZE + 3);
    }

    #[test]
    fn test_read_retransmits_request_then_gives_up() {
        let peer = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::starting_at(1));

        for _ in 0..=MAX_RETRANSMISSIONS {
            assert_eq!(peer.recv().0, Packet::rrq("f", Mode::Octet));
        }

        let (result, _, state) = client.join().unwrap();
        assert!(matches!(
            result,
            Err(TransferError::TimeoutExhausted { attempts: 3 })
        ));
        assert_eq!(state, State::Aborted);
        // Giving up is silent.
        peer.assert_silent(Duration::from_millis(100));
    }

    #[test]
    fn test_read_remote_error_aborts_quietly() {
        let peer = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::starting_at(1));
        let (_, client_addr) = peer.recv();

        peer.send(
            Packet::error(ErrorCode::FileNotFound, "no such file"),
            client_addr,
        );

        let (result, _, _) = client.join().unwrap();
        match result {
            Err(TransferError::RemoteError { code, message }) => {
                assert_eq!(code, ErrorCode::FileNotFound);
                assert_eq!(message, "no such file");
            }
            other => panic!("unexpected result {:?}", other),
        }
        peer.assert_silent(Duration::from_millis(100));
    }

    #[test]
    fn test_read_remote_error_with_unlisted_code() {
        let peer = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::starting_at(1));
        let (_, client_addr) = peer.recv();

        peer.socket
            .send_to(b"\x00\x05\x00\x08msg\x00", client_addr)
            .unwrap();

        let (result, _, state) = client.join().unwrap();
        match result {
            Err(TransferError::RemoteError { code, message }) => {
                assert_eq!(code, ErrorCode::Other(8));
                assert_eq!(message, "msg");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(state, State::Aborted);
        peer.assert_silent(Duration::from_millis(100));
    }

    #[test]
    fn test_read_malformed_packet_is_illegal() {
        let peer = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::starting_at(1));
        let (_, client_addr) = peer.recv();

        peer.socket
            .send_to(b"this is an invalid packet. hopefully.", client_addr)
            .unwrap();

        match peer.recv().0 {
            Packet::Error(err) => assert_eq!(err.code, ErrorCode::IllegalOperation),
            other => panic!("expected an error packet, got {}", other),
        }
        let (result, _, _) = client.join().unwrap();
        assert!(matches!(result, Err(TransferError::Malformed(_))));
    }

    #[test]
    fn test_read_wrong_opcode_is_violation() {
        let peer = Peer::new();
        let client = spawn_read(peer.addr(), BlockCounter::starting_at(1));
        let (_, client_addr) = peer.recv();

        peer.send(Packet::ack(Block(1)), client_addr);

        match peer.recv().0 {
            Packet::Error(err) => assert_eq!(err.code, ErrorCode::IllegalOperation),
            other => panic!("expected an error packet, got {}", other),
        }
        let (result, _, _) = client.join().unwrap();
        assert!(matches!(
            result,
            Err(TransferError::ProtocolViolation {
                expected: Opcode::Data,
                got: Opcode::Ack
            })
        ));
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::WriteZero, "no space left"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_local_failure_sends_disk_full() {
        let peer = Peer::new();
        let client = thread::spawn({
            let server = peer.addr();
            move || {
                let transfer = Transfer::new(loopback(), config());
                let mut session = Session::requester(server, BlockCounter::starting_at(1));
                transfer.receive(&mut session, Packet::rrq("f", Mode::Octet), FullDisk)
            }
        });
        let (_, client_addr) = peer.recv();

        peer.send(Packet::data(Block(1), b"doomed"), client_addr);
        match peer.recv().0 {
            Packet::Error(err) => assert_eq!(err.code, ErrorCode::DiskFull),
            other => panic!("expected an error packet, got {}", other),
        }

        assert!(matches!(
            client.join().unwrap(),
            Err(TransferError::LocalIo(_))
        ));
        peer.assert_silent(Duration::from_millis(100));
    }

    #[test]
    fn test_write_sends_blocks_and_final_ack() {
        let peer = Peer::new();
        let contents = vec![b'q'; MAX_PAYLOAD_SIZE];
        let client = spawn_write(peer.addr(), contents.clone());

        let (wrq, client_addr) = peer.recv();
        assert_eq!(wrq, Packet::wrq("f", Mode::Octet));

        peer.send(Packet::ack(Block(0)), client_addr);
        assert_eq!(peer.recv().0, Packet::data(Block(1), &contents));
        peer.send(Packet::ack(Block(1)), client_addr);

        // An exact multiple of the block size ends with an empty block.
        assert_eq!(peer.recv().0, Packet::data(Block(2), b""));
        peer.send(Packet::ack(Block(2)), client_addr);

        let (result, state) = client.join().unwrap();
        let summary = result.unwrap();
        assert_eq!(state, State::Done);
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.bytes, MAX_PAYLOAD_SIZE as u64);
    }

    #[test]
    fn test_write_ignores_duplicate_ack() {
        let peer = Peer::new();
        let client = spawn_write(peer.addr(), vec![3; MAX_PAYLOAD_SIZE + 10]);
        let (_, client_addr) = peer.recv();

        peer.send(Packet::ack(Block(0)), client_addr);
        assert!(matches!(peer.recv().0, Packet::Data(_)));
        peer.send(Packet::ack(Block(1)), client_addr);
        assert!(matches!(peer.recv().0, Packet::Data(_)));

        // A stale ACK must not trigger a resend of block 2.
        peer.send(Packet::ack(Block(1)), client_addr);
        peer.assert_silent(TIMEOUT / 2);

        peer.send(Packet::ack(Block(2)), client_addr);
        let (result, _) = client.join().unwrap();
        assert_eq!(result.unwrap().duplicates, 1);
    }

    #[test]
    fn test_write_rejects_ack_ahead() {
        let peer = Peer::new();
        let client = spawn_write(peer.addr(), vec![3; 10]);
        let (_, client_addr) = peer.recv();

        peer.send(Packet::ack(Block(0)), client_addr);
        assert!(matches!(peer.recv().0, Packet::Data(_)));
        peer.send(Packet::ack(Block(2)), client_addr);

        match peer.recv().0 {
            Packet::Error(err) => assert_eq!(err.code, ErrorCode::IllegalOperation),
            other => panic!("expected an error packet, got {}", other),
        }
        let (result, _) = client.join().unwrap();
        assert!(matches!(
            result,
            Err(TransferError::SequenceError {
                expected: 1,
                got: 2
            })
        ));
    }

    #[test]
    fn test_write_retransmits_data() {
        const BOGUS_DATA: &[u8] = b"hey, look, listen";

        let peer = Peer::new();
        let client = spawn_write(peer.addr(), BOGUS_DATA.to_vec());
        let (_, client_addr) = peer.recv();
        peer.send(Packet::ack(Block(0)), client_addr);

        // The original DATA plus one retransmission.
        for _ in 0..2 {
            assert_eq!(peer.recv().0, Packet::data(Block(1), BOGUS_DATA));
        }
        peer.send(Packet::ack(Block(1)), client_addr);

        let (result, _) = client.join().unwrap();
        assert_eq!(result.unwrap().retransmissions, 1);
    }

    #[test]
    fn test_responder_send_starts_with_first_block() {
        let requester = Peer::new();
        let transfer = Transfer::new(loopback(), config());
        let server_side = transfer.endpoint().local_addr().unwrap();

        let responder = thread::spawn({
            let client = requester.addr();
            move || {
                let mut session = Session::responder(client, BlockCounter::starting_at(0));
                transfer.send(&mut session, None, &b"tiny"[..])
            }
        });

        let (packet, from) = requester.recv();
        assert_eq!(packet, Packet::data(Block(1), b"tiny"));
        assert_eq!(from, server_side);
        requester.send(Packet::ack(Block(1)), from);

        assert_eq!(responder.join().unwrap().unwrap().blocks, 1);
    }

    #[test]
    fn test_responder_read_failure_uses_abort_code() {
        struct Unreadable;

        impl Read for Unreadable {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(ErrorKind::PermissionDenied, "locked"))
            }
        }

        let requester = Peer::new();
        let transfer = Transfer::new(loopback(), config());

        let responder = thread::spawn({
            let client = requester.addr();
            move || {
                let mut session = Session::responder(client, BlockCounter::starting_at(0));
                let result = transfer.send(&mut session, None, Unreadable);
                (result, session.state())
            }
        });

        let notified = match requester.recv().0 {
            Packet::Error(err) => err,
            other => panic!("expected an error packet, got {}", other),
        };
        assert_eq!(notified.code, ErrorCode::AccessViolation);
        assert_eq!(notified.message, "locked");

        let (result, state) = responder.join().unwrap();
        let err = result.unwrap_err();
        assert!(matches!(err, TransferError::LocalIo(_)), "{:?}", err);
        assert_eq!(err.code(), Some(notified.code));
        assert_eq!(state, State::Aborted);
    }

    #[test]
    fn test_fill_block_handles_short_reads() {
        struct Trickle(Vec<u8>);

        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0.remove(0);
                Ok(1)
            }
        }

        let mut reader = Trickle(vec![9; 600]);
        let mut chunk = [0; MAX_PAYLOAD_SIZE];
        assert_eq!(fill_block(&mut reader, &mut chunk).unwrap(), MAX_PAYLOAD_SIZE);
        assert_eq!(fill_block(&mut reader, &mut chunk).unwrap(), 88);
        assert_eq!(fill_block(&mut reader, &mut chunk).unwrap(), 0);
    }
}
