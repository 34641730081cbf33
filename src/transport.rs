//! Bounded-timeout datagram I/O.
//!
//! Every receive in a transaction waits until a deadline and no longer. A
//! timeout is not an error at this layer: it is reported as `Ok(None)` and
//! the caller decides whether to retransmit or give up.

use std::io::{self, ErrorKind, Result};
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

/// A datagram endpoint with best-effort send and deadline-bounded receive.
pub trait Endpoint {
    /// Sends one datagram. Delivery is not guaranteed.
    fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<()>;

    /// Waits for one datagram until `deadline`.
    ///
    /// Returns `Ok(None)` once the deadline has passed without a datagram.
    fn recv_until(&self, buf: &mut [u8], deadline: Instant) -> Result<Option<(usize, SocketAddr)>>;

    fn local_addr(&self) -> Result<SocketAddr>;

    /// Waits for one datagram for at most `timeout`.
    fn recv_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<(usize, SocketAddr)>> {
        self.recv_until(buf, Instant::now() + timeout)
    }
}

impl Endpoint for UdpSocket {
    fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<()> {
        let sent = UdpSocket::send_to(self, bytes, dest)?;
        if sent != bytes.len() {
            return Err(io::Error::new(
                ErrorKind::WriteZero,
                format!("sent {} of {} bytes", sent, bytes.len()),
            ));
        }
        Ok(())
    }

    fn recv_until(&self, buf: &mut [u8], deadline: Instant) -> Result<Option<(usize, SocketAddr)>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        // A zero read timeout means "block forever" to the OS.
        if remaining.is_zero() {
            return Ok(None);
        }

        self.set_read_timeout(Some(remaining))?;
        match self.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(error) if is_timeout(&error) => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
