//! The `tftp_relay` crate provides implementations for the following
//! components of the Trivial File Transfer Protocol (RFC 1350):
//!
//! * The protocol (types that represent TFTP packets as well as a
//!   stop-and-wait engine that drives a single read or write transaction,
//!   recovering from loss, duplication and reordering).
//! * A client
//! * A server
//! * A fault-injection relay that sits between the two and can drop, delay,
//!   duplicate or corrupt chosen packets while an operator changes the rules
//!   at runtime.
//!
//! For more information, please see [THE TFTP PROTOCOL (REVISION 2)](
//! https://tools.ietf.org/html/rfc1350).
//!
//! ## Try it out
//!
//! In one terminal window, start up the server on the test port:
//!
//! ```console
//! $ cargo run --bin tftp-server -- --listen 127.0.0.1:6969 --directory ./served
//! ```
//!
//! In a second, put the relay in front of it:
//!
//! ```console
//! $ cargo run --bin tftp-relay -- --listen 127.0.0.1:2323 --upstream 127.0.0.1:6969
//! drop data 3 to-server once
//! ```
//!
//! Then in a third window:
//!
//! ```console
//! $ cargo run --bin tftp-client -- --server 127.0.0.1:2323 --verbose
//! put alice-in-wonderland.txt
//! ```

use std::time::Duration;

mod bytes;
pub mod client;
pub mod error;
pub mod packet;
pub mod relay;
pub mod sequence;
mod server;
pub mod transfer;
pub mod transport;
mod util;

pub use client::{Client, ConnectTo};
pub use error::{TransferError, UnknownPeer};
pub use relay::{Relay, RelayConfig, RelayHandle};
pub use server::{Handler, Server};
pub use transfer::{Session, State, Summary, Transfer};

/// The port responders listen on for requests.
pub const WELL_KNOWN_PORT: u16 = 69;

/// The fixed port used in test configurations, where requests go through
/// the relay instead of straight to the responder.
pub const TEST_PORT: u16 = 23;

/// How long to wait for a reply before retransmitting.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How many times the outstanding packet is retransmitted before giving up.
pub const DEFAULT_MAX_RETRANSMISSIONS: usize = 5;

/// POD struct representing the configuration of the retransmission of packets
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct RetransmissionConfig {
    /// How long should we wait for a reply before retransmitting the last packet?
    timeout: Duration,

    /// How many times should we retransmit the last packet?
    ///
    /// Note that this is the number of *retransmissions*, not transmissions, so
    /// setting this to `0` means that the packet will still be sent once.
    max_retransmissions: usize,
}

impl RetransmissionConfig {
    pub fn new(timeout: Duration, max_retransmissions: usize) -> Self {
        Self {
            timeout,
            max_retransmissions,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retransmissions(&self) -> usize {
        self.max_retransmissions
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retransmissions(mut self, max_retransmissions: usize) -> Self {
        self.max_retransmissions = max_retransmissions;
        self
    }
}

impl Default for RetransmissionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retransmissions: DEFAULT_MAX_RETRANSMISSIONS,
        }
    }
}

/// Selects which port requests are addressed to.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum PortMode {
    /// Talk to the responder directly on [`WELL_KNOWN_PORT`].
    #[default]
    Normal,

    /// Talk to the relay on [`TEST_PORT`].
    Test,
}

impl PortMode {
    pub fn well_known_port(self) -> u16 {
        match self {
            PortMode::Normal => WELL_KNOWN_PORT,
            PortMode::Test => TEST_PORT,
        }
    }
}
