//! A man-in-the-middle for one requester and one responder.
//!
//! The relay listens where the requester expects the responder to be and
//! forwards every datagram to the other side from a second, ephemeral
//! socket. Before forwarding, each datagram is run through the installed
//! [`RuleSet`], which can drop, delay, duplicate or corrupt it.
//!
//! Rules are changed while traffic flows through a [`RelayHandle`]. The
//! relay loop never blocks for longer than its poll interval, so rule
//! changes and shutdown take effect promptly.

use std::io::{ErrorKind, Result};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::packet::Opcode;
use crate::transfer::MAX_DATAGRAM_SIZE;
use crate::transport::Endpoint;
use crate::{TEST_PORT, WELL_KNOWN_PORT};

mod command;
mod rule;

pub use command::{parse_command, run_control, Command, CommandError};
pub use rule::{
    Action, Activation, Corruption, Direction, FaultRule, Matcher, Plan, RuleSet,
};

/// How long each leg waits for traffic before checking the other one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RelayConfig {
    /// Where requesters send their requests.
    pub listen: SocketAddr,

    /// The responder's well-known port.
    pub upstream: SocketAddr,

    pub poll_interval: Duration,
}

impl RelayConfig {
    pub fn new(listen: SocketAddr, upstream: SocketAddr) -> Self {
        Self {
            listen,
            upstream,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(
            (Ipv4Addr::UNSPECIFIED, TEST_PORT).into(),
            (Ipv4Addr::LOCALHOST, WELL_KNOWN_PORT).into(),
        )
    }
}

/// State shared between the relay loop and its handles.
#[derive(Debug, Default)]
struct Shared {
    rules: Mutex<RuleSet>,
    stopped: AtomicBool,
}

impl Shared {
    fn rules(&self) -> MutexGuard<'_, RuleSet> {
        // Nothing panics while holding the lock, but a poisoned set of rules
        // is still a valid set of rules.
        self.rules.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Controls a running [`Relay`] from another thread.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    shared: Arc<Shared>,
}

impl RelayHandle {
    /// Installs a rule. It applies from the next datagram the relay handles.
    pub fn install(&self, rule: FaultRule) {
        info!(%rule, "installing fault rule");
        self.shared.rules().install(rule);
    }

    pub fn clear(&self) {
        info!("clearing fault rules");
        self.shared.rules().clear();
    }

    /// A snapshot of the installed rules.
    pub fn rules(&self) -> Vec<FaultRule> {
        self.shared.rules().rules().to_vec()
    }

    /// Asks the relay loop to return. It notices within one poll interval.
    pub fn shutdown(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }
}

/// Who the relay is currently forwarding between.
#[derive(Debug, Clone, Copy)]
struct Route {
    client: Option<SocketAddr>,
    server: SocketAddr,
}

pub struct Relay {
    client_side: UdpSocket,
    server_side: UdpSocket,
    config: RelayConfig,
    shared: Arc<Shared>,
}

impl Relay {
    pub fn bind(config: RelayConfig) -> Result<Self> {
        let client_side = UdpSocket::bind(config.listen)?;
        let server_side = UdpSocket::bind(SocketAddr::new(config.listen.ip(), 0))?;

        Ok(Self {
            client_side,
            server_side,
            config,
            shared: Arc::default(),
        })
    }

    /// The address requesters should send to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.client_side.local_addr()
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Relays traffic until [`RelayHandle::shutdown`] is called.
    #[tracing::instrument(name = "relay", skip_all, fields(listen = %self.config.listen, upstream = %self.config.upstream))]
    pub fn run(self) -> Result<()> {
        let mut route = Route {
            client: None,
            server: self.config.upstream,
        };
        let mut buf = vec![0; MAX_DATAGRAM_SIZE];

        info!("relay running");
        while !self.shared.stopped.load(Ordering::SeqCst) {
            if let Some((nbytes, from)) = self.poll(&self.client_side, &mut buf)? {
                let datagram = buf[..nbytes].to_vec();
                if matches!(Opcode::peek(&datagram), Some(Opcode::Rrq | Opcode::Wrq)) {
                    // A new transaction; the responder will answer from a
                    // fresh port.
                    info!(client = %from, "new request");
                    route = Route {
                        client: Some(from),
                        server: self.config.upstream,
                    };
                } else if route.client.is_none() {
                    route.client = Some(from);
                }

                if route.client == Some(from) {
                    self.forward(Direction::ToServer, datagram, &self.server_side, route.server);
                } else {
                    warn!(
                        stranger = %from,
                        client = ?route.client,
                        "dropping datagram from unknown requester"
                    );
                }
            }

            if let Some((nbytes, from)) = self.poll(&self.server_side, &mut buf)? {
                if route.server != from {
                    debug!(server = %from, "learned responder transfer ID");
                    route.server = from;
                }
                let datagram = buf[..nbytes].to_vec();
                match route.client {
                    Some(client) => {
                        self.forward(Direction::ToClient, datagram, &self.client_side, client)
                    }
                    None => warn!(server = %from, "no requester yet, discarding datagram"),
                }
            }
        }

        info!("relay stopped");
        Ok(())
    }

    fn poll(&self, socket: &UdpSocket, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match socket.recv_timeout(buf, self.config.poll_interval) {
            // A previous forward bounced off a closed port.
            Err(err) if matches!(err.kind(), ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset) => {
                debug!(error = %err, "ignoring ICMP error");
                Ok(None)
            }
            other => other,
        }
    }

    fn forward(&self, direction: Direction, datagram: Vec<u8>, socket: &UdpSocket, dest: SocketAddr) {
        let opcode = Opcode::peek(&datagram);
        let plan = self.shared.rules().apply(direction, datagram);

        for rule in &plan.applied {
            info!(%direction, ?opcode, %rule, "fault injected");
        }
        if plan.copies == 0 {
            return;
        }
        if !plan.delay.is_zero() {
            thread::sleep(plan.delay);
        }

        for _ in 0..plan.copies {
            if let Err(err) = Endpoint::send_to(socket, &plan.datagram, dest) {
                warn!(%direction, %dest, error = %err, "failed to forward datagram");
            }
        }
        debug!(%direction, %dest, len = plan.datagram.len(), copies = plan.copies, "forwarded");
    }
}
