//! Fault-injecting relay. Traffic flows on a background thread while fault
//! rules are typed on standard input.

use std::io;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use tftp_relay::relay::run_control;
use tftp_relay::{Relay, RelayConfig};

#[derive(Debug, Parser)]
#[command(name = "tftp-relay", about = "Relays TFTP traffic and injects faults into it")]
struct Args {
    /// Where requesters send to.
    #[arg(long, default_value = "0.0.0.0:23")]
    listen: SocketAddr,

    /// The server's request port.
    #[arg(long, default_value = "127.0.0.1:69")]
    upstream: SocketAddr,

    /// How long one leg waits for traffic before serving the other.
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if args.verbose { "debug" } else { "info" })
            }),
        )
        .with_target(true)
        .init();

    let config = RelayConfig::new(args.listen, args.upstream)
        .with_poll_interval(Duration::from_millis(args.poll_ms));
    let relay = Relay::bind(config)?;
    let handle = relay.handle();
    info!(listen = %relay.local_addr()?, upstream = %args.upstream, "relay bound");

    let relaying = thread::spawn(move || relay.run());

    let stdin = io::stdin();
    if let Err(err) = run_control(stdin.lock(), io::stdout(), &handle) {
        error!(error = %err, "control input failed");
    }

    match relaying.join() {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::Other, "relay thread panicked")),
    }
}
