//! TFTP server serving one directory, one thread per request.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use tftp_relay::{RetransmissionConfig, Server, WELL_KNOWN_PORT};

#[derive(Debug, Parser)]
#[command(name = "tftp-server", about = "Stop-and-wait TFTP server")]
struct Args {
    /// Address to take requests on. Defaults to the well-known port on all
    /// interfaces.
    #[arg(long)]
    listen: Option<SocketAddr>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Directory files are served from and stored into.
    #[arg(long, default_value = ".")]
    directory: PathBuf,

    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    #[arg(long, default_value_t = 5)]
    retries: usize,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let level = if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(true)
        .init();

    // The test port belongs to the relay, which forwards here.
    let listen = args
        .listen
        .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), WELL_KNOWN_PORT));

    let server = Server::bind(listen, &args.directory)?.with_retransmission_config(
        RetransmissionConfig::new(Duration::from_millis(args.timeout_ms), args.retries),
    );
    info!(
        listen = %server.local_addr()?,
        directory = %args.directory.display(),
        "serving"
    );

    server.run()
}
