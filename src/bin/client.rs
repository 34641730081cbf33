//! Interactive TFTP client.
//!
//! Reads `get <file>`, `put <file>` and `shutdown` commands from standard
//! input and runs one transaction per command against the configured server.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use tftp_relay::client::{Builder, ConnectTo};
use tftp_relay::packet::Mode;
use tftp_relay::{PortMode, RetransmissionConfig, TransferError};

#[derive(Debug, Parser)]
#[command(name = "tftp-client", about = "Stop-and-wait TFTP client")]
struct Args {
    /// Server to talk to. Without a port, the port selected by `--test` is used.
    #[arg(long, default_value = "127.0.0.1")]
    server: String,

    /// Send requests to the relay's test port instead of the well-known port.
    #[arg(long)]
    test: bool,

    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Where files are read from and written to.
    #[arg(long, default_value = ".")]
    directory: PathBuf,

    /// How long to wait for a reply before retransmitting.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Retransmissions before giving up.
    #[arg(long, default_value_t = 5)]
    retries: usize,
}

impl Args {
    fn port_mode(&self) -> PortMode {
        if self.test {
            PortMode::Test
        } else {
            PortMode::Normal
        }
    }

    fn retransmission_config(&self) -> RetransmissionConfig {
        RetransmissionConfig::new(Duration::from_millis(self.timeout_ms), self.retries)
    }

    /// A builder targeting the server, on a fresh socket.
    fn connect(&self) -> io::Result<Builder<ConnectTo>> {
        let builder = Builder::new()?.with_retransmission_config(self.retransmission_config());
        if self.server.contains(':') {
            builder.connect_to(self.server.as_str())
        } else {
            builder.connect_with_mode(&self.server, self.port_mode())
        }
    }
}

fn log_level(args: &Args) -> &'static str {
    if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    }
}

/// Local files are named after the last component of the remote name.
fn local_path(directory: &Path, file: &str) -> io::Result<PathBuf> {
    Path::new(file)
        .file_name()
        .map(|name| directory.join(name))
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, format!("bad file name {}", file)))
}

fn get(args: &Args, file: &str) -> Result<(), TransferError> {
    let path = local_path(&args.directory, file).map_err(TransferError::LocalIo)?;
    let client = args.connect()?.build();

    // Refuse before the request goes out so nothing local is clobbered.
    let local = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(TransferError::LocalIo)?;

    match client.get(file, Mode::Octet, BufWriter::new(local)) {
        Ok(summary) => {
            info!(file, ?summary, "get complete");
            Ok(())
        }
        Err(err) => {
            let _ = fs::remove_file(&path);
            Err(err)
        }
    }
}

fn put(args: &Args, file: &str) -> Result<(), TransferError> {
    let path = local_path(&args.directory, file).map_err(TransferError::LocalIo)?;
    let local = File::open(&path).map_err(TransferError::LocalIo)?;

    let client = args.connect()?.build();
    let summary = client.put(file, Mode::Octet, BufReader::new(local))?;
    info!(file, ?summary, "put complete");
    Ok(())
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level(&args))),
        )
        .with_target(true)
        .init();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();

        let result = match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("get"), Some(file)) => get(&args, file),
            (Some("put"), Some(file)) => put(&args, file),
            (Some("shutdown" | "quit"), None) => break,
            (Some(other), _) => {
                warn!(command = other, "usage: get <file> | put <file> | shutdown");
                continue;
            }
        };

        if let Err(err) = result {
            error!(error = %err, "transfer failed");
        }
    }

    Ok(())
}
