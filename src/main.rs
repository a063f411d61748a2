//! Chorus relay entry point.
//!
//! # Usage
//!
//! ```text
//! chorus [OPTIONS] <PORT>
//!
//! Arguments:
//!   <PORT>  TCP port to listen on
//!
//! Options:
//!   --bind <ADDR>           Address to bind [default: 0.0.0.0]
//!   --backlog <N>           listen(2) backlog [default: 5]
//!   --read-buffer <BYTES>   Bytes read per readable event [default: 4096]
//!   --max-backlog <BYTES>   Queued bytes before a client is dropped, 0 = unlimited
//!   --poller <KIND>         Readiness backend: poll | select [default: poll]
//! ```
//!
//! Every option can also be set through a `CHORUS_*` environment variable;
//! arguments win when both are present. Log verbosity follows `RUST_LOG`.

use std::net::IpAddr;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chorus::RelayConfig;
use chorus::config::{DEFAULT_BACKLOG, DEFAULT_MAX_BACKLOG_BYTES, DEFAULT_READ_BUFFER};
use chorus::net::{SocketTransport, TcpListener};
use chorus::reactor::poller::PollerKind;
use chorus::reactor::{EventLoop, Exit, StopToken, install_signal_handlers};

/// Broadcast relay: bytes from one client are forwarded to all others.
#[derive(Debug, Parser)]
#[command(name = "chorus", version, about)]
struct Cli {
    /// TCP port to listen on.
    #[arg(env = "CHORUS_PORT")]
    port: u16,

    /// Address to bind the listener to.
    #[arg(long, default_value = "0.0.0.0", env = "CHORUS_BIND")]
    bind: IpAddr,

    /// Pending-connection backlog passed to listen(2).
    #[arg(long, default_value_t = DEFAULT_BACKLOG, env = "CHORUS_BACKLOG")]
    backlog: i32,

    /// Bytes read per readable event; each read is relayed as one chunk.
    #[arg(long = "read-buffer", default_value_t = DEFAULT_READ_BUFFER, env = "CHORUS_READ_BUFFER")]
    read_buffer: usize,

    /// Bytes a client may have queued before it is dropped; 0 disables the limit.
    #[arg(long = "max-backlog", default_value_t = DEFAULT_MAX_BACKLOG_BYTES, env = "CHORUS_MAX_BACKLOG")]
    max_backlog: usize,

    /// Readiness wait backend.
    #[arg(long, value_enum, default_value_t = PollerKind::Poll, env = "CHORUS_POLLER")]
    poller: PollerKind,
}

impl From<Cli> for RelayConfig {
    fn from(cli: Cli) -> Self {
        RelayConfig {
            bind: cli.bind,
            port: cli.port,
            backlog: cli.backlog,
            read_buffer_size: cli.read_buffer,
            max_backlog_bytes: cli.max_backlog,
            poller: cli.poller,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from(Cli::parse());

    match serve(&config) {
        Ok(Exit::Stopped) => ExitCode::SUCCESS,
        Ok(Exit::ListenerFailed(e)) => {
            error!(error = %e, "listener failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("relay failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn serve(config: &RelayConfig) -> anyhow::Result<Exit> {
    config.validate()?;

    let address = config.socket_addr();
    let listener = TcpListener::bind(address, config.backlog)
        .with_context(|| format!("failed to listen on {address}"))?;

    let stop = StopToken::new().context("failed to create stop token")?;
    install_signal_handlers(&stop).context("failed to install signal handlers")?;

    info!(
        address = %listener.local_addr().unwrap_or(address),
        poller = %config.poller,
        "relay listening"
    );

    let mut relay = EventLoop::new(
        listener.handle(),
        SocketTransport::new(),
        config.poller.build(),
        stop,
    )
    .configure(config);

    let exit = relay.run()?;

    let stats = relay.stats();
    info!(
        accepted = stats.accepted,
        evicted = stats.evicted,
        bytes_in = stats.bytes_in,
        chunks = stats.chunks_relayed,
        "relay finished"
    );

    // The listener outlives the loop and is closed here, after teardown.
    drop(listener);

    Ok(exit)
}
