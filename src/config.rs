//! Relay configuration.
//!
//! [`RelayConfig`] carries every tunable of the relay. The binary fills it
//! from command-line arguments and environment variables; tests build it
//! from [`Default`] and override single fields.

use crate::error::{RelayError, Result};
use crate::reactor::poller::PollerKind;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Accept backlog passed to `listen(2)`.
pub const DEFAULT_BACKLOG: i32 = 5;

/// Size of the buffer a single read fills; one read is one relayed chunk.
pub const DEFAULT_READ_BUFFER: usize = 4096;

/// Per-connection ceiling on queued outbound bytes.
pub const DEFAULT_MAX_BACKLOG_BYTES: usize = 8 * 1024 * 1024;

/// All runtime settings of the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address the listener binds to.
    pub bind: IpAddr,

    /// Port the listener binds to; `0` picks an ephemeral port.
    pub port: u16,

    /// Pending-connection backlog of the listener.
    pub backlog: i32,

    /// Bytes read per readable event.
    pub read_buffer_size: usize,

    /// Bytes a connection may have queued before it is dropped as a slow
    /// consumer. `0` disables the limit.
    pub max_backlog_bytes: usize,

    /// Readiness wait backend.
    pub poller: PollerKind,
}

impl Default for RelayConfig {
    /// | Field             | Default     |
    /// |-------------------|-------------|
    /// | bind              | `0.0.0.0`   |
    /// | port              | `0`         |
    /// | backlog           | `5`         |
    /// | read_buffer_size  | `4096`      |
    /// | max_backlog_bytes | 8 MiB       |
    /// | poller            | `poll`      |
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            backlog: DEFAULT_BACKLOG,
            read_buffer_size: DEFAULT_READ_BUFFER,
            max_backlog_bytes: DEFAULT_MAX_BACKLOG_BYTES,
            poller: PollerKind::Poll,
        }
    }
}

impl RelayConfig {
    /// Address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Checks the settings that cannot be expressed in the field types.
    pub fn validate(&self) -> Result<()> {
        if self.backlog <= 0 {
            return Err(RelayError::Config(format!(
                "backlog must be positive, got {}",
                self.backlog
            )));
        }

        if self.read_buffer_size == 0 {
            return Err(RelayError::Config(
                "read buffer size must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
