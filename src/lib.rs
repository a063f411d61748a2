//! # Chorus
//!
//! **Chorus** is a single-process broadcast relay: every chunk of bytes
//! received from one connected client is forwarded, unchanged, to every
//! other client connected at that moment.
//!
//! The crate is built around one thread and one readiness wait:
//!
//! - a [`ConnectionPool`](pool::ConnectionPool) owns the live connections
//!   and their outbound queues, and derives the interest sets,
//! - an [`EventLoop`](reactor::EventLoop) waits for readiness, accepts,
//!   reads, fans out and drains,
//! - [`Transport`](net::Transport) and [`Readiness`](reactor::poller::Readiness)
//!   are the seams to the operating system, so the core can be driven by
//!   in-memory doubles.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chorus::net::{SocketTransport, TcpListener};
//! use chorus::reactor::poller::PollPoller;
//! use chorus::reactor::{EventLoop, StopToken};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("127.0.0.1:9000".parse()?, 5)?;
//! let stop = StopToken::new()?;
//!
//! let mut relay = EventLoop::new(listener.handle(), SocketTransport::new(), PollPoller::new(), stop);
//! let exit = relay.run()?;
//! assert!(exit.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Limitations
//!
//! There is no framing. A chunk is whatever one `read(2)` returned, so a
//! line typed by a client may reach the others split across several
//! chunks, or merged with the next one.

pub mod config;
pub mod error;
pub mod net;
pub mod pool;
pub mod reactor;

pub use config::RelayConfig;
pub use error::RelayError;

/// An open socket as seen by the relay.
pub type Handle = std::os::fd::RawFd;
