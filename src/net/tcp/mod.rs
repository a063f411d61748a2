//! TCP implementation of the transport and the listener bootstrap.
//!
//! - [`listener`]: binds the non-blocking listening socket,
//! - [`transport`]: accept/read/write/close over raw descriptors.

pub mod listener;
pub mod transport;
