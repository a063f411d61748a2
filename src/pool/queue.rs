use crate::error::{RelayError, Result};

use std::collections::VecDeque;
use std::io;

/// An immutable chunk of bytes queued for one recipient.
///
/// A `Message` is owned by exactly one [`OutboundQueue`] and is freed
/// when it has been written in full or when its queue is dropped.
#[derive(Debug, PartialEq, Eq)]
pub struct Message {
    payload: Box<[u8]>,
}

impl Message {
    /// Copies `chunk` into a new message.
    ///
    /// Allocation failure is reported instead of aborting the process.
    pub fn copy_from(chunk: &[u8]) -> Result<Self> {
        let mut payload = Vec::new();
        payload
            .try_reserve_exact(chunk.len())
            .map_err(|_| RelayError::Exhausted { what: "message" })?;
        payload.extend_from_slice(chunk);

        Ok(Self {
            payload: payload.into_boxed_slice(),
        })
    }

    /// Returns the payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Outcome of a drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Every queued message was written; write interest can be dropped.
    Flushed,
    /// The transport stopped accepting bytes; the rest waits for the next
    /// writable report.
    Pending,
}

/// FIFO of messages waiting to be written to one connection.
///
/// The queue keeps a cursor into its head message so that a short write
/// resumes exactly where the previous one stopped. A message is popped
/// only after its last byte has been accepted by the transport.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    messages: VecDeque<Message>,
    /// Bytes of the head message already written.
    offset: usize,
    /// Bytes still waiting across all messages.
    pending: usize,
}

impl OutboundQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message` at the tail.
    pub fn push(&mut self, message: Message) -> Result<()> {
        self.messages
            .try_reserve(1)
            .map_err(|_| RelayError::Exhausted {
                what: "outbound queue slot",
            })?;

        self.pending += message.len();
        self.messages.push_back(message);
        Ok(())
    }

    /// Returns `true` if nothing is waiting to be written.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of queued messages, including a partially written head.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Number of bytes not yet accepted by the transport.
    pub fn pending_bytes(&self) -> usize {
        self.pending
    }

    /// Returns the unsent tail of the head message, if any.
    pub fn head(&self) -> Option<&[u8]> {
        self.messages
            .front()
            .map(|message| &message.as_bytes()[self.offset..])
    }

    /// Records that `n` bytes of the head message were written.
    ///
    /// Pops the head once it has been written in full and returns `true`
    /// in that case.
    fn advance(&mut self, n: usize) -> bool {
        let Some(head) = self.messages.front() else {
            return false;
        };

        let remaining = head.len() - self.offset;
        let n = n.min(remaining);

        self.pending -= n;

        if n == remaining {
            self.messages.pop_front();
            self.offset = 0;
            true
        } else {
            self.offset += n;
            false
        }
    }

    /// Writes queued bytes through `write` until the queue is empty or the
    /// sink stops accepting data.
    ///
    /// `write` follows the non-blocking `write(2)` contract: it returns the
    /// number of bytes accepted, `WouldBlock` when it cannot take more, or
    /// an error. A short write stops the drain after advancing the cursor.
    pub fn drain_with<F>(&mut self, mut write: F) -> io::Result<DrainStatus>
    where
        F: FnMut(&[u8]) -> io::Result<usize>,
    {
        loop {
            let Some(chunk) = self.head() else {
                return Ok(DrainStatus::Flushed);
            };

            // Zero-length payloads carry nothing to the wire.
            if chunk.is_empty() {
                self.advance(0);
                continue;
            }

            match write(chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "transport accepted zero bytes",
                    ));
                }
                Ok(n) => {
                    if !self.advance(n) {
                        return Ok(DrainStatus::Pending);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(DrainStatus::Pending);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
