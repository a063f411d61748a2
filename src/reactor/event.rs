use crate::Handle;

/// Readiness reported by a wait for one handle.
///
/// A handle appears at most once per wait; read and write readiness are
/// merged into the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Handle the readiness refers to.
    pub handle: Handle,

    /// Readable, closed by the peer, or in an error state. A read will not
    /// block and reports which of these it is.
    pub readable: bool,

    /// Writable without blocking.
    pub writable: bool,
}

impl Event {
    pub fn readable(handle: Handle) -> Self {
        Self {
            handle,
            readable: true,
            writable: false,
        }
    }

    pub fn writable(handle: Handle) -> Self {
        Self {
            handle,
            readable: false,
            writable: true,
        }
    }
}

/// Merges readiness for `handle` into `events`.
pub(crate) fn merge(events: &mut Vec<Event>, handle: Handle, readable: bool, writable: bool) {
    if !readable && !writable {
        return;
    }

    if let Some(e) = events.iter_mut().find(|e| e.handle == handle) {
        e.readable |= readable;
        e.writable |= writable;
    } else {
        events.push(Event {
            handle,
            readable,
            writable,
        });
    }
}
