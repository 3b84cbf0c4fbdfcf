//! The server endpoint cell: where the current server run publishes its
//! listening socket.
//!
//! The bridge predates its server: the supervisor keeps constructing fresh
//! server instances, and each one creates a *new* listening virtual socket
//! when it starts.  Connection establishment therefore cannot hard-code a
//! handle — it has to ask "which socket is the server listening on right
//! now?".  [`ServerEndpoint`] answers that question.
//!
//! This replaces what used to be a process-wide mutable descriptor: the cell
//! is an explicit object injected into both the server factory and the
//! session controller, with process-duration lifetime and interior
//! synchronization.
//!
//! A deliberate departure from the single "listening for the app lifetime"
//! descriptor that design grew out of: with supervised restarts a
//! replacement server cannot reuse a closed socket, so each run listens on
//! a fresh one, and it is the *cell* — not any particular socket — that
//! lives for the process lifetime.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::socket::registry::SocketId;

/// Shared cell holding the currently published listening socket, if any.
///
/// The server run publishes on startup and clears on exit; the session
/// controller reads it exactly once per connection open.
#[derive(Debug, Default)]
pub struct ServerEndpoint {
    listening: Mutex<Option<SocketId>>,
    published: Condvar,
}

impl ServerEndpoint {
    /// Creates an empty endpoint — no server is listening yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the listening socket of a freshly started server run and
    /// wakes anyone blocked in [`wait_until_published`].
    ///
    /// [`wait_until_published`]: ServerEndpoint::wait_until_published
    pub fn publish(&self, id: SocketId) {
        debug!("server endpoint published: {id}");
        *self.cell() = Some(id);
        self.published.notify_all();
    }

    /// Clears the endpoint when a server run exits.
    ///
    /// A restarted instance will publish its own fresh socket.
    pub fn clear(&self) {
        debug!("server endpoint cleared");
        *self.cell() = None;
    }

    /// The currently listening socket, or `None` between server runs.
    pub fn current(&self) -> Option<SocketId> {
        *self.cell()
    }

    /// Blocks until a listening socket is published or the timeout elapses.
    ///
    /// Connection opens land here when they race the supervisor's restart
    /// gap: the previous run has cleared the cell and the next one has not
    /// yet published.  Returns `None` on timeout.
    pub fn wait_until_published(&self, timeout: Duration) -> Option<SocketId> {
        let deadline = Instant::now() + timeout;
        let mut cell = self.cell();
        while cell.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .published
                .wait_timeout(cell, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cell = guard;
        }
        *cell
    }

    fn cell(&self) -> std::sync::MutexGuard<'_, Option<SocketId>> {
        self.listening.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
