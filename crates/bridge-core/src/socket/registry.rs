//! The virtual socket registry: in-memory, thread-safe socket emulation.
//!
//! # What is a virtual socket?
//!
//! A virtual socket is the in-process analogue of a socket descriptor: an
//! opaque handle ([`SocketId`]) naming a slot in the registry's table.  Each
//! slot carries a connection state, an inbound FIFO byte queue, and an
//! optional peer reference.  `write` on one socket appends to its *peer's*
//! inbound queue; `read` drains the socket's *own* queue.  Nothing here
//! touches an OS descriptor — the whole point is to give a sandboxed
//! environment socket-shaped semantics without any real network I/O.
//!
//! # Concurrency model
//!
//! All sockets live in one table behind a single `Mutex`, paired with a
//! single `Condvar`.  Every state mutation (`connect`, `write`, `close`)
//! notifies all waiters, and [`SocketRegistry::poll`] re-evaluates readiness
//! under the same lock before sleeping.  That makes `read`, `write`, `poll`,
//! and `close` linearizable with respect to each other: a `poll` concurrent
//! with a `close` observes the close exactly once and can never miss the
//! wakeup.
//!
//! `poll` is the only blocking operation; `read`, `write`, and `close`
//! always return immediately.
//!
//! # Fatal contract violations
//!
//! Using an invalid handle, connecting a socket that is not unconnected, or
//! writing on a socket that was never connected is a programmer error, not a
//! runtime condition.  These panic (process abort) rather than returning an
//! error — callers must not race socket creation with use.  Runtime shutdown
//! races (writing to a socket whose end has been closed) are reported as
//! [`WriteError`] instead.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::trace;

/// Opaque handle for one virtual socket.
///
/// Handles are allocated sequentially by [`SocketRegistry::create`] and are
/// never reused within one registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u32);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vs{}", self.0)
    }
}

/// Connection state of one virtual socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketState {
    /// Freshly created; no peer yet.
    Unconnected,
    /// Linked to a peer; reads and writes flow.
    Connected,
    /// Closed by either side.  Unread queue contents remain drainable.
    Closed,
}

/// Runtime write failures.
///
/// These are shutdown races, not contract violations: a sender thread may
/// legitimately lose the race against a concurrent `close` on either end of
/// the connection.  Callers log and drop the payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    /// The socket being written to has been closed.
    #[error("socket {0} is closed")]
    Closed(SocketId),

    /// The peer has been closed, so the bytes would never be read.
    #[error("peer of socket {0} is closed")]
    PeerClosed(SocketId),
}

/// Result of one non-blocking [`SocketRegistry::read`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Up to `max` bytes drained from the inbound queue, in FIFO order.
    Data(Vec<u8>),
    /// The queue is empty but the connection is still live.
    Empty,
    /// The queue is drained and the socket or its peer is closed:
    /// end-of-stream, no more data will ever arrive.
    Eof,
}

/// Which conditions a [`PollRequest`] is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    /// Interest in inbound data (or end-of-stream).
    pub const READABLE: Interest = Interest { readable: true, writable: false };
    /// Interest in write-readiness.  Writable is always true once connected.
    pub const WRITABLE: Interest = Interest { readable: false, writable: true };
}

/// One socket to watch in a [`SocketRegistry::poll`] call.
#[derive(Debug, Clone, Copy)]
pub struct PollRequest {
    pub id: SocketId,
    pub interest: Interest,
}

impl PollRequest {
    /// Watches `id` for readability.
    pub fn readable(id: SocketId) -> Self {
        Self { id, interest: Interest::READABLE }
    }

    /// Watches `id` for writability.
    pub fn writable(id: SocketId) -> Self {
        Self { id, interest: Interest::WRITABLE }
    }
}

/// Readiness of one watched socket, reported by [`SocketRegistry::poll`].
///
/// A closed socket is always reported ready with `closed: true`, regardless
/// of the requested interest — close is a readiness-triggering event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEvent {
    pub id: SocketId,
    pub readable: bool,
    pub writable: bool,
    pub closed: bool,
}

/// One slot in the socket table.
#[derive(Debug)]
struct Slot {
    state: SocketState,
    /// Inbound byte queue.  Strictly FIFO regardless of writer identity, so
    /// a single consumer observes bytes in the order they were written.
    queue: VecDeque<u8>,
    peer: Option<SocketId>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: SocketState::Unconnected,
            queue: VecDeque::new(),
            peer: None,
        }
    }
}

#[derive(Debug)]
struct Table {
    next_id: u32,
    slots: HashMap<u32, Slot>,
}

/// The virtual socket registry.
///
/// One registry instance is created at process startup and injected by
/// reference into every component that needs it; there is no ambient global
/// socket state.
///
/// # Example
///
/// ```rust
/// use bridge_core::{ReadOutcome, SocketRegistry};
///
/// let reg = SocketRegistry::new();
/// let a = reg.create();
/// let b = reg.create();
/// reg.connect(a, b);
/// reg.write(a, b"hello").unwrap();
/// assert_eq!(reg.read(b, 64), ReadOutcome::Data(b"hello".to_vec()));
/// ```
#[derive(Debug)]
pub struct SocketRegistry {
    table: Mutex<Table>,
    readiness: Condvar,
}

impl Default for SocketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                next_id: 0,
                slots: HashMap::new(),
            }),
            readiness: Condvar::new(),
        }
    }

    /// Allocates a new unconnected virtual socket.
    pub fn create(&self) -> SocketId {
        let mut table = self.lock_table();
        let id = SocketId(table.next_id);
        table.next_id += 1;
        table.slots.insert(id.0, Slot::new());
        trace!("create -> {id}");
        id
    }

    /// Links two unconnected sockets as a connection pair.
    ///
    /// # Panics
    ///
    /// Fatal if either handle is invalid, either socket is not in the
    /// unconnected state, or `a == b`.
    pub fn connect(&self, a: SocketId, b: SocketId) {
        assert_ne!(a, b, "cannot connect virtual socket {a} to itself");
        let mut table = self.lock_table();
        for id in [a, b] {
            let slot = slot_ref(&table, id);
            assert!(
                slot.state == SocketState::Unconnected,
                "connect on virtual socket {id} which is {:?}",
                slot.state
            );
        }
        {
            let sa = slot_mut(&mut table, a);
            sa.state = SocketState::Connected;
            sa.peer = Some(b);
        }
        {
            let sb = slot_mut(&mut table, b);
            sb.state = SocketState::Connected;
            sb.peer = Some(a);
        }
        trace!("connect {a} <-> {b}");
        // Wakes pollers blocked waiting for write-readiness on either end.
        self.readiness.notify_all();
    }

    /// Creates an already-connected socket pair.
    ///
    /// Intended for signaling: close one end to wake a poller on the other.
    /// No payload is ever written on a notification pipe.
    pub fn pipe(&self) -> (SocketId, SocketId) {
        let a = self.create();
        let b = self.create();
        self.connect(a, b);
        trace!("pipe -> ({a}, {b})");
        (a, b)
    }

    /// Appends `bytes` to the peer's inbound queue, preserving order.
    ///
    /// Never blocks.  Returns how many bytes were enqueued (always all of
    /// them on success).
    ///
    /// # Errors
    ///
    /// [`WriteError::Closed`] if this socket is closed, [`WriteError::PeerClosed`]
    /// if the peer is — both are ordinary shutdown races.
    ///
    /// # Panics
    ///
    /// Fatal if the handle is invalid or the socket was never connected.
    pub fn write(&self, id: SocketId, bytes: &[u8]) -> Result<usize, WriteError> {
        let mut table = self.lock_table();
        let slot = slot_ref(&table, id);
        let peer = match slot.state {
            SocketState::Closed => return Err(WriteError::Closed(id)),
            SocketState::Unconnected => {
                panic!("write on unconnected virtual socket {id}")
            }
            SocketState::Connected => slot
                .peer
                .unwrap_or_else(|| panic!("connected virtual socket {id} has no peer")),
        };
        if slot_ref(&table, peer).state == SocketState::Closed {
            return Err(WriteError::PeerClosed(id));
        }
        slot_mut(&mut table, peer).queue.extend(bytes.iter().copied());
        trace!("write {id} -> {peer}: {} bytes", bytes.len());
        self.readiness.notify_all();
        Ok(bytes.len())
    }

    /// Drains and returns up to `max` bytes from the socket's own inbound
    /// queue.  Never blocks.
    ///
    /// Queued bytes remain readable after a close on either end; only once
    /// the queue is empty does a closed connection report [`ReadOutcome::Eof`].
    ///
    /// # Panics
    ///
    /// Fatal if the handle is invalid.
    pub fn read(&self, id: SocketId, max: usize) -> ReadOutcome {
        let mut table = self.lock_table();
        let peer_closed = peer_is_closed(&table, id);
        let slot = slot_mut(&mut table, id);
        if !slot.queue.is_empty() {
            let n = max.min(slot.queue.len());
            let data: Vec<u8> = slot.queue.drain(..n).collect();
            trace!("read {id}: {} bytes", data.len());
            return ReadOutcome::Data(data);
        }
        if slot.state == SocketState::Closed || peer_closed {
            trace!("read {id}: eof");
            ReadOutcome::Eof
        } else {
            ReadOutcome::Empty
        }
    }

    /// Number of queued inbound bytes, without consuming them.
    ///
    /// # Panics
    ///
    /// Fatal if the handle is invalid.
    pub fn available(&self, id: SocketId) -> usize {
        let table = self.lock_table();
        slot_ref(&table, id).queue.len()
    }

    /// Blocks until at least one watched socket satisfies its interest or
    /// the timeout elapses.  `None` means wait forever.
    ///
    /// Returns the ready set — empty only on timeout.  A socket that is
    /// already closed is reported immediately with `closed: true` whatever
    /// the requested interest.
    ///
    /// # Panics
    ///
    /// Fatal if any watched handle is invalid.
    pub fn poll(&self, requests: &[PollRequest], timeout: Option<Duration>) -> Vec<PollEvent> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut table = self.lock_table();
        loop {
            let ready = ready_events(&table, requests);
            if !ready.is_empty() {
                return ready;
            }
            table = match deadline {
                None => self
                    .readiness
                    .wait(table)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Vec::new();
                    }
                    // Spurious wakeups and early notifies are handled by
                    // re-checking readiness and the deadline on every pass.
                    let (table, _timed_out) = self
                        .readiness
                        .wait_timeout(table, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    table
                }
            };
        }
    }

    /// Marks the socket closed and wakes every blocked poller.
    ///
    /// Idempotent.  Unread inbound data is *not* discarded; the peer link is
    /// kept so the peer's reads report end-of-stream once drained.
    ///
    /// # Panics
    ///
    /// Fatal if the handle is invalid.
    pub fn close(&self, id: SocketId) {
        let mut table = self.lock_table();
        let slot = slot_mut(&mut table, id);
        if slot.state == SocketState::Closed {
            trace!("close {id}: already closed");
            return;
        }
        slot.state = SocketState::Closed;
        trace!("close {id}");
        self.readiness.notify_all();
    }

    // A poisoned table mutex means some thread panicked mid-operation; the
    // table itself is still structurally sound (every mutation is a single
    // step), so recover the guard instead of cascading the panic.
    fn lock_table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn slot_ref<'t>(table: &'t Table, id: SocketId) -> &'t Slot {
    table
        .slots
        .get(&id.0)
        .unwrap_or_else(|| panic!("invalid virtual socket handle {id}"))
}

fn slot_mut<'t>(table: &'t mut Table, id: SocketId) -> &'t mut Slot {
    table
        .slots
        .get_mut(&id.0)
        .unwrap_or_else(|| panic!("invalid virtual socket handle {id}"))
}

fn peer_is_closed(table: &Table, id: SocketId) -> bool {
    slot_ref(table, id)
        .peer
        .map(|peer| slot_ref(table, peer).state == SocketState::Closed)
        .unwrap_or(false)
}

/// Evaluates readiness of every watched socket without blocking.
fn ready_events(table: &Table, requests: &[PollRequest]) -> Vec<PollEvent> {
    let mut ready = Vec::new();
    for request in requests {
        let slot = slot_ref(table, request.id);
        let closed = slot.state == SocketState::Closed;
        let readable = !slot.queue.is_empty() || closed || peer_is_closed(table, request.id);
        let writable = slot.state == SocketState::Connected;
        let wanted = (request.interest.readable && readable)
            || (request.interest.writable && writable);
        if wanted || closed {
            ready.push(PollEvent {
                id: request.id,
                readable,
                writable,
                closed,
            });
        }
    }
    ready
}

// ── Tests ─────────────────────────────────────────────────────────────────────
