//! # bridge-core
//!
//! Shared library for the in-process document bridge containing the virtual
//! socket registry and the server endpoint cell.
//!
//! This crate is used by the bridge binary and by anything that wants to
//! emulate byte-stream socket traffic inside one process.  It has zero
//! dependencies on OS sockets, async runtimes, or UI frameworks.
//!
//! # Architecture overview
//!
//! The document bridge connects a sandboxed scripting host (which cannot open
//! real OS sockets) to a long-running document server living in the same
//! process.  Instead of file descriptors it uses *virtual sockets*: in-memory
//! byte queues with socket-shaped semantics (connect, read, write, poll,
//! close) guarded by a single lock and condition variable.
//!
//! This crate defines:
//!
//! - **`socket`** – The [`SocketRegistry`]: virtual socket descriptors, their
//!   per-socket inbound FIFO queues, peer linkage, and the blocking `poll`
//!   primitive every bridge thread suspends on.
//!
//! - **`endpoint`** – The [`ServerEndpoint`]: the shared cell in which each
//!   server run publishes its current listening socket, replacing the
//!   process-wide mutable descriptor the design grew out of.

pub mod endpoint;
pub mod socket;

// Re-export the most-used types at the crate root so callers can write
// `bridge_core::SocketRegistry` instead of `bridge_core::socket::registry::SocketRegistry`.
pub use endpoint::ServerEndpoint;
pub use socket::registry::{
    Interest, PollEvent, PollRequest, ReadOutcome, SocketId, SocketRegistry, WriteError,
};
