//! doc-bridge library crate.
//!
//! This crate bridges a sandboxed scripting host — an environment with no
//! access to real OS sockets — to a long-running document server living in
//! the same process, exchanging byte-stream messages over the virtual
//! sockets provided by `bridge-core`.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Scripting host (opaque control strings in, script evaluations out)
//!         ↕
//! [doc-bridge]
//!   ├── domain/           Pure types: BridgeConfig, host command sentinels
//!   ├── application/      Translation: server payload → host script frame
//!   └── infrastructure/
//!         ├── session/    Handshake controller + per-message sender threads
//!         ├── forwarder/  Server→host forwarding thread
//!         └── supervisor/ Server restart loop + run-completion accounting
//!         ↕
//! Document server (opaque byte stream over a virtual socket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no threads).
//! - `application` depends on `domain` only and stays free of side effects.
//! - `infrastructure` depends on the other layers plus `bridge-core` and
//!   owns every thread the bridge spawns.
//!
//! # Data flow
//!
//! Outbound: host control message → session controller → virtual socket →
//! server.  Inbound: server write → virtual socket queue → forwarding
//! thread → framed script evaluation on the host.  The supervisor runs
//! orthogonally, owning server identity and restart.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: payload framing logic.
pub mod application;

/// Infrastructure layer: forwarding thread, session controller, supervisor.
pub mod infrastructure;
