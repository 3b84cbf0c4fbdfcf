//! Infrastructure layer: threads, seams, and lifecycle.
//!
//! Everything that touches the socket registry or spawns a thread lives
//! here, behind the pure domain and application layers.

pub mod forwarder;
pub mod script_host;
pub mod server;
pub mod session;
pub mod supervisor;

pub use script_host::{RecordingHost, ScriptHost, StdoutHost};
pub use server::{DocumentServer, EchoServer, ServerFactory};
pub use session::BridgeSession;
pub use supervisor::Supervisor;
