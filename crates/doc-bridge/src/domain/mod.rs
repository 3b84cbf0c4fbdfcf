//! Domain layer: pure types shared by the application and infrastructure
//! layers.  No I/O, no threads, no external dependencies.

pub mod config;
pub mod messages;

pub use config::BridgeConfig;
pub use messages::{HostCommand, CLOSE_SENTINEL, OPEN_SENTINEL};
